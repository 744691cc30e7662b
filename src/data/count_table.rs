//! Long-format barcode count table.

use crate::error::{QcError, Result};
use log::{debug, info};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::path::Path;

/// Column names used by count files.
pub mod columns {
    pub const BARCODE: &str = "barcode";
    pub const SAMPLE_ID: &str = "sampleID";
    pub const COUNT: &str = "cnt";
    pub const DNAID: &str = "dnaid";
    pub const EXPERIMENT: &str = "experiment";
    pub const MOUSE: &str = "mouse";
    pub const DAY: &str = "day";
    pub const ORGAN: &str = "organ";
    pub const SHORT_NAME: &str = "ShortName";
    pub const LOCUS_TAG: &str = "locus_tag";
    pub const ROLE: &str = "role";

    /// Columns every count file must carry.
    pub const REQUIRED: [&str; 10] = [
        BARCODE, SAMPLE_ID, COUNT, DNAID, EXPERIMENT, MOUSE, DAY, ORGAN, SHORT_NAME, LOCUS_TAG,
    ];
}

/// Role of a sample within an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleRole {
    /// Baseline population before selection.
    Inoculum,
    /// Any sample taken after selection.
    Selected,
}

impl SampleRole {
    /// Parse a role tag from a count file.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inoculum" | "input" => Some(SampleRole::Inoculum),
            "selected" | "output" | "sample" => Some(SampleRole::Selected),
            _ => None,
        }
    }

    /// Get the descriptive name.
    pub fn name(&self) -> &'static str {
        match self {
            SampleRole::Inoculum => "inoculum",
            SampleRole::Selected => "selected",
        }
    }
}

/// How to assign a role to samples whose file carries no `role` column.
#[derive(Debug, Clone)]
pub enum RoleInference {
    /// Inoculum iff the sample id contains this substring (case-sensitive).
    Substring(String),
    /// Inoculum iff the sample id matches this pattern.
    Pattern(Regex),
}

impl Default for RoleInference {
    fn default() -> Self {
        RoleInference::Substring("inoculum".to_string())
    }
}

impl RoleInference {
    /// Build a regex-based inference rule.
    pub fn pattern(pattern: &str) -> Result<Self> {
        Ok(RoleInference::Pattern(Regex::new(pattern)?))
    }

    /// Infer the role of a sample from its identifier.
    pub fn infer(&self, sample_id: &str) -> SampleRole {
        let is_inoculum = match self {
            RoleInference::Substring(s) => sample_id.contains(s.as_str()),
            RoleInference::Pattern(re) => re.is_match(sample_id),
        };
        if is_inoculum {
            SampleRole::Inoculum
        } else {
            SampleRole::Selected
        }
    }
}

/// One observed barcode count in one sample.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CountRecord {
    pub barcode: String,
    #[serde(rename = "sampleID")]
    pub sample_id: String,
    #[serde(rename = "cnt")]
    pub count: u64,
    pub dnaid: String,
    pub experiment: String,
    pub mouse: Option<String>,
    pub day: Option<String>,
    pub organ: Option<String>,
    #[serde(rename = "ShortName")]
    pub short_name: Option<String>,
    pub locus_tag: Option<String>,
    pub role: SampleRole,
}

impl CountRecord {
    /// Check that `column` names a string column of the count table.
    ///
    /// The numeric count column is an `InvalidParameter`; any other unknown
    /// name is `MissingColumn`.
    pub fn check_field(column: &str) -> Result<()> {
        match column {
            columns::BARCODE
            | columns::SAMPLE_ID
            | columns::DNAID
            | columns::EXPERIMENT
            | columns::MOUSE
            | columns::DAY
            | columns::ORGAN
            | columns::SHORT_NAME
            | columns::LOCUS_TAG
            | columns::ROLE => Ok(()),
            columns::COUNT => Err(QcError::InvalidParameter(format!(
                "'{}' is numeric and cannot be used for grouping",
                column
            ))),
            _ => Err(QcError::missing_column(column, "count table")),
        }
    }

    /// Value of a string column by its file name.
    ///
    /// Returns `Ok(None)` for a null cell, and the [`CountRecord::check_field`]
    /// error for a name that is not a string column.
    pub fn field(&self, column: &str) -> Result<Option<&str>> {
        Self::check_field(column)?;
        let value = match column {
            columns::BARCODE => Some(self.barcode.as_str()),
            columns::SAMPLE_ID => Some(self.sample_id.as_str()),
            columns::DNAID => Some(self.dnaid.as_str()),
            columns::EXPERIMENT => Some(self.experiment.as_str()),
            columns::MOUSE => self.mouse.as_deref(),
            columns::DAY => self.day.as_deref(),
            columns::ORGAN => self.organ.as_deref(),
            columns::SHORT_NAME => self.short_name.as_deref(),
            columns::LOCUS_TAG => self.locus_tag.as_deref(),
            columns::ROLE => Some(self.role.name()),
            _ => None,
        };
        Ok(value)
    }
}

/// A long-format table of barcode counts, possibly spanning many experiments.
#[derive(Debug, Clone, Default)]
pub struct CountTable {
    records: Vec<CountRecord>,
    fingerprint: u64,
}

impl CountTable {
    /// Create a table from records.
    pub fn new(records: Vec<CountRecord>) -> Self {
        let mut hasher = DefaultHasher::new();
        records.hash(&mut hasher);
        Self {
            records,
            fingerprint: hasher.finish(),
        }
    }

    /// Load a single count CSV, inferring sample roles from the default naming convention.
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_csv_files(&[path], &RoleInference::default())
    }

    /// Load and concatenate several count CSV files.
    ///
    /// Each file has a leading row-id column (ignored) and the columns in
    /// [`columns::REQUIRED`]. A `role` column is optional; rows without a
    /// parseable role fall back to `roles`.
    pub fn from_csv_files<P: AsRef<Path>>(paths: &[P], roles: &RoleInference) -> Result<Self> {
        let mut records = Vec::new();
        for path in paths {
            let before = records.len();
            read_count_csv(path.as_ref(), roles, &mut records)?;
            debug!(
                "Read {} rows from {}",
                records.len() - before,
                path.as_ref().display()
            );
        }
        let table = Self::new(records);
        info!(
            "Loaded {} count rows across {} samples from {} file(s)",
            table.len(),
            table.sample_ids().len(),
            paths.len()
        );
        Ok(table)
    }

    /// Write the table as CSV with the input file column names.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for record in &self.records {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// All records.
    pub fn records(&self) -> &[CountRecord] {
        &self.records
    }

    /// Iterate over records.
    pub fn iter(&self) -> impl Iterator<Item = &CountRecord> {
        self.records.iter()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Content hash, used to key memoized results.
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }

    /// Distinct sample identifiers, sorted.
    pub fn sample_ids(&self) -> BTreeSet<&str> {
        self.records.iter().map(|r| r.sample_id.as_str()).collect()
    }

    /// Distinct barcodes, sorted.
    pub fn barcodes(&self) -> BTreeSet<&str> {
        self.records.iter().map(|r| r.barcode.as_str()).collect()
    }

    /// Samples tagged as inoculum.
    pub fn inoculum_samples(&self) -> BTreeSet<&str> {
        self.records
            .iter()
            .filter(|r| r.role == SampleRole::Inoculum)
            .map(|r| r.sample_id.as_str())
            .collect()
    }

    /// Distinct dataset ids, sorted.
    pub fn dnaids(&self) -> Vec<&str> {
        self.records
            .iter()
            .map(|r| r.dnaid.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Distinct experiments within a dataset, sorted.
    pub fn experiments(&self, dnaid: &str) -> Vec<&str> {
        self.records
            .iter()
            .filter(|r| r.dnaid == dnaid)
            .map(|r| r.experiment.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Keep only rows matching a predicate.
    pub fn filter<F: Fn(&CountRecord) -> bool>(&self, predicate: F) -> Self {
        Self::new(self.records.iter().filter(|r| predicate(r)).cloned().collect())
    }

    /// Restrict to one (dataset, experiment) pair.
    ///
    /// A pair with no rows is an [`QcError::EmptySelection`].
    pub fn subset_experiment(&self, dnaid: &str, experiment: &str) -> Result<Self> {
        let subset = self.filter(|r| r.dnaid == dnaid && r.experiment == experiment);
        if subset.is_empty() {
            return Err(QcError::EmptySelection(format!(
                "no rows for dnaid '{}' and experiment '{}'",
                dnaid, experiment
            )));
        }
        Ok(subset)
    }

    /// Split the table by (dataset, experiment).
    pub fn group_by_experiment(&self) -> BTreeMap<(String, String), CountTable> {
        let mut groups: BTreeMap<(String, String), Vec<CountRecord>> = BTreeMap::new();
        for record in &self.records {
            groups
                .entry((record.dnaid.clone(), record.experiment.clone()))
                .or_default()
                .push(record.clone());
        }
        groups
            .into_iter()
            .map(|(key, records)| (key, CountTable::new(records)))
            .collect()
    }
}

fn optional(value: &str) -> Option<String> {
    let v = value.trim();
    if v.is_empty() || v == "NA" || v == "na" || v == "nan" || v == "NaN" {
        None
    } else {
        Some(v.to_string())
    }
}

fn parse_count(value: &str) -> Option<u64> {
    let v = value.trim();
    if let Ok(n) = v.parse::<u64>() {
        return Some(n);
    }
    // Counts written by dataframe tools after a fill come out as floats.
    match v.parse::<f64>() {
        Ok(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => Some(f as u64),
        _ => None,
    }
}

fn read_count_csv(path: &Path, roles: &RoleInference, out: &mut Vec<CountRecord>) -> Result<()> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(File::open(path).map_err(|e| QcError::read(path, e))?);
    let headers = reader.headers().map_err(|e| QcError::parse(path, e))?.clone();
    let table = path.display().to_string();

    let position = |name: &str| headers.iter().position(|h| h.trim() == name);
    let mut idx = [0usize; 10];
    for (slot, &name) in idx.iter_mut().zip(columns::REQUIRED.iter()) {
        *slot = position(name).ok_or_else(|| QcError::missing_column(name, table.clone()))?;
    }
    let [bc, sid, cnt, dnaid, exp, mouse, day, organ, short_name, locus] = idx;
    let role_idx = position(columns::ROLE);

    for (row, result) in reader.records().enumerate() {
        let record = result.map_err(|e| QcError::parse(path, e))?;
        let get = |i: usize| record.get(i).unwrap_or("");

        let raw_count = get(cnt);
        let count = parse_count(raw_count).ok_or_else(|| QcError::InvalidCount {
            value: raw_count.to_string(),
            path: path.to_path_buf(),
            row: row + 1,
        })?;

        let sample_id = get(sid).trim().to_string();
        let role = role_idx
            .and_then(|i| SampleRole::parse(get(i)))
            .unwrap_or_else(|| roles.infer(&sample_id));

        out.push(CountRecord {
            barcode: get(bc).trim().to_string(),
            sample_id,
            count,
            dnaid: get(dnaid).trim().to_string(),
            experiment: get(exp).trim().to_string(),
            mouse: optional(get(mouse)),
            day: optional(get(day)),
            organ: optional(get(organ)),
            short_name: optional(get(short_name)),
            locus_tag: optional(get(locus)),
            role,
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = ",barcode,sampleID,cnt,dnaid,experiment,mouse,day,organ,ShortName,locus_tag";

    /// Build a record with only the fields the filters look at.
    pub(crate) fn record(barcode: &str, sample_id: &str, count: u64) -> CountRecord {
        CountRecord {
            barcode: barcode.to_string(),
            sample_id: sample_id.to_string(),
            count,
            dnaid: "dnaid2023".to_string(),
            experiment: "TV5490A".to_string(),
            mouse: Some(sample_id.split('_').next().unwrap_or(sample_id).to_string()),
            day: Some(if sample_id.contains("inoculum") { "d0" } else { "d1" }.to_string()),
            organ: Some("liver".to_string()),
            short_name: Some(format!("gene_{}", barcode)),
            locus_tag: Some(format!("SL_{}", barcode)),
            role: RoleInference::default().infer(sample_id),
        }
    }

    fn write_csv(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_counts() {
        let file = write_csv(&[
            HEADER,
            "0,bc1,inoculum_1,120,dnaid2023,TV5490A,inoculum,d0,,thrA,SL0001",
            "1,bc1,m1_d1,40,dnaid2023,TV5490A,m1,d1,liver,thrA,SL0001",
            "2,bc2,m1_d1,0.0,dnaid2023,TV5490A,m1,d1,liver,NA,",
        ]);
        let table = CountTable::from_csv(file.path()).unwrap();

        assert_eq!(table.len(), 3);
        let rows = table.records();
        assert_eq!(rows[0].role, SampleRole::Inoculum);
        assert_eq!(rows[0].organ, None);
        assert_eq!(rows[1].role, SampleRole::Selected);
        assert_eq!(rows[2].count, 0);
        assert_eq!(rows[2].short_name, None);
        assert_eq!(rows[2].locus_tag, None);
        assert_eq!(table.inoculum_samples().into_iter().collect::<Vec<_>>(), vec!["inoculum_1"]);
    }

    #[test]
    fn test_explicit_role_column_wins() {
        let file = write_csv(&[
            ",barcode,sampleID,cnt,dnaid,experiment,mouse,day,organ,ShortName,locus_tag,role",
            "0,bc1,baseline_A,120,d,e,baseline,d0,,thrA,SL0001,inoculum",
            "1,bc1,inoculum_like,12,d,e,m1,d1,,thrA,SL0001,selected",
        ]);
        let table = CountTable::from_csv(file.path()).unwrap();
        assert_eq!(table.records()[0].role, SampleRole::Inoculum);
        assert_eq!(table.records()[1].role, SampleRole::Selected);
    }

    #[test]
    fn test_missing_required_column() {
        let file = write_csv(&[
            ",barcode,sampleID,cnt,dnaid,experiment,mouse,day,organ,ShortName",
            "0,bc1,s1,1,d,e,m,d1,o,g",
        ]);
        match CountTable::from_csv(file.path()).unwrap_err() {
            QcError::MissingColumn { column, .. } => assert_eq!(column, "locus_tag"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_count() {
        let file = write_csv(&[HEADER, "0,bc1,s1,-3,d,e,m,d1,o,g,l"]);
        assert!(matches!(
            CountTable::from_csv(file.path()),
            Err(QcError::InvalidCount { row: 1, .. })
        ));
    }

    #[test]
    fn test_concatenate_files() {
        let a = write_csv(&[HEADER, "0,bc1,s1,5,dA,e1,m,d1,o,g,l"]);
        let b = write_csv(&[
            ",barcode,sampleID,cnt,dnaid,experiment,mouse,day,organ,ShortName,locus_tag,role",
            "0,bc1,s1,6,dB,e2,m,d1,o,g,l,inoculum",
        ]);
        let table =
            CountTable::from_csv_files(&[a.path(), b.path()], &RoleInference::default()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.dnaids(), vec!["dA", "dB"]);
        assert_eq!(table.records()[1].role, SampleRole::Inoculum);
    }

    #[test]
    fn test_regex_role_inference() {
        let roles = RoleInference::pattern("^(inoc|T0)").unwrap();
        assert_eq!(roles.infer("T0_plate"), SampleRole::Inoculum);
        assert_eq!(roles.infer("m1_inoc"), SampleRole::Selected);
        assert!(RoleInference::pattern("(").is_err());
    }

    #[test]
    fn test_subset_experiment() {
        let mut rows = vec![record("bc1", "inoculum_1", 10), record("bc1", "m1_d1", 3)];
        let mut other = record("bc1", "m2_d1", 4);
        other.experiment = "TV5490B".to_string();
        rows.push(other);
        let table = CountTable::new(rows);

        let subset = table.subset_experiment("dnaid2023", "TV5490A").unwrap();
        assert_eq!(subset.len(), 2);
        assert_eq!(table.experiments("dnaid2023"), vec!["TV5490A", "TV5490B"]);
        assert!(matches!(
            table.subset_experiment("dnaid2023", "missing"),
            Err(QcError::EmptySelection(_))
        ));
    }

    #[test]
    fn test_field_lookup() {
        let r = record("bc1", "m1_d1", 3);
        assert_eq!(r.field("sampleID").unwrap(), Some("m1_d1"));
        assert_eq!(r.field("day").unwrap(), Some("d1"));
        assert!(matches!(r.field("cage"), Err(QcError::MissingColumn { .. })));
        match r.field("cnt").unwrap_err() {
            QcError::InvalidParameter(msg) => assert!(msg.contains("'cnt'")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_ragged_file_names_path() {
        let file = write_csv(&[HEADER, "0,bc1,s1,5,d,e,m,d1,o,g,l", "1,bc2,s1,7,d,e"]);
        let err = CountTable::from_csv(file.path()).unwrap_err();
        assert!(matches!(err, QcError::Parse { .. }));
        let name = file.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(err.to_string().contains(&name));
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = CountTable::from_csv("/nonexistent/counts_a.csv").unwrap_err();
        assert!(matches!(err, QcError::Read { .. }));
        assert!(err.to_string().contains("counts_a.csv"));
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = CountTable::new(vec![record("bc1", "s1", 1)]);
        let b = CountTable::new(vec![record("bc1", "s1", 1)]);
        let c = CountTable::new(vec![record("bc1", "s1", 2)]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}
