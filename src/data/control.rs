//! Spike-in control barcode reference table.

use crate::error::{QcError, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A synthetic barcode added at a known relative concentration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlBarcode {
    /// Barcode sequence or identifier.
    pub barcode: String,
    /// Control category, e.g. `wt` for wild-type controls.
    pub phenotype: String,
    /// Expected relative concentration in the inoculum (positive).
    pub expected_concentration: f64,
}

/// Column layout of a control reference file.
///
/// The reference files are usually headerless, so column roles are given by
/// name against an explicit list of column names rather than by position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlLayout {
    /// Names of the file's columns, in order. Ignored when `has_header` is set.
    pub columns: Vec<String>,
    /// Column holding the barcode.
    pub barcode: String,
    /// Column holding the phenotype label.
    pub phenotype: String,
    /// Column holding the expected concentration.
    pub concentration: String,
    /// Whether the first line of the file is a header row.
    pub has_header: bool,
}

impl Default for ControlLayout {
    fn default() -> Self {
        Self {
            columns: vec!["barcode".into(), "phenotype".into(), "conc".into()],
            barcode: "barcode".into(),
            phenotype: "phenotype".into(),
            concentration: "conc".into(),
            has_header: false,
        }
    }
}

impl ControlLayout {
    /// Headerless layout with a leading `DN` column that is not used.
    pub fn with_leading_discard() -> Self {
        Self {
            columns: vec![
                "DN".into(),
                "barcode".into(),
                "phenotype".into(),
                "conc".into(),
            ],
            ..Self::default()
        }
    }

    /// Resolve the (barcode, phenotype, concentration) column indices.
    fn resolve(&self, names: &[String], table: &str) -> Result<(usize, usize, usize)> {
        let find = |column: &str| {
            names
                .iter()
                .position(|n| n == column)
                .ok_or_else(|| QcError::missing_column(column, table))
        };
        Ok((
            find(&self.barcode)?,
            find(&self.phenotype)?,
            find(&self.concentration)?,
        ))
    }
}

/// The set of control barcodes for a session.
#[derive(Debug, Clone, Default)]
pub struct ControlTable {
    controls: Vec<ControlBarcode>,
    index: HashMap<String, usize>,
}

impl ControlTable {
    /// Build a table from in-memory records. Later duplicates replace earlier ones.
    pub fn from_records(records: Vec<ControlBarcode>) -> Self {
        let mut table = Self::default();
        for record in records {
            table.insert(record);
        }
        table
    }

    /// Load a headerless `barcode, phenotype, conc` TSV file.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_tsv_with_layout(path, &ControlLayout::default())
    }

    /// Load a TSV file using an explicit column layout.
    pub fn from_tsv_with_layout<P: AsRef<Path>>(path: P, layout: &ControlLayout) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| QcError::read(path, e))?;
        let reader = BufReader::new(file);
        let table_name = path.display().to_string();

        let malformed = |line: usize, reason: String| QcError::MalformedReference {
            path: path.to_path_buf(),
            line,
            reason,
        };

        let mut lines = reader.lines().enumerate();
        let names: Vec<String> = if layout.has_header {
            let (_, header) = lines
                .next()
                .ok_or_else(|| malformed(1, "missing header row".to_string()))?;
            header
                .map_err(|e| QcError::read(path, e))?
                .split('\t').map(|s| s.trim().to_string()).collect()
        } else {
            layout.columns.clone()
        };
        let (bc_idx, ph_idx, conc_idx) = layout.resolve(&names, &table_name)?;
        let min_fields = bc_idx.max(ph_idx).max(conc_idx) + 1;

        let mut table = Self::default();

        for (line_idx, line_result) in lines {
            let line_no = line_idx + 1;
            let line = line_result.map_err(|e| QcError::read(path, e))?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < min_fields {
                return Err(malformed(
                    line_no,
                    format!("expected at least {} columns, found {}", min_fields, fields.len()),
                ));
            }

            let barcode = fields[bc_idx].trim();
            if barcode.is_empty() {
                return Err(malformed(line_no, "blank barcode".to_string()));
            }
            let raw_conc = fields[conc_idx].trim();
            let conc: f64 = raw_conc.parse().map_err(|_| {
                malformed(line_no, format!("non-numeric concentration '{}'", raw_conc))
            })?;
            if !conc.is_finite() || conc <= 0.0 {
                return Err(malformed(
                    line_no,
                    format!("concentration must be positive, got {}", raw_conc),
                ));
            }

            table.insert(ControlBarcode {
                barcode: barcode.to_string(),
                phenotype: fields[ph_idx].trim().to_string(),
                expected_concentration: conc,
            });
        }

        info!(
            "Loaded {} control barcodes ({} phenotypes) from {}",
            table.len(),
            table.phenotypes().len(),
            table_name
        );
        Ok(table)
    }

    fn insert(&mut self, record: ControlBarcode) {
        match self.index.get(&record.barcode) {
            Some(&i) => {
                warn!("Duplicate control barcode '{}', keeping the last entry", record.barcode);
                self.controls[i] = record;
            }
            None => {
                self.index.insert(record.barcode.clone(), self.controls.len());
                self.controls.push(record);
            }
        }
    }

    /// Look up a control by barcode.
    pub fn get(&self, barcode: &str) -> Option<&ControlBarcode> {
        self.index.get(barcode).map(|&i| &self.controls[i])
    }

    /// Check whether a barcode is a control.
    pub fn contains(&self, barcode: &str) -> bool {
        self.index.contains_key(barcode)
    }

    /// Number of control barcodes.
    pub fn len(&self) -> usize {
        self.controls.len()
    }

    /// Whether the table has no controls.
    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    /// Iterate over controls in file order.
    pub fn iter(&self) -> impl Iterator<Item = &ControlBarcode> {
        self.controls.iter()
    }

    /// Distinct phenotype labels, sorted.
    pub fn phenotypes(&self) -> Vec<&str> {
        self.controls
            .iter()
            .map(|c| c.phenotype.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Content hash, used to key memoized results.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        for c in &self.controls {
            c.barcode.hash(&mut hasher);
            c.phenotype.hash(&mut hasher);
            c.expected_concentration.to_bits().hash(&mut hasher);
        }
        hasher.finish()
    }
}
