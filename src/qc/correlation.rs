//! Control-barcode correlation and good-sample classification.
//!
//! Spike-in control barcodes are added to the inoculum at known relative
//! concentrations. In a sample where the bottleneck was mild, observed counts
//! of the controls track their expected concentration, so the Pearson
//! correlation between the two is close to 1:
//!
//! ```text
//! r(phenotype, group) = pearson(f(conc_i), g(count_i))   for control i in group
//! ```
//!
//! where `f` and `g` are the identity (`raw`) or `log10` (`log`,
//! `log-keep-zero`). A sample is "good" when its wild-type correlation exceeds
//! the cutoff; other phenotypes are reported only.

use crate::data::{columns, ControlTable, CountRecord, CountTable};
use crate::error::{QcError, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Phenotype label of wild-type controls.
pub const WILD_TYPE: &str = "wt";

/// How concentrations and counts are transformed before correlating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Transform {
    /// Use concentration and count as-is.
    Raw,
    /// log10 of both; pairs with a zero count are dropped.
    #[default]
    Log,
    /// log10 of both, with a zero count replaced by 1 first.
    LogKeepZero,
}

impl Transform {
    /// Get the descriptive name.
    pub fn name(&self) -> &'static str {
        match self {
            Transform::Raw => "raw",
            Transform::Log => "log",
            Transform::LogKeepZero => "log-keep-zero",
        }
    }

    /// Transform one (concentration, count) pair, or `None` if it must be dropped.
    fn apply(&self, conc: f64, count: u64) -> Option<(f64, f64)> {
        match self {
            Transform::Raw => Some((conc, count as f64)),
            Transform::Log if count == 0 => None,
            Transform::Log => Some((conc.log10(), (count as f64).log10())),
            Transform::LogKeepZero => Some((conc.log10(), (count.max(1) as f64).log10())),
        }
    }
}

/// Parameters for [`compute_correlations`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Count-table column whose values define the groups.
    pub grouping_column: String,
    pub transform: Transform,
    /// A group passes when its wild-type correlation is strictly greater.
    pub cutoff: f64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            grouping_column: columns::SAMPLE_ID.to_string(),
            transform: Transform::Log,
            cutoff: 0.9,
        }
    }
}

/// Correlation for one (phenotype, group) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationRecord {
    pub phenotype: String,
    /// Value of the grouping column (the sample id by default).
    #[serde(rename = "sampleID")]
    pub sample_id: String,
    /// Pearson correlation; NaN when undefined.
    #[serde(rename = "R")]
    pub r: f64,
    /// Number of paired points that entered the correlation.
    pub n: usize,
}

/// Correlations plus the resulting good-sample set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationReport {
    pub records: Vec<CorrelationRecord>,
    /// Groups whose wild-type correlation exceeds the cutoff.
    pub good: BTreeSet<String>,
    pub cutoff: f64,
    pub transform: Transform,
}

impl CorrelationReport {
    /// Whether a group passed.
    pub fn is_good(&self, group: &str) -> bool {
        self.good.contains(group)
    }

    /// Whether any control barcode was found in the counts at all.
    pub fn has_controls(&self) -> bool {
        !self.records.is_empty()
    }

    /// Correlation for a (phenotype, group) pair.
    pub fn r(&self, phenotype: &str, group: &str) -> Option<f64> {
        self.records
            .iter()
            .find(|rec| rec.phenotype == phenotype && rec.sample_id == group)
            .map(|rec| rec.r)
    }

    /// Groups with a correlation record that did not pass.
    pub fn failed(&self) -> BTreeSet<&str> {
        self.records
            .iter()
            .map(|rec| rec.sample_id.as_str())
            .filter(|g| !self.good.contains(*g))
            .collect()
    }

    /// Write the correlation records as CSV.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for rec in &self.records {
            writer.serialize(rec)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl std::fmt::Display for CorrelationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Control Correlations ({})", self.transform.name())?;
        for rec in &self.records {
            writeln!(
                f,
                "  {:<12} {:<24} R = {:>7.4}  (n = {})",
                rec.phenotype, rec.sample_id, rec.r, rec.n
            )?;
        }
        writeln!(f, "  Passing (R > {:.2}): {}", self.cutoff, self.good.len())?;
        Ok(())
    }
}

/// Compute control correlations for every (phenotype, group) pair.
///
/// # Arguments
/// * `counts` - Count table, usually restricted to one experiment
/// * `controls` - Control barcode reference
/// * `config` - Grouping column, transform and cutoff
///
/// # Returns
/// One record per (phenotype, group) pair present among the control rows, and
/// the set of groups whose wild-type correlation is defined and above the cutoff.
/// No control barcodes in `counts` gives an empty report, not an error.
pub fn compute_correlations(
    counts: &CountTable,
    controls: &ControlTable,
    config: &CorrelationConfig,
) -> Result<CorrelationReport> {
    if !(0.0..=1.0).contains(&config.cutoff) {
        return Err(QcError::InvalidParameter(
            "Correlation cutoff must be between 0 and 1".to_string(),
        ));
    }
    CountRecord::check_field(&config.grouping_column)?;

    // (phenotype, group) -> transformed points; a group with every point
    // dropped still gets a (NaN) record.
    let mut groups: BTreeMap<(String, String), Vec<(f64, f64)>> = BTreeMap::new();
    let mut n_dropped = 0usize;

    for record in counts.iter() {
        let control = match controls.get(&record.barcode) {
            Some(c) => c,
            None => continue,
        };
        let group = match record.field(&config.grouping_column)? {
            Some(g) => g,
            None => continue,
        };
        let points = groups
            .entry((control.phenotype.clone(), group.to_string()))
            .or_default();
        match config.transform.apply(control.expected_concentration, record.count) {
            Some(point) => points.push(point),
            None => n_dropped += 1,
        }
    }

    if n_dropped > 0 {
        warn!(
            "Dropped {} zero-count control observations under log transform",
            n_dropped
        );
    }

    let records: Vec<CorrelationRecord> = groups
        .into_iter()
        .map(|((phenotype, sample_id), points)| {
            let (x, y): (Vec<f64>, Vec<f64>) = points.into_iter().unzip();
            let r = pearson(&x, &y);
            debug!("{} / {}: R = {:.4} over {} points", phenotype, sample_id, r, x.len());
            CorrelationRecord {
                phenotype,
                sample_id,
                r,
                n: x.len(),
            }
        })
        .collect();

    let good = classify_good(&records, config.cutoff);

    Ok(CorrelationReport {
        records,
        good,
        cutoff: config.cutoff,
        transform: config.transform,
    })
}

/// Groups whose wild-type correlation is defined and strictly above `cutoff`.
pub fn classify_good(records: &[CorrelationRecord], cutoff: f64) -> BTreeSet<String> {
    records
        .iter()
        .filter(|rec| rec.phenotype == WILD_TYPE && rec.r.is_finite() && rec.r > cutoff)
        .map(|rec| rec.sample_id.clone())
        .collect()
}

/// Pearson correlation coefficient.
///
/// NaN when there are fewer than two points or either axis has zero variance.
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return f64::NAN;
    }
    let nf = n as f64;
    let mean_x = x[..n].iter().sum::<f64>() / nf;
    let mean_y = y[..n].iter().sum::<f64>() / nf;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in x.iter().zip(y.iter()) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x > 0.0 && var_y > 0.0 {
        (cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0)
    } else {
        f64::NAN
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{test_record, ControlBarcode};
    use approx::assert_relative_eq;

    fn control(barcode: &str, phenotype: &str, conc: f64) -> ControlBarcode {
        ControlBarcode {
            barcode: barcode.to_string(),
            phenotype: phenotype.to_string(),
            expected_concentration: conc,
        }
    }

    fn example_controls() -> ControlTable {
        ControlTable::from_records(vec![control("bc1", "wt", 10.0), control("bc2", "wt", 100.0)])
    }

    fn example_counts() -> CountTable {
        CountTable::new(vec![
            test_record("bc1", "s1", 9),
            test_record("bc2", "s1", 95),
            test_record("bc1", "s2", 1),
            test_record("bc2", "s2", 5),
            test_record("mutant", "s1", 500),
        ])
    }

    #[test]
    fn test_pearson_known_values() {
        assert_relative_eq!(pearson(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]), 1.0, epsilon = 1e-12);
        assert_relative_eq!(pearson(&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]), -1.0, epsilon = 1e-12);
        // x = 1..4, y = [1, 3, 2, 4]: cov 4, var 5 each
        assert_relative_eq!(
            pearson(&[1.0, 2.0, 3.0, 4.0], &[1.0, 3.0, 2.0, 4.0]),
            0.8,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_pearson_undefined() {
        assert!(pearson(&[1.0], &[1.0]).is_nan());
        assert!(pearson(&[], &[]).is_nan());
        assert!(pearson(&[1.0, 2.0], &[3.0, 3.0]).is_nan());
    }

    #[test]
    fn test_two_point_example_log() {
        let report =
            compute_correlations(&example_counts(), &example_controls(), &CorrelationConfig::default())
                .unwrap();

        let x = [10f64.log10(), 100f64.log10()];
        let expected_s1 = pearson(&x, &[9f64.log10(), 95f64.log10()]);
        let expected_s2 = pearson(&x, &[1f64.log10(), 5f64.log10()]);

        let r1 = report.r("wt", "s1").unwrap();
        let r2 = report.r("wt", "s2").unwrap();
        assert_relative_eq!(r1, expected_s1, epsilon = 1e-12);
        assert_relative_eq!(r2, expected_s2, epsilon = 1e-12);
        // Two increasing points always correlate perfectly.
        assert_relative_eq!(r1, 1.0, epsilon = 1e-12);
        assert_relative_eq!(r2, 1.0, epsilon = 1e-12);
        assert_eq!(report.records.len(), 2);
    }

    #[test]
    fn test_log_drops_zero_counts() {
        let mut counts = example_counts().records().to_vec();
        counts.push(test_record("bc3", "s1", 0));
        let controls = ControlTable::from_records(vec![
            control("bc1", "wt", 10.0),
            control("bc2", "wt", 100.0),
            control("bc3", "wt", 1000.0),
        ]);
        let table = CountTable::new(counts);

        let log = compute_correlations(&table, &controls, &CorrelationConfig::default()).unwrap();
        let s1 = log.records.iter().find(|r| r.sample_id == "s1").unwrap();
        assert_eq!(s1.n, 2);
        assert!(s1.r.is_finite());

        let keep = CorrelationConfig {
            transform: Transform::LogKeepZero,
            ..CorrelationConfig::default()
        };
        let kept = compute_correlations(&table, &controls, &keep).unwrap();
        let s1 = kept.records.iter().find(|r| r.sample_id == "s1").unwrap();
        assert_eq!(s1.n, 3);
        assert!(s1.r < 0.9);
    }

    #[test]
    fn test_all_zero_group_is_nan_not_error() {
        let table = CountTable::new(vec![test_record("bc1", "s9", 0), test_record("bc2", "s9", 0)]);
        let report =
            compute_correlations(&table, &example_controls(), &CorrelationConfig::default()).unwrap();
        assert_eq!(report.records.len(), 1);
        assert!(report.records[0].r.is_nan());
        assert_eq!(report.records[0].n, 0);
        assert!(report.good.is_empty());
    }

    #[test]
    fn test_raw_transform() {
        let config = CorrelationConfig {
            transform: Transform::Raw,
            ..CorrelationConfig::default()
        };
        let controls = ControlTable::from_records(vec![
            control("bc1", "wt", 1.0),
            control("bc2", "wt", 2.0),
            control("bc3", "wt", 3.0),
        ]);
        let table = CountTable::new(vec![
            test_record("bc1", "s1", 10),
            test_record("bc2", "s1", 30),
            test_record("bc3", "s1", 20),
        ]);
        let report = compute_correlations(&table, &controls, &config).unwrap();
        assert_relative_eq!(report.r("wt", "s1").unwrap(), 0.5, epsilon = 1e-12);
        assert!(!report.is_good("s1"));
    }

    #[test]
    fn test_good_samples_only_use_wild_type() {
        let mut controls: Vec<ControlBarcode> = example_controls().iter().cloned().collect();
        controls.push(control("att1", "attenuated", 10.0));
        controls.push(control("att2", "attenuated", 100.0));
        let controls = ControlTable::from_records(controls);

        let base = example_counts().records().to_vec();
        let mut a = base.clone();
        a.push(test_record("att1", "s1", 100));
        a.push(test_record("att2", "s1", 1));
        let mut b = base;
        b.push(test_record("att1", "s1", 1));
        b.push(test_record("att2", "s1", 100));

        let config = CorrelationConfig::default();
        let ra = compute_correlations(&CountTable::new(a), &controls, &config).unwrap();
        let rb = compute_correlations(&CountTable::new(b), &controls, &config).unwrap();

        assert!(ra.r("attenuated", "s1").unwrap() < 0.0);
        assert!(rb.r("attenuated", "s1").unwrap() > 0.0);
        assert_eq!(ra.good, rb.good);
    }

    #[test]
    fn test_cutoff_is_strict() {
        let records = vec![
            CorrelationRecord {
                phenotype: "wt".into(),
                sample_id: "s1".into(),
                r: 0.9,
                n: 3,
            },
            CorrelationRecord {
                phenotype: "wt".into(),
                sample_id: "s2".into(),
                r: 0.95,
                n: 3,
            },
            CorrelationRecord {
                phenotype: "wt".into(),
                sample_id: "s3".into(),
                r: f64::NAN,
                n: 1,
            },
        ];
        let good = classify_good(&records, 0.9);
        assert_eq!(good.into_iter().collect::<Vec<_>>(), vec!["s2".to_string()]);
    }

    #[test]
    fn test_group_by_other_column() {
        let config = CorrelationConfig {
            grouping_column: "day".to_string(),
            ..CorrelationConfig::default()
        };
        let report = compute_correlations(&example_counts(), &example_controls(), &config).unwrap();
        // s1 and s2 are both day d1 in the fixture
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].sample_id, "d1");
        assert_eq!(report.records[0].n, 4);

        let bad = CorrelationConfig {
            grouping_column: "cage".to_string(),
            ..CorrelationConfig::default()
        };
        assert!(matches!(
            compute_correlations(&example_counts(), &example_controls(), &bad),
            Err(QcError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_no_controls_is_empty_report() {
        let table = CountTable::new(vec![test_record("other", "s1", 4)]);
        let report =
            compute_correlations(&table, &example_controls(), &CorrelationConfig::default()).unwrap();
        assert!(!report.has_controls());
        assert!(report.good.is_empty());
    }

    #[test]
    fn test_unknown_group_column_without_controls() {
        let table = CountTable::new(vec![test_record("other", "s1", 4)]);
        let config = CorrelationConfig {
            grouping_column: "cage".to_string(),
            ..CorrelationConfig::default()
        };
        assert!(matches!(
            compute_correlations(&table, &example_controls(), &config),
            Err(QcError::MissingColumn { .. })
        ));

        let numeric = CorrelationConfig {
            grouping_column: "cnt".to_string(),
            ..CorrelationConfig::default()
        };
        assert!(matches!(
            compute_correlations(&table, &example_controls(), &numeric),
            Err(QcError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_failed_groups() {
        let mut rows = example_counts().records().to_vec();
        rows.push(test_record("bc1", "s3", 50));
        rows.push(test_record("bc2", "s3", 5));
        let report =
            compute_correlations(&CountTable::new(rows), &example_controls(), &CorrelationConfig::default())
                .unwrap();
        assert_eq!(report.failed().into_iter().collect::<Vec<_>>(), vec!["s3"]);
    }

    #[test]
    fn test_invalid_cutoff() {
        let config = CorrelationConfig {
            cutoff: 1.5,
            ..CorrelationConfig::default()
        };
        assert!(compute_correlations(&example_counts(), &example_controls(), &config).is_err());
    }

    #[test]
    fn test_defined_r_in_range() {
        let controls = ControlTable::from_records(
            (1..=6)
                .map(|i| control(&format!("c{}", i), "wt", 10f64.powi(i)))
                .collect(),
        );
        let mut rows: Vec<CountRecord> = Vec::new();
        for s in 0..5u64 {
            for i in 1..=6u64 {
                let count = (i * 37 + s * 11) % 23 + s;
                rows.push(test_record(&format!("c{}", i), &format!("m{}_d1", s), count));
            }
        }
        let report = compute_correlations(
            &CountTable::new(rows),
            &controls,
            &CorrelationConfig {
                transform: Transform::LogKeepZero,
                ..CorrelationConfig::default()
            },
        )
        .unwrap();
        for rec in &report.records {
            if rec.n < 2 {
                assert!(rec.r.is_nan());
            } else if rec.r.is_finite() {
                assert!((-1.0..=1.0).contains(&rec.r));
            }
        }
    }
}
