//! Inoculum-based barcode filtering for a single experiment.

use crate::data::{CountTable, Outcome, SampleRole, WideCounts};
use crate::error::{QcError, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

/// One cell of the filtered, zero-filled long table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilteredCount {
    pub barcode: String,
    #[serde(rename = "sampleID")]
    pub sample_id: String,
    #[serde(rename = "cnt")]
    pub count: u64,
    pub mouse: Option<String>,
    pub day: Option<String>,
}

/// Statistics about what the inoculum filter removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterStats {
    /// Minimum count required in every inoculum sample.
    pub threshold: u64,
    /// Number of inoculum samples the threshold was checked against.
    pub n_inoculum_samples: usize,
    /// Number of barcodes before filtering.
    pub n_before: usize,
    /// Number of barcodes after filtering.
    pub n_after: usize,
    /// Number of barcodes removed.
    pub n_removed: usize,
    /// Proportion of barcodes retained.
    pub retention_rate: f64,
}

impl std::fmt::Display for FilterStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Inoculum Filter Result")?;
        writeln!(f, "  Threshold: >= {} in {} inoculum sample(s)", self.threshold, self.n_inoculum_samples)?;
        writeln!(f, "  Before:    {} barcodes", self.n_before)?;
        writeln!(f, "  After:     {} barcodes", self.n_after)?;
        writeln!(f, "  Removed:   {} barcodes", self.n_removed)?;
        writeln!(f, "  Retained:  {:.1}%", self.retention_rate * 100.0)?;
        Ok(())
    }
}

/// Output of [`filter_inoculum`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilteredCounts {
    pub records: Vec<FilteredCount>,
    pub stats: FilterStats,
}

impl FilteredCounts {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Retained barcodes.
    pub fn barcodes(&self) -> BTreeSet<&str> {
        self.records.iter().map(|r| r.barcode.as_str()).collect()
    }

    /// Number of retained barcodes per mouse on a given day.
    ///
    /// With `day = "d0"` this is the per-inoculum barcode table.
    pub fn barcodes_per_mouse(&self, day: &str) -> BTreeMap<String, usize> {
        let mut per_mouse: BTreeMap<String, BTreeSet<&str>> = BTreeMap::new();
        for r in self.records.iter().filter(|r| r.day.as_deref() == Some(day)) {
            if let Some(mouse) = &r.mouse {
                per_mouse.entry(mouse.clone()).or_default().insert(&r.barcode);
            }
        }
        per_mouse.into_iter().map(|(m, bcs)| (m, bcs.len())).collect()
    }

    /// Write the filtered rows as CSV.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for rec in &self.records {
            writer.serialize(rec)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Keep barcodes that reach `threshold` in every inoculum sample of one experiment.
///
/// The table is pivoted to barcode × sample, barcodes with any inoculum cell
/// below the threshold (or unobserved) are dropped, and the survivors are
/// melted back with unobserved cells filled with 0. Every retained barcode
/// appears once per sample of the experiment. Mouse and day come from the
/// matching (barcode, sample) row, or from any row of the sample when the
/// barcode was unobserved there.
///
/// An experiment without inoculum samples keeps every barcode.
///
/// # Arguments
/// * `table` - Long-format counts of a single (dnaid, experiment) pair
/// * `threshold` - Minimum count required in every inoculum sample
///
/// # Returns
/// The filtered long table, or `NoData` if no barcode passes.
pub fn filter_inoculum(table: &CountTable, threshold: u64) -> Result<Outcome<FilteredCounts>> {
    let experiments: BTreeSet<(&str, &str)> = table
        .iter()
        .map(|r| (r.dnaid.as_str(), r.experiment.as_str()))
        .collect();
    if experiments.len() > 1 {
        return Err(QcError::InvalidParameter(format!(
            "filter_inoculum expects one experiment, found {}; use filter_all_experiments",
            experiments.len()
        )));
    }
    if table.is_empty() {
        return Ok(Outcome::NoData("count table is empty".to_string()));
    }

    // Gene annotation columns are not part of the pivot, so rows that differ
    // only in annotation collapse here.
    let grid = WideCounts::pivot(
        table
            .iter()
            .map(|r| (r.barcode.as_str(), r.sample_id.as_str(), r.count)),
    )?;

    let inoculum: BTreeSet<&str> = table
        .iter()
        .filter(|r| r.role == SampleRole::Inoculum)
        .map(|r| r.sample_id.as_str())
        .collect();
    let inoculum_cols: Vec<usize> = inoculum
        .iter()
        .filter_map(|s| grid.sample_index(s))
        .collect();
    if inoculum_cols.is_empty() {
        warn!("No inoculum samples found; keeping all {} barcodes", grid.n_barcodes());
    }

    // Compare before filling: an unobserved inoculum cell fails.
    let keep: Vec<usize> = (0..grid.n_barcodes())
        .filter(|&row| {
            inoculum_cols
                .iter()
                .all(|&col| grid.get(row, col).map_or(false, |c| c >= threshold))
        })
        .collect();

    let n_before = grid.n_barcodes();
    let stats = FilterStats {
        threshold,
        n_inoculum_samples: inoculum_cols.len(),
        n_before,
        n_after: keep.len(),
        n_removed: n_before - keep.len(),
        retention_rate: if n_before > 0 {
            keep.len() as f64 / n_before as f64
        } else {
            0.0
        },
    };
    debug!(
        "Inoculum filter kept {}/{} barcodes at threshold {}",
        stats.n_after, stats.n_before, threshold
    );

    if keep.is_empty() {
        return Ok(Outcome::NoData(format!(
            "no barcode has count >= {} in all {} inoculum sample(s)",
            threshold,
            inoculum_cols.len()
        )));
    }

    let filtered = grid.subset_barcodes(&keep)?;

    let mut by_cell: HashMap<(&str, &str), (Option<&str>, Option<&str>)> = HashMap::new();
    let mut by_sample: HashMap<&str, (Option<&str>, Option<&str>)> = HashMap::new();
    for r in table.iter() {
        let labels = (r.mouse.as_deref(), r.day.as_deref());
        by_cell.entry((r.barcode.as_str(), r.sample_id.as_str())).or_insert(labels);
        let entry = by_sample.entry(r.sample_id.as_str()).or_insert(labels);
        if entry.0.is_none() && entry.1.is_none() {
            *entry = labels;
        }
    }

    let records = filtered
        .melt()
        .into_iter()
        .map(|cell| {
            let (mouse, day) = by_cell
                .get(&(cell.barcode.as_str(), cell.sample_id.as_str()))
                .or_else(|| by_sample.get(cell.sample_id.as_str()))
                .copied()
                .unwrap_or((None, None));
            let (mouse, day) = (mouse.map(String::from), day.map(String::from));
            FilteredCount {
                barcode: cell.barcode,
                sample_id: cell.sample_id,
                count: cell.count.unwrap_or(0),
                mouse,
                day,
            }
        })
        .collect();

    Ok(Outcome::Data(FilteredCounts { records, stats }))
}
