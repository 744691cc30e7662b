//! Per-day report of passing and failing mice.

use crate::data::CountTable;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Passing and failing mice on one sampling day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySummary {
    pub day: String,
    /// Mice with at least one sample in the good set.
    pub passing: Vec<String>,
    /// Mice with at least one sample outside the good set.
    pub failed: Vec<String>,
}

impl DaySummary {
    /// Number of passing mice.
    pub fn n_passing(&self) -> usize {
        self.passing.len()
    }
}

#[derive(Serialize)]
struct DaySummaryRow<'a> {
    day: &'a str,
    #[serde(rename = "Number of samples")]
    n_passing: usize,
    #[serde(rename = "Passing Samples")]
    passing: String,
    #[serde(rename = "Failed Samples")]
    failed: String,
}

/// Summarise sample classification by day.
///
/// Samples are matched against `good` by sample id; rows without a day or a
/// mouse label are skipped. Days and mice are sorted.
pub fn summarize_samples_by_day(counts: &CountTable, good: &BTreeSet<String>) -> Vec<DaySummary> {
    let mut days: BTreeMap<&str, (BTreeSet<&str>, BTreeSet<&str>)> = BTreeMap::new();
    for record in counts.iter() {
        let (day, mouse) = match (record.day.as_deref(), record.mouse.as_deref()) {
            (Some(d), Some(m)) => (d, m),
            _ => continue,
        };
        let (passing, failed) = days.entry(day).or_default();
        if good.contains(&record.sample_id) {
            passing.insert(mouse);
        } else {
            failed.insert(mouse);
        }
    }

    days.into_iter()
        .map(|(day, (passing, failed))| DaySummary {
            day: day.to_string(),
            passing: passing.into_iter().map(String::from).collect(),
            failed: failed.into_iter().map(String::from).collect(),
        })
        .collect()
}

/// Write day summaries as CSV, with mice joined by ", " and `N/A` for none.
pub fn write_day_summary_csv<P: AsRef<Path>>(summaries: &[DaySummary], path: P) -> Result<()> {
    let join = |mice: &[String]| {
        if mice.is_empty() {
            "N/A".to_string()
        } else {
            mice.join(", ")
        }
    };
    let mut writer = csv::Writer::from_path(path)?;
    for s in summaries {
        writer.serialize(DaySummaryRow {
            day: &s.day,
            n_passing: s.n_passing(),
            passing: join(&s.passing),
            failed: join(&s.failed),
        })?;
    }
    writer.flush()?;
    Ok(())
}
