//! Inoculum filtering applied independently to every experiment.

use super::inoculum::{filter_inoculum, FilterStats};
use crate::data::{CountTable, Outcome};
use crate::error::Result;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// A filtered count with its experiment and gene annotation re-attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedCount {
    pub barcode: String,
    #[serde(rename = "sampleID")]
    pub sample_id: String,
    #[serde(rename = "cnt")]
    pub count: u64,
    pub dnaid: String,
    pub experiment: String,
    #[serde(rename = "ShortName")]
    pub short_name: Option<String>,
    pub locus_tag: Option<String>,
    pub mouse: Option<String>,
    pub day: Option<String>,
    pub organ: Option<String>,
}

/// What the filter did to one experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentSummary {
    pub dnaid: String,
    pub experiment: String,
    /// Filter statistics, or `None` when the experiment kept nothing.
    pub stats: Option<FilterStats>,
    /// Reason the experiment contributed no rows, if it did not.
    pub no_data: Option<String>,
}

/// Output of [`filter_all_experiments`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotatedCounts {
    pub records: Vec<AnnotatedCount>,
    pub experiments: Vec<ExperimentSummary>,
}

impl AnnotatedCounts {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Retained barcodes of one experiment.
    pub fn barcodes(&self, dnaid: &str, experiment: &str) -> BTreeSet<&str> {
        self.records
            .iter()
            .filter(|r| r.dnaid == dnaid && r.experiment == experiment)
            .map(|r| r.barcode.as_str())
            .collect()
    }

    /// Write the rows as CSV.
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for rec in &self.records {
            writer.serialize(rec)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Annotation<'a> {
    short_name: Option<&'a str>,
    locus_tag: Option<&'a str>,
    organ: Option<&'a str>,
}

/// Filter every (dnaid, experiment) group against its own inoculum.
///
/// Barcode retention is decided per group only. Gene annotation
/// (`ShortName`, `locus_tag`, `organ`) is re-attached by a left join on
/// (dnaid, experiment, sample, barcode): unmatched rows keep null annotation,
/// and a key with several distinct annotations yields one row per annotation.
/// Row order is unspecified.
///
/// # Returns
/// The combined table, or `NoData` when no group retains a barcode.
pub fn filter_all_experiments(
    table: &CountTable,
    threshold: u64,
) -> Result<Outcome<AnnotatedCounts>> {
    let mut annotations: HashMap<(&str, &str, &str, &str), Vec<Annotation>> = HashMap::new();
    for r in table.iter() {
        let ann = Annotation {
            short_name: r.short_name.as_deref(),
            locus_tag: r.locus_tag.as_deref(),
            organ: r.organ.as_deref(),
        };
        let entry = annotations
            .entry((
                r.dnaid.as_str(),
                r.experiment.as_str(),
                r.sample_id.as_str(),
                r.barcode.as_str(),
            ))
            .or_default();
        if !entry.contains(&ann) {
            entry.push(ann);
        }
    }

    let mut records = Vec::new();
    let mut experiments = Vec::new();

    for ((dnaid, experiment), group) in table.group_by_experiment() {
        let filtered = match filter_inoculum(&group, threshold)? {
            Outcome::Data(f) => f,
            Outcome::NoData(reason) => {
                debug!("{} / {}: {}", dnaid, experiment, reason);
                experiments.push(ExperimentSummary {
                    dnaid,
                    experiment,
                    stats: None,
                    no_data: Some(reason),
                });
                continue;
            }
        };

        for rec in &filtered.records {
            let key = (
                dnaid.as_str(),
                experiment.as_str(),
                rec.sample_id.as_str(),
                rec.barcode.as_str(),
            );
            let base = AnnotatedCount {
                barcode: rec.barcode.clone(),
                sample_id: rec.sample_id.clone(),
                count: rec.count,
                dnaid: dnaid.clone(),
                experiment: experiment.clone(),
                short_name: None,
                locus_tag: None,
                mouse: rec.mouse.clone(),
                day: rec.day.clone(),
                organ: None,
            };
            match annotations.get(&key) {
                Some(anns) => {
                    for ann in anns {
                        records.push(AnnotatedCount {
                            short_name: ann.short_name.map(String::from),
                            locus_tag: ann.locus_tag.map(String::from),
                            organ: ann.organ.map(String::from),
                            ..base.clone()
                        });
                    }
                }
                None => records.push(base),
            }
        }

        experiments.push(ExperimentSummary {
            dnaid,
            experiment,
            stats: Some(filtered.stats),
            no_data: None,
        });
    }

    info!(
        "Filtered {} experiment(s) at threshold {}: {} rows retained",
        experiments.len(),
        threshold,
        records.len()
    );

    if records.is_empty() {
        return Ok(Outcome::NoData(format!(
            "no barcode passes threshold {} in any experiment",
            threshold
        )));
    }
    Ok(Outcome::Data(AnnotatedCounts {
        records,
        experiments,
    }))
}

/// Rows whose `ShortName` or `locus_tag` is `gene`.
pub fn barcodes_for_gene<'a>(
    counts: &'a AnnotatedCounts,
    gene: &str,
) -> Outcome<Vec<&'a AnnotatedCount>> {
    let rows: Vec<&AnnotatedCount> = counts
        .records
        .iter()
        .filter(|r| r.short_name.as_deref() == Some(gene) || r.locus_tag.as_deref() == Some(gene))
        .collect();
    if rows.is_empty() {
        Outcome::NoData(format!("{} not found", gene))
    } else {
        Outcome::Data(rows)
    }
}
