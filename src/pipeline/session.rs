//! A user session: loaded tables plus memoized derivations.

use super::cache::{CacheKey, CacheStats, MemoCache};
use super::config::AnalysisConfig;
use crate::data::{ControlTable, CountTable, Outcome};
use crate::error::{QcError, Result};
use crate::filter::{filter_all_experiments, filter_inoculum, AnnotatedCounts, FilteredCounts};
use crate::qc::{compute_correlations, summarize_samples_by_day, CorrelationConfig, CorrelationReport, DaySummary};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Which rows of the count table an operation sees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub dnaid: Option<String>,
    pub experiment: Option<String>,
}

impl Selection {
    /// Select everything.
    pub fn all() -> Self {
        Self::default()
    }

    /// Select one (dnaid, experiment) pair.
    pub fn experiment(dnaid: &str, experiment: &str) -> Self {
        Self {
            dnaid: Some(dnaid.to_string()),
            experiment: Some(experiment.to_string()),
        }
    }

    /// Apply the selection. A selection matching no rows is an
    /// [`QcError::EmptySelection`].
    pub fn apply(&self, counts: &CountTable) -> Result<CountTable> {
        match (&self.dnaid, &self.experiment) {
            (None, None) => Ok(counts.clone()),
            (Some(d), Some(e)) => counts.subset_experiment(d, e),
            (Some(d), None) => {
                let subset = counts.filter(|r| &r.dnaid == d);
                if subset.is_empty() {
                    return Err(QcError::EmptySelection(format!("no rows for dnaid '{}'", d)));
                }
                Ok(subset)
            }
            (None, Some(_)) => Err(QcError::InvalidParameter(
                "an experiment selection needs a dnaid".to_string(),
            )),
        }
    }
}

/// Tables loaded for one user, with their derived results memoized.
///
/// Every derivation is keyed on the content of both tables and all of its
/// parameters, so replacing a table never serves stale results.
#[derive(Debug)]
pub struct Session {
    counts: CountTable,
    controls: ControlTable,
    cache: MemoCache,
}

impl Session {
    /// Create a session over already loaded tables.
    pub fn new(counts: CountTable, controls: ControlTable) -> Self {
        Self {
            counts,
            controls,
            cache: MemoCache::new(),
        }
    }

    /// Load the tables named by a configuration.
    pub fn from_config(config: &AnalysisConfig) -> Result<Self> {
        let roles = config.role_inference()?;
        let files = config.count_files()?;
        let counts = CountTable::from_csv_files(&files, &roles)?;
        let controls = ControlTable::from_tsv_with_layout(&config.controls, &config.control_layout)?;
        info!("Session '{}' ready: {} count rows, {} controls", config.name, counts.len(), controls.len());
        Ok(Self::new(counts, controls))
    }

    /// The loaded count table.
    pub fn counts(&self) -> &CountTable {
        &self.counts
    }

    /// The loaded control table.
    pub fn controls(&self) -> &ControlTable {
        &self.controls
    }

    /// Swap in a new count table and drop cached results.
    pub fn replace_counts(&mut self, counts: CountTable) {
        self.counts = counts;
        self.invalidate();
    }

    /// Swap in a new control table and drop cached results.
    pub fn replace_controls(&mut self, controls: ControlTable) {
        self.controls = controls;
        self.invalidate();
    }

    /// Drop every cached result.
    pub fn invalidate(&mut self) {
        debug!("Invalidating {} cached result(s)", self.cache.len());
        self.cache.invalidate();
    }

    /// Cache hit/miss counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.counts.fingerprint().hash(&mut hasher);
        self.controls.fingerprint().hash(&mut hasher);
        hasher.finish()
    }

    /// Control correlations over a selection.
    ///
    /// `NoData` when the selection holds no control barcode at all.
    pub fn correlations(
        &mut self,
        selection: &Selection,
        config: &CorrelationConfig,
    ) -> Result<Outcome<CorrelationReport>> {
        let key = CacheKey::new("correlations", self.content_hash(), &(selection, config))?;
        let Session { counts, controls, cache } = self;
        cache.get_or_try_insert_with(key, || {
            let subset = selection.apply(counts)?;
            let report = compute_correlations(&subset, controls, config)?;
            if report.has_controls() {
                Ok(Outcome::Data(report))
            } else {
                Ok(Outcome::NoData("no control barcodes in the selected samples".to_string()))
            }
        })
    }

    /// Passing and failing mice per day under the given correlation settings.
    pub fn day_summary(
        &mut self,
        selection: &Selection,
        config: &CorrelationConfig,
    ) -> Result<Outcome<Vec<DaySummary>>> {
        let report = match self.correlations(selection, config)? {
            Outcome::Data(r) => r,
            Outcome::NoData(reason) => return Ok(Outcome::NoData(reason)),
        };
        let subset = selection.apply(&self.counts)?;
        Ok(Outcome::Data(summarize_samples_by_day(&subset, &report.good)))
    }

    /// Inoculum filter on one experiment.
    pub fn filter_experiment(
        &mut self,
        dnaid: &str,
        experiment: &str,
        threshold: u64,
    ) -> Result<Outcome<FilteredCounts>> {
        let selection = Selection::experiment(dnaid, experiment);
        let key = CacheKey::new("filter_inoculum", self.content_hash(), &(&selection, threshold))?;
        let Session { counts, cache, .. } = self;
        cache.get_or_try_insert_with(key, || {
            let subset = selection.apply(counts)?;
            filter_inoculum(&subset, threshold)
        })
    }

    /// Inoculum filter on every experiment.
    pub fn filter_all(&mut self, threshold: u64) -> Result<Outcome<AnnotatedCounts>> {
        let key = CacheKey::new("filter_all_experiments", self.content_hash(), &threshold)?;
        let Session { counts, cache, .. } = self;
        cache.get_or_try_insert_with(key, || filter_all_experiments(counts, threshold))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{test_record, ControlBarcode, CountRecord};

    fn session() -> Session {
        let controls = ControlTable::from_records(vec![
            ControlBarcode {
                barcode: "wt1".into(),
                phenotype: "wt".into(),
                expected_concentration: 1.0,
            },
            ControlBarcode {
                barcode: "wt2".into(),
                phenotype: "wt".into(),
                expected_concentration: 10.0,
            },
            ControlBarcode {
                barcode: "wt3".into(),
                phenotype: "wt".into(),
                expected_concentration: 100.0,
            },
        ]);
        let mut rows: Vec<CountRecord> = Vec::new();
        for (sample, counts) in [
            ("inoculum_1", [10, 100, 1000]),
            ("m1_d1", [12, 90, 1100]),
            ("m2_d1", [500, 20, 3]),
        ] {
            for (bc, c) in ["wt1", "wt2", "wt3"].iter().zip(counts) {
                rows.push(test_record(bc, sample, c));
            }
            rows.push(test_record("geneA", sample, 2000));
        }
        Session::new(CountTable::new(rows), controls)
    }

    #[test]
    fn test_correlations_memoized() {
        let mut s = session();
        let config = CorrelationConfig::default();
        let sel = Selection::experiment("dnaid2023", "TV5490A");

        let first = s.correlations(&sel, &config).unwrap().into_data().unwrap();
        let second = s.correlations(&sel, &config).unwrap().into_data().unwrap();
        assert_eq!(first.good, second.good);
        assert!(first.is_good("m1_d1"));
        assert!(!first.is_good("m2_d1"));
        assert_eq!(s.cache_stats().hits, 1);
        assert_eq!(s.cache_stats().misses, 1);

        // A different cutoff is a different entry.
        let loose = CorrelationConfig {
            cutoff: 0.0,
            ..config
        };
        s.correlations(&sel, &loose).unwrap();
        assert_eq!(s.cache_stats().misses, 2);
    }

    #[test]
    fn test_replace_counts_invalidates() {
        let mut s = session();
        s.filter_all(0).unwrap();
        assert_eq!(s.cache_stats().entries, 1);

        s.replace_counts(CountTable::new(vec![test_record("wt1", "inoculum_1", 1)]));
        assert_eq!(s.cache_stats().entries, 0);
        let out = s.filter_all(5).unwrap();
        assert!(out.is_no_data());
    }

    #[test]
    fn test_no_controls_is_no_data() {
        let mut s = session();
        s.replace_counts(CountTable::new(vec![test_record("geneA", "m1_d1", 4)]));
        let out = s.correlations(&Selection::all(), &CorrelationConfig::default()).unwrap();
        assert!(out.is_no_data());
    }

    #[test]
    fn test_empty_selection_is_error() {
        let mut s = session();
        let err = s
            .correlations(&Selection::experiment("dnaid2023", "nope"), &CorrelationConfig::default())
            .unwrap_err();
        assert!(matches!(err, QcError::EmptySelection(_)));
        assert!(matches!(
            s.filter_experiment("other", "TV5490A", 0),
            Err(QcError::EmptySelection(_))
        ));
    }

    #[test]
    fn test_day_summary() {
        let mut s = session();
        let summary = s
            .day_summary(&Selection::all(), &CorrelationConfig::default())
            .unwrap()
            .into_data()
            .unwrap();
        let d1 = summary.iter().find(|d| d.day == "d1").unwrap();
        assert_eq!(d1.passing, vec!["m1"]);
        assert_eq!(d1.failed, vec!["m2"]);
    }

    #[test]
    fn test_filter_experiment() {
        let mut s = session();
        let out = s
            .filter_experiment("dnaid2023", "TV5490A", 100)
            .unwrap()
            .into_data()
            .unwrap();
        let kept: Vec<&str> = out.barcodes().into_iter().collect();
        assert_eq!(kept, vec!["geneA", "wt2", "wt3"]);
        assert_eq!(out.len(), 9);
    }
}
