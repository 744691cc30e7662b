//! Quality control against spike-in control barcodes.

pub mod correlation;
pub mod summary;

pub use correlation::{
    classify_good, compute_correlations, pearson, CorrelationConfig, CorrelationRecord,
    CorrelationReport, Transform, WILD_TYPE,
};
pub use summary::{summarize_samples_by_day, write_day_summary_csv, DaySummary};
