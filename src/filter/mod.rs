//! Barcode filtering on inoculum counts.

pub mod experiments;
pub mod inoculum;

pub use experiments::{
    barcodes_for_gene, filter_all_experiments, AnnotatedCount, AnnotatedCounts, ExperimentSummary,
};
pub use inoculum::{filter_inoculum, FilterStats, FilteredCount, FilteredCounts};
