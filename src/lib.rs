//! Quality control and filtering for Tn-seq barcode count tables
//!
//! This library checks transposon-sequencing experiments against spike-in
//! control barcodes of known concentration, and filters barcodes that were
//! under-represented in the inoculum.
//!
//! # Overview
//!
//! - **data**: Control reference, long-format count table, wide reshaping
//! - **qc**: Per-sample control correlation and per-day summaries
//! - **filter**: Inoculum filtering for one experiment or all of them
//! - **pipeline**: YAML configuration, memoization and sessions
//!
//! # Example
//!
//! ```no_run
//! use tnseq_qc::prelude::*;
//!
//! let controls = ControlTable::from_tsv("controls.txt").unwrap();
//! let counts = CountTable::from_csv("counts.csv").unwrap();
//!
//! let report = compute_correlations(&counts, &controls, &CorrelationConfig::default()).unwrap();
//! println!("{}", report);
//!
//! if let Outcome::Data(filtered) = filter_all_experiments(&counts, 1000).unwrap() {
//!     filtered.write_csv("filtered.csv").unwrap();
//! }
//! ```

pub mod data;
pub mod error;
pub mod filter;
pub mod pipeline;
pub mod qc;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::data::{
        ControlBarcode, ControlLayout, ControlTable, CountRecord, CountTable, Outcome,
        RoleInference, SampleRole, WideCounts,
    };
    pub use crate::error::{QcError, Result};
    pub use crate::filter::{
        barcodes_for_gene, filter_all_experiments, filter_inoculum, AnnotatedCount,
        AnnotatedCounts, FilterStats, FilteredCount, FilteredCounts,
    };
    pub use crate::pipeline::{AnalysisConfig, Selection, Session};
    pub use crate::qc::{
        compute_correlations, summarize_samples_by_day, write_day_summary_csv, CorrelationConfig,
        CorrelationReport, DaySummary, Transform,
    };
}
