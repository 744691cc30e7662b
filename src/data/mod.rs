//! Data structures for control barcodes and count tables.

mod control;
mod count_table;
mod outcome;
mod reshape;

pub use control::{ControlBarcode, ControlLayout, ControlTable};
pub use count_table::{columns, CountRecord, CountTable, RoleInference, SampleRole};
pub use outcome::Outcome;
pub use reshape::{MeltedCount, WideCounts};

#[cfg(test)]
pub(crate) use count_table::tests::record as test_record;
