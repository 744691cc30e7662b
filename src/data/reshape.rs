//! Pivot long-format counts to a barcode × sample grid and back.

use crate::error::{QcError, Result};
use std::collections::{BTreeMap, BTreeSet};

/// A dense barcode × sample grid of counts.
///
/// Rows represent barcodes, columns represent samples, both in sorted order.
/// A cell is `None` when the barcode was never observed in that sample, which
/// is distinct from an observed count of zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WideCounts {
    barcodes: Vec<String>,
    sample_ids: Vec<String>,
    /// Row-major cells (barcodes × samples).
    cells: Vec<Option<u64>>,
}

/// One cell of a melted grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeltedCount {
    pub barcode: String,
    pub sample_id: String,
    pub count: Option<u64>,
}

impl WideCounts {
    /// Pivot (barcode, sample, count) triples into a grid.
    ///
    /// Repeated triples collapse to one cell. Two different counts for the
    /// same (barcode, sample) pair are a [`QcError::PivotCollision`].
    pub fn pivot<'a, I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str, u64)>,
    {
        let mut observed: BTreeMap<(&str, &str), BTreeSet<u64>> = BTreeMap::new();
        for (barcode, sample_id, count) in entries {
            observed.entry((barcode, sample_id)).or_default().insert(count);
        }

        let barcodes: BTreeSet<&str> = observed.keys().map(|(b, _)| *b).collect();
        let samples: BTreeSet<&str> = observed.keys().map(|(_, s)| *s).collect();
        let row_of: BTreeMap<&str, usize> = barcodes.iter().enumerate().map(|(i, b)| (*b, i)).collect();
        let col_of: BTreeMap<&str, usize> = samples.iter().enumerate().map(|(i, s)| (*s, i)).collect();

        let n_samples = samples.len();
        let mut cells = vec![None; barcodes.len() * n_samples];
        for ((barcode, sample_id), counts) in observed {
            if counts.len() > 1 {
                return Err(QcError::PivotCollision {
                    barcode: barcode.to_string(),
                    sample_id: sample_id.to_string(),
                    counts: counts.into_iter().collect(),
                });
            }
            let row = row_of[barcode];
            let col = col_of[sample_id];
            cells[row * n_samples + col] = counts.into_iter().next();
        }

        Ok(Self {
            barcodes: barcodes.into_iter().map(String::from).collect(),
            sample_ids: samples.into_iter().map(String::from).collect(),
            cells,
        })
    }

    /// Get the value at (row, col); `None` for an unobserved cell or out of range.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> Option<u64> {
        if row >= self.n_barcodes() || col >= self.n_samples() {
            return None;
        }
        self.cells[row * self.n_samples() + col]
    }

    /// Number of barcodes (rows).
    #[inline]
    pub fn n_barcodes(&self) -> usize {
        self.barcodes.len()
    }

    /// Number of samples (columns).
    #[inline]
    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    /// Barcode identifiers.
    #[inline]
    pub fn barcodes(&self) -> &[String] {
        &self.barcodes
    }

    /// Sample identifiers.
    #[inline]
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Column index of a sample.
    pub fn sample_index(&self, sample_id: &str) -> Option<usize> {
        self.sample_ids.iter().position(|s| s == sample_id)
    }

    /// Cells of one barcode row.
    pub fn row(&self, row: usize) -> &[Option<u64>] {
        let n = self.n_samples();
        &self.cells[row * n..(row + 1) * n]
    }

    /// Keep only the given barcode rows, in the given order. All sample columns are kept.
    pub fn subset_barcodes(&self, indices: &[usize]) -> Result<Self> {
        let mut barcodes = Vec::with_capacity(indices.len());
        let mut cells = Vec::with_capacity(indices.len() * self.n_samples());
        for &row in indices {
            if row >= self.n_barcodes() {
                return Err(QcError::InvalidParameter(format!(
                    "Barcode index {} out of bounds",
                    row
                )));
            }
            barcodes.push(self.barcodes[row].clone());
            cells.extend_from_slice(self.row(row));
        }
        Ok(Self {
            barcodes,
            sample_ids: self.sample_ids.clone(),
            cells,
        })
    }

    /// Melt back to one entry per (barcode, sample) cell.
    pub fn melt(&self) -> Vec<MeltedCount> {
        let mut out = Vec::with_capacity(self.cells.len());
        for (row, barcode) in self.barcodes.iter().enumerate() {
            for (sample_id, &count) in self.sample_ids.iter().zip(self.row(row)) {
                out.push(MeltedCount {
                    barcode: barcode.clone(),
                    sample_id: sample_id.clone(),
                    count,
                });
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_grid() -> WideCounts {
        // 3 barcodes × 2 samples, bc3 unobserved in s2
        WideCounts::pivot(vec![
            ("bc1", "s1", 10),
            ("bc1", "s2", 20),
            ("bc2", "s1", 0),
            ("bc2", "s2", 7),
            ("bc3", "s1", 5),
        ])
        .unwrap()
    }

    #[test]
    fn test_dimensions() {
        let grid = create_test_grid();
        assert_eq!(grid.n_barcodes(), 3);
        assert_eq!(grid.n_samples(), 2);
        assert_eq!(grid.sample_ids(), &["s1", "s2"]);
    }

    #[test]
    fn test_missing_is_not_zero() {
        let grid = create_test_grid();
        assert_eq!(grid.get(1, 0), Some(0));
        assert_eq!(grid.get(2, 1), None);
        assert_eq!(grid.row(2), &[Some(5), None]);
    }

    #[test]
    fn test_duplicates_collapse() {
        let grid = WideCounts::pivot(vec![("bc1", "s1", 3), ("bc1", "s1", 3)]).unwrap();
        assert_eq!(grid.n_barcodes(), 1);
        assert_eq!(grid.get(0, 0), Some(3));
    }

    #[test]
    fn test_collision() {
        let err = WideCounts::pivot(vec![("bc1", "s1", 3), ("bc1", "s1", 4)]).unwrap_err();
        match err {
            QcError::PivotCollision {
                barcode,
                sample_id,
                counts,
            } => {
                assert_eq!(barcode, "bc1");
                assert_eq!(sample_id, "s1");
                assert_eq!(counts, vec![3, 4]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_pivot_melt_restores_complete_table() {
        let long = vec![
            ("bcA", "s2", 4),
            ("bcA", "s1", 1),
            ("bcB", "s1", 9),
            ("bcB", "s2", 0),
        ];
        let grid = WideCounts::pivot(long.iter().copied()).unwrap();

        let mut melted: Vec<(String, String, u64)> = grid
            .melt()
            .into_iter()
            .map(|m| (m.barcode, m.sample_id, m.count.unwrap()))
            .collect();
        melted.sort();

        let mut expected: Vec<(String, String, u64)> = long
            .iter()
            .map(|(b, s, c)| (b.to_string(), s.to_string(), *c))
            .collect();
        expected.sort();

        assert_eq!(melted, expected);
    }

    #[test]
    fn test_subset_barcodes() {
        let grid = create_test_grid();
        let subset = grid.subset_barcodes(&[2, 0]).unwrap();
        assert_eq!(subset.barcodes(), &["bc3", "bc1"]);
        assert_eq!(subset.get(1, 1), Some(20));
        assert!(grid.subset_barcodes(&[5]).is_err());
    }
}
