//! Explicit "no data" signal for derived tables.

use serde::{Deserialize, Serialize};

/// The result of a derivation that may legitimately produce nothing.
///
/// An empty derived table (no retained barcodes, no control barcodes in the
/// selection) is not an error, but callers must not mistake it for a table
/// either. `NoData` carries a human-readable reason for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outcome<T> {
    /// The derivation produced rows.
    Data(T),
    /// The derivation completed but produced no rows.
    NoData(String),
}

impl<T> Outcome<T> {
    /// Check if this is the no-data signal.
    pub fn is_no_data(&self) -> bool {
        matches!(self, Outcome::NoData(_))
    }

    /// Borrow the data, if any.
    pub fn data(&self) -> Option<&T> {
        match self {
            Outcome::Data(d) => Some(d),
            Outcome::NoData(_) => None,
        }
    }

    /// Take the data, if any.
    pub fn into_data(self) -> Option<T> {
        match self {
            Outcome::Data(d) => Some(d),
            Outcome::NoData(_) => None,
        }
    }

    /// Reason given for an empty result.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Outcome::Data(_) => None,
            Outcome::NoData(reason) => Some(reason),
        }
    }

    /// Transform the contained data.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Outcome::Data(d) => Outcome::Data(f(d)),
            Outcome::NoData(reason) => Outcome::NoData(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_data_accessors() {
        let out: Outcome<Vec<u64>> = Outcome::NoData("nothing passed".to_string());
        assert!(out.is_no_data());
        assert_eq!(out.reason(), Some("nothing passed"));
        assert!(out.data().is_none());
    }

    #[test]
    fn test_map_keeps_reason() {
        let out: Outcome<u64> = Outcome::NoData("empty".to_string());
        let mapped = out.map(|v| v * 2);
        assert_eq!(mapped.reason(), Some("empty"));

        let out = Outcome::Data(21u64).map(|v| v * 2);
        assert_eq!(out.into_data(), Some(42));
    }
}
