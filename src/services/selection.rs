//! Choosing which sync timestamp a view should report on.
//!
//! The collector writes a cycle row by row, so the newest timestamp may be
//! incomplete while it is being read. "Latest" therefore means the
//! second-to-last timestamp whenever more than one exists.

use log::info;
use std::error::Error;
use std::fmt::{self, Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    /// No readings have been logged yet.
    NoData,
    /// Indices count from 1; 0 names no snapshot.
    IndexZero,
    /// Index `index` counted back from the newest exceeds the `available` timestamps.
    IndexOutOfRange { index: usize, available: usize },
}

impl Display for SelectionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SelectionError::NoData => write!(f, "no timestamps present; have you logged any data yet?"),
            SelectionError::IndexZero => write!(f, "index must be >= 1 (1 is the newest snapshot)"),
            SelectionError::IndexOutOfRange { index, available } => {
                write!(f, "index {} greater than number of timestamps {}", index, available)
            }
        }
    }
}

impl Error for SelectionError {}

/// Most recent timestamp that is safe to read. `sorted` must be ascending.
pub fn latest_stable(sorted: &[i64]) -> Result<i64, SelectionError> {
    match sorted {
        [] => Err(SelectionError::NoData),
        [only] => {
            info!("Only one timestamp found, using {}", only);
            Ok(*only)
        }
        [.., penultimate, _] => Ok(*penultimate),
    }
}

/// Timestamp `index` steps back from the newest, where 1 is the newest itself.
pub fn by_index(sorted: &[i64], index: usize) -> Result<i64, SelectionError> {
    if sorted.is_empty() {
        return Err(SelectionError::NoData);
    }
    if index == 0 {
        return Err(SelectionError::IndexZero);
    }
    if index > sorted.len() {
        return Err(SelectionError::IndexOutOfRange {
            index,
            available: sorted.len(),
        });
    }
    Ok(sorted[sorted.len() - index])
}

/// Closest stored timestamp to `target`; ties go to the earlier one.
pub fn nearest(timestamps: &[i64], target: i64) -> Option<i64> {
    timestamps
        .iter()
        .copied()
        .min_by_key(|ts| ((*ts as i128 - target as i128).abs(), *ts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_prefers_second_to_last() {
        assert_eq!(latest_stable(&[100, 200, 300]), Ok(200));
        assert_eq!(latest_stable(&[100, 200]), Ok(100));
    }

    #[test]
    fn latest_with_single_timestamp_uses_it() {
        assert_eq!(latest_stable(&[100]), Ok(100));
    }

    #[test]
    fn latest_without_data_fails() {
        assert_eq!(latest_stable(&[]), Err(SelectionError::NoData));
    }

    #[test]
    fn index_counts_back_from_newest() {
        let ts = [100, 200, 300];
        assert_eq!(by_index(&ts, 1), Ok(300));
        assert_eq!(by_index(&ts, 3), Ok(100));
        assert_eq!(
            by_index(&ts, 4),
            Err(SelectionError::IndexOutOfRange { index: 4, available: 3 })
        );
        assert_eq!(by_index(&ts, 0), Err(SelectionError::IndexZero));
        assert_eq!(
            SelectionError::IndexZero.to_string(),
            "index must be >= 1 (1 is the newest snapshot)"
        );
        assert_eq!(by_index(&[], 1), Err(SelectionError::NoData));
    }

    #[test]
    fn nearest_is_deterministic_on_ties() {
        let ts = [100, 200, 300];
        assert_eq!(nearest(&ts, 200), Some(200));
        assert_eq!(nearest(&ts, 260), Some(300));
        assert_eq!(nearest(&ts, 150), Some(100));
        assert_eq!(nearest(&ts, 250), Some(200));
        assert_eq!(nearest(&ts, -5), Some(100));
        assert_eq!(nearest(&[], 5), None);
    }
}
