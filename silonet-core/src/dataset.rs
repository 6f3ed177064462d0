//! Dataset representation.
//!
//! A [`Dataset`] is the unit of data that flows through the privacy pipeline: a
//! rectangular matrix of `f64` records, one record per row. The first column of
//! a record is its identifier (see the [align module]).
//!
//! [align module]: crate::align

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors which can occur while assembling a [`Dataset`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DatasetError {
    /// A row does not have the same number of columns as the first row.
    #[error("row {row} has {actual} columns but {expected} were expected")]
    Ragged {
        /// Index of the offending row.
        row: usize,
        /// Number of columns of the first row.
        expected: usize,
        /// Number of columns of the offending row.
        actual: usize,
    },
    /// The dataset has rows but no columns.
    #[error("records must have at least one column")]
    NoColumns,
}

/// A rectangular matrix of `f64` records.
///
/// The shape is fixed at construction time and every accessor upholds it: a
/// dataset with `r` rows and `c` columns always stores exactly `r * c` values
/// in row-major order. Datasets with zero rows are valid and represent an
/// empty record set (for example an empty intersection).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Dataset {
    /// Assembles a dataset from a sequence of rows.
    ///
    /// # Errors
    /// Fails with [`DatasetError::Ragged`] if the rows do not all have the same
    /// number of columns, or with [`DatasetError::NoColumns`] if rows are
    /// present but empty.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, DatasetError> {
        let cols = rows.first().map(Vec::len).unwrap_or_default();
        if !rows.is_empty() && cols == 0 {
            return Err(DatasetError::NoColumns);
        }
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (idx, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(DatasetError::Ragged {
                    row: idx,
                    expected: cols,
                    actual: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    /// Creates a dataset with the given number of columns and no rows.
    pub fn empty(cols: usize) -> Self {
        Self {
            rows: 0,
            cols,
            data: Vec::new(),
        }
    }

    /// Creates a dataset from its raw parts.
    ///
    /// The caller must guarantee that `data` holds exactly `rows * cols`
    /// values in row-major order.
    pub(crate) fn from_raw_parts(rows: usize, cols: usize, data: Vec<f64>) -> Self {
        debug_assert_eq!(rows * cols, data.len());
        Self { rows, cols, data }
    }

    /// Gets the number of rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Gets the number of columns.
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Gets the shape as `(rows, columns)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Checks if the dataset has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Gets the values in row-major order.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Gets the row at `idx`, if it exists.
    pub fn row(&self, idx: usize) -> Option<&[f64]> {
        if idx < self.rows {
            Some(&self.data[idx * self.cols..(idx + 1) * self.cols])
        } else {
            None
        }
    }

    /// Creates an iterator that yields the rows of this dataset.
    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> {
        // a non-empty dataset always has at least one column
        self.data.chunks(self.cols.max(1))
    }

    /// Creates an iterator that yields the record identifiers of this dataset.
    ///
    /// The identifier of a record is the value of its first column.
    pub fn record_ids(&self) -> impl Iterator<Item = f64> + '_ {
        self.iter_rows().map(|row| row[0])
    }

    /// Creates a new dataset from the rows at the given indices, in the given
    /// order.
    ///
    /// # Panics
    /// Panics if an index is out of range.
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        let mut data = Vec::with_capacity(indices.len() * self.cols);
        for &idx in indices {
            data.extend_from_slice(&self.data[idx * self.cols..(idx + 1) * self.cols]);
        }
        Self {
            rows: indices.len(),
            cols: self.cols,
            data,
        }
    }

    /// Creates a new dataset containing the rows for which `keep` returns
    /// `true`.
    pub fn filter_rows<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&[f64]) -> bool,
    {
        let mut data = Vec::new();
        let mut rows = 0;
        for row in self.iter_rows() {
            if keep(row) {
                data.extend_from_slice(row);
                rows += 1;
            }
        }
        Self {
            rows,
            cols: self.cols,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows() {
        let dataset = Dataset::from_rows(vec![vec![1., 2., 3.], vec![4., 5., 6.]]).unwrap();
        assert_eq!(dataset.shape(), (2, 3));
        assert_eq!(dataset.as_slice(), &[1., 2., 3., 4., 5., 6.]);
        assert_eq!(dataset.row(1), Some([4., 5., 6.].as_ref()));
        assert_eq!(dataset.row(2), None);
    }

    #[test]
    fn test_from_rows_ragged() {
        let err = Dataset::from_rows(vec![vec![1., 2.], vec![3.]]).unwrap_err();
        assert_eq!(
            err,
            DatasetError::Ragged {
                row: 1,
                expected: 2,
                actual: 1,
            },
        );
    }

    #[test]
    fn test_from_rows_no_columns() {
        let err = Dataset::from_rows(vec![vec![], vec![]]).unwrap_err();
        assert_eq!(err, DatasetError::NoColumns);
        assert!(Dataset::from_rows(vec![]).unwrap().is_empty());
    }

    #[test]
    fn test_empty() {
        let dataset = Dataset::empty(5);
        assert_eq!(dataset.shape(), (0, 5));
        assert!(dataset.is_empty());
        assert_eq!(dataset.iter_rows().count(), 0);
    }

    #[test]
    fn test_record_ids() {
        let dataset = Dataset::from_rows(vec![vec![7., 0.], vec![11., 1.]]).unwrap();
        let ids: Vec<f64> = dataset.record_ids().collect();
        assert_eq!(ids, vec![7., 11.]);
    }

    #[test]
    fn test_select_rows() {
        let dataset =
            Dataset::from_rows(vec![vec![1., 2.], vec![3., 4.], vec![5., 6.]]).unwrap();
        let selected = dataset.select_rows(&[2, 0]);
        assert_eq!(selected.shape(), (2, 2));
        assert_eq!(selected.as_slice(), &[5., 6., 1., 2.]);
    }

    #[test]
    fn test_filter_rows() {
        let dataset =
            Dataset::from_rows(vec![vec![1., 2.], vec![3., 4.], vec![5., 6.]]).unwrap();
        let kept = dataset.filter_rows(|row| row[0] > 2.);
        assert_eq!(kept.shape(), (2, 2));
        assert_eq!(kept.as_slice(), &[3., 4., 5., 6.]);
    }
}
