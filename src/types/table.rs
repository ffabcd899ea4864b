//! Feature tables and label vectors shared by every pipeline stage

use crate::dataset::DatasetError;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

/// Label of a legitimate transaction
pub const LEGITIMATE: u8 = 0;

/// Label of a fraudulent transaction (the positive class)
pub const FRAUD: u8 = 1;

/// Column-named numeric feature matrix, one row per transaction.
///
/// Column order is significant: every stage of a run must see the same
/// columns in the same order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    columns: Vec<String>,
    values: Array2<f64>,
}

impl FeatureTable {
    /// Create a table, checking that the column names match the matrix width
    pub fn new(columns: Vec<String>, values: Array2<f64>) -> Result<Self, DatasetError> {
        if columns.len() != values.ncols() {
            return Err(DatasetError::ColumnCount {
                expected: columns.len(),
                found: values.ncols(),
            });
        }
        Ok(Self { columns, values })
    }

    /// Column names in table order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Row-major feature matrix
    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.values.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.values.nrows() == 0
    }

    /// Position of a named column
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of a named column
    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.column_index(name)
            .map(|idx| self.values.index_axis(Axis(1), idx))
    }

    pub fn row(&self, idx: usize) -> ArrayView1<'_, f64> {
        self.values.row(idx)
    }

    /// True when both tables have identical columns in identical order
    pub fn same_schema(&self, other: &FeatureTable) -> bool {
        self.columns == other.columns
    }
}

/// Binary labels aligned by position with a [`FeatureTable`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelVector {
    labels: Vec<u8>,
}

impl LabelVector {
    /// Create a label vector; every value must be 0 or 1
    pub fn new(labels: Vec<u8>) -> Result<Self, DatasetError> {
        if let Some((row, &value)) = labels
            .iter()
            .enumerate()
            .find(|(_, &l)| l != LEGITIMATE && l != FRAUD)
        {
            return Err(DatasetError::InvalidLabel {
                row,
                value: value.to_string(),
            });
        }
        Ok(Self { labels })
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Number of fraud labels
    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|&&l| l == FRAUD).count()
    }

    /// Number of legitimate labels
    pub fn negatives(&self) -> usize {
        self.labels.len() - self.positives()
    }

    /// Labels as 0.0 / 1.0 targets
    pub fn to_targets(&self) -> Vec<f64> {
        self.labels.iter().map(|&l| f64::from(l)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample_table() -> FeatureTable {
        FeatureTable::new(
            vec!["time".into(), "amount".into(), "v1".into()],
            array![[0.0, 10.0, 0.5], [1.0, 20.0, -0.5], [2.0, 30.0, 1.5]],
        )
        .unwrap()
    }

    #[test]
    fn test_column_lookup() {
        let table = sample_table();
        assert_eq!(table.column_index("amount"), Some(1));
        assert_eq!(table.column("v1").unwrap().to_vec(), vec![0.5, -0.5, 1.5]);
        assert!(table.column("v2").is_none());
    }

    #[test]
    fn test_column_count_mismatch_rejected() {
        let result = FeatureTable::new(vec!["time".into()], array![[0.0, 1.0]]);
        assert!(matches!(
            result,
            Err(DatasetError::ColumnCount { expected: 1, found: 2 })
        ));
    }

    #[test]
    fn test_label_counts() {
        let labels = LabelVector::new(vec![0, 1, 0, 0, 1]).unwrap();
        assert_eq!(labels.positives(), 2);
        assert_eq!(labels.negatives(), 3);
    }

    #[test]
    fn test_non_binary_label_rejected() {
        let result = LabelVector::new(vec![0, 2]);
        assert!(matches!(result, Err(DatasetError::InvalidLabel { row: 1, .. })));
    }
}
