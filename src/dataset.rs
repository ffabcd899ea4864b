//! Read access to the processed train/test tables.
//!
//! The upstream preparation step writes four header-bearing CSV files: two
//! feature tables sharing one schema and two single-column label files that
//! are row-aligned with them. This module loads and validates them; it never
//! modifies them.

use crate::config::PathsConfig;
use crate::types::table::{FeatureTable, LabelVector, FRAUD, LEGITIMATE};
use anyhow::{Context, Result};
use ndarray::Array2;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Problems with the shape or content of input tables
#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("failed to read {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("expected {expected} columns, found {found}")]
    ColumnCount { expected: usize, found: usize },

    #[error("row {row}, column '{column}': '{value}' is not a number")]
    InvalidNumber {
        row: usize,
        column: String,
        value: String,
    },

    #[error("row {row}: label '{value}' is not 0 or 1")]
    InvalidLabel { row: usize, value: String },

    #[error("label file must have exactly one column, found {found}")]
    LabelColumns { found: usize },

    #[error("{features} feature rows but {labels} labels")]
    LengthMismatch { features: usize, labels: usize },

    #[error("train columns {train:?} differ from test columns {test:?}")]
    SchemaMismatch { train: Vec<String>, test: Vec<String> },

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),
}

/// Train/test split as produced upstream
#[derive(Debug, Clone)]
pub struct Dataset {
    pub x_train: FeatureTable,
    pub y_train: LabelVector,
    pub x_test: FeatureTable,
    pub y_test: LabelVector,
}

impl Dataset {
    /// Assemble a dataset, checking row alignment and the shared schema
    pub fn new(
        x_train: FeatureTable,
        y_train: LabelVector,
        x_test: FeatureTable,
        y_test: LabelVector,
    ) -> Result<Self, DatasetError> {
        check_aligned(&x_train, &y_train)?;
        check_aligned(&x_test, &y_test)?;
        check_same_schema(&x_train, &x_test)?;

        Ok(Self {
            x_train,
            y_train,
            x_test,
            y_test,
        })
    }

    /// Load all four tables from the configured locations
    pub fn load(paths: &PathsConfig) -> Result<Self> {
        let x_train = read_feature_table(&paths.train_features)
            .context("Failed to load training features")?;
        let y_train =
            read_labels(&paths.train_labels).context("Failed to load training labels")?;
        let x_test =
            read_feature_table(&paths.test_features).context("Failed to load test features")?;
        let y_test = read_labels(&paths.test_labels).context("Failed to load test labels")?;

        let dataset = Self::new(x_train, y_train, x_test, y_test)?;

        info!(
            train_rows = dataset.x_train.n_rows(),
            test_rows = dataset.x_test.n_rows(),
            features = dataset.x_train.n_features(),
            train_fraud = dataset.y_train.positives(),
            "Dataset loaded"
        );

        Ok(dataset)
    }
}

/// Fail unless the table and labels have the same number of rows
pub fn check_aligned(features: &FeatureTable, labels: &LabelVector) -> Result<(), DatasetError> {
    if features.n_rows() != labels.len() {
        return Err(DatasetError::LengthMismatch {
            features: features.n_rows(),
            labels: labels.len(),
        });
    }
    Ok(())
}

/// Fail unless both tables have identical columns in identical order
pub fn check_same_schema(train: &FeatureTable, test: &FeatureTable) -> Result<(), DatasetError> {
    if !train.same_schema(test) {
        return Err(DatasetError::SchemaMismatch {
            train: train.columns().to_vec(),
            test: test.columns().to_vec(),
        });
    }
    Ok(())
}

/// Read a header-bearing numeric CSV into a feature table
pub fn read_feature_table<P: AsRef<Path>>(path: P) -> Result<FeatureTable, DatasetError> {
    let path = path.as_ref();
    let csv_err = |source: csv::Error| DatasetError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    let columns: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut data = Vec::new();
    let mut n_rows = 0;
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(csv_err)?;
        for (field, column) in record.iter().zip(&columns) {
            let value = field
                .trim()
                .parse::<f64>()
                .map_err(|_| DatasetError::InvalidNumber {
                    row,
                    column: column.clone(),
                    value: field.to_string(),
                })?;
            data.push(value);
        }
        n_rows += 1;
    }

    let values = Array2::from_shape_vec((n_rows, columns.len()), data)?;
    FeatureTable::new(columns, values)
}

/// Read a single-column, header-bearing label CSV
pub fn read_labels<P: AsRef<Path>>(path: P) -> Result<LabelVector, DatasetError> {
    let path = path.as_ref();
    let csv_err = |source: csv::Error| DatasetError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    let n_columns = reader.headers().map_err(csv_err)?.len();
    if n_columns != 1 {
        return Err(DatasetError::LabelColumns { found: n_columns });
    }

    let mut labels = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(csv_err)?;
        let field = record.get(0).unwrap_or_default().trim();
        let label = match field.parse::<f64>() {
            Ok(v) if v == f64::from(LEGITIMATE) => LEGITIMATE,
            Ok(v) if v == f64::from(FRAUD) => FRAUD,
            _ => {
                return Err(DatasetError::InvalidLabel {
                    row,
                    value: field.to_string(),
                })
            }
        };
        labels.push(label);
    }

    LabelVector::new(labels)
}

/// Write a feature table as a header-bearing CSV
pub fn write_feature_table<P: AsRef<Path>>(path: P, table: &FeatureTable) -> Result<()> {
    let path = path.as_ref();
    create_parent_dir(path)?;

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(table.columns())?;
    for row in table.values().rows() {
        writer.write_record(row.iter().map(|v| v.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

/// Write labels as a single-column CSV with the given header
pub fn write_labels<P: AsRef<Path>>(path: P, header: &str, labels: &LabelVector) -> Result<()> {
    let path = path.as_ref();
    create_parent_dir(path)?;

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record([header])?;
    for label in labels.as_slice() {
        writer.write_record([label.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Create the parent directory of an output file if it is missing
pub(crate) fn create_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_read_feature_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "x.csv", "time,amount,v1\n0,1.5,-0.2\n10,3.0,0.7\n");

        let table = read_feature_table(&path).unwrap();
        assert_eq!(table.columns(), &["time", "amount", "v1"]);
        assert_eq!(table.values(), array![[0.0, 1.5, -0.2], [10.0, 3.0, 0.7]]);
    }

    #[test]
    fn test_read_feature_table_rejects_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "x.csv", "time,amount\n0,abc\n");

        let err = read_feature_table(&path).unwrap_err();
        assert!(matches!(err, DatasetError::InvalidNumber { row: 0, .. }));
    }

    #[test]
    fn test_read_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "y.csv", "class\n0\n1\n0.0\n");

        let labels = read_labels(&path).unwrap();
        assert_eq!(labels.as_slice(), &[0, 1, 0]);
    }

    #[test]
    fn test_read_labels_rejects_extra_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "y.csv", "class,other\n0,1\n");

        let err = read_labels(&path).unwrap_err();
        assert!(matches!(err, DatasetError::LabelColumns { found: 2 }));
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_feature_table(dir.path().join("absent.csv")).unwrap_err();
        assert!(matches!(err, DatasetError::Csv { .. }));
    }

    #[test]
    fn test_schema_mismatch_rejected() {
        let train = FeatureTable::new(vec!["time".into(), "amount".into()], array![[0.0, 1.0]])
            .unwrap();
        let test = FeatureTable::new(vec!["amount".into(), "time".into()], array![[1.0, 0.0]])
            .unwrap();
        let labels = LabelVector::new(vec![0]).unwrap();

        let err = Dataset::new(train, labels.clone(), test, labels).unwrap_err();
        assert!(matches!(err, DatasetError::SchemaMismatch { .. }));
    }

    #[test]
    fn test_write_then_read_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("x.csv");
        let table =
            FeatureTable::new(vec!["time".into(), "v1".into()], array![[1.0, 0.25], [2.0, -3.5]])
                .unwrap();

        write_feature_table(&path, &table).unwrap();
        assert_eq!(read_feature_table(&path).unwrap(), table);
    }
}
