//! Global importance ranking and single-instance explanation records

use super::Attribution;
use crate::dataset::create_parent_dir;
use crate::models::Classifier;
use crate::types::table::FeatureTable;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::{info, warn};

/// Mean absolute attribution of one feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub mean_abs_shap: f64,
}

/// Rank features by mean |attribution| over all rows, largest first.
///
/// Equal scores keep the table's column order.
pub fn global_importance(
    attribution: &Attribution,
    columns: &[String],
) -> Result<Vec<FeatureImportance>> {
    let values = attribution.positive_class_values()?;
    if values.ncols() != columns.len() {
        bail!(
            "{} attribution columns for {} features",
            values.ncols(),
            columns.len()
        );
    }

    let n_rows = values.nrows().max(1) as f64;
    let mut ranking: Vec<FeatureImportance> = columns
        .iter()
        .zip(values.columns())
        .map(|(feature, column)| FeatureImportance {
            feature: feature.clone(),
            mean_abs_shap: column.iter().map(|v| v.abs()).sum::<f64>() / n_rows,
        })
        .collect();

    ranking.sort_by(|a, b| b.mean_abs_shap.total_cmp(&a.mean_abs_shap));
    Ok(ranking)
}

pub fn write_importance(path: &Path, ranking: &[FeatureImportance]) -> Result<()> {
    create_parent_dir(path)?;
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create importance report {}", path.display()))?;
    for entry in ranking {
        writer.serialize(entry)?;
    }
    writer.flush()?;

    info!(path = %path.display(), features = ranking.len(), "Feature importance written");
    Ok(())
}

/// Write the positive-class attribution matrix with the feature names as header
pub fn write_attribution_values(path: &Path, attribution: &Attribution, columns: &[String]) -> Result<()> {
    let values = attribution.positive_class_values()?;
    if values.ncols() != columns.len() {
        bail!(
            "{} attribution columns for {} features",
            values.ncols(),
            columns.len()
        );
    }

    create_parent_dir(path)?;
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create attribution matrix {}", path.display()))?;
    writer.write_record(columns)?;
    for row in values.rows() {
        writer.write_record(row.iter().map(|v| v.to_string()))?;
    }
    writer.flush()?;

    info!(path = %path.display(), rows = values.nrows(), "Attribution matrix written");
    Ok(())
}

/// One feature's value and contribution for the explained row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureContribution {
    pub feature: String,
    pub value: f64,
    pub contribution: f64,
}

/// Attribution breakdown of a single test row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalExplanation {
    pub row_index: usize,
    pub method: String,
    pub expected_value: f64,
    /// `expected_value` plus every contribution
    pub predicted_output: f64,
    pub fraud_probability: Option<f64>,
    /// Sorted by absolute contribution, largest first
    pub contributions: Vec<FeatureContribution>,
}

/// Row with the highest fraud probability, the first on ties.
///
/// Falls back to row 0 when the model cannot score the table.
pub fn select_local_row(model: &dyn Classifier, table: &FeatureTable) -> (usize, Option<f64>) {
    match model.positive_probability(table.values()) {
        Ok(probabilities) => {
            let mut best: Option<(usize, f64)> = None;
            for (idx, &p) in probabilities.iter().enumerate() {
                if best.map_or(true, |(_, top)| p > top) {
                    best = Some((idx, p));
                }
            }
            match best {
                Some((idx, p)) => (idx, Some(p)),
                None => (0, None),
            }
        }
        Err(e) => {
            warn!(error = %e, "Could not score rows for local explanation, using row 0");
            (0, None)
        }
    }
}

impl LocalExplanation {
    pub fn build(
        attribution: &Attribution,
        table: &FeatureTable,
        row_index: usize,
        fraud_probability: Option<f64>,
    ) -> Result<Self> {
        let values = attribution.positive_class_values()?;
        if row_index >= values.nrows() || row_index >= table.n_rows() {
            bail!("Row {} is out of range for the explained table", row_index);
        }
        let expected_value = attribution.positive_class_baseline()?;

        let shap_row = values.row(row_index);
        let feature_row = table.row(row_index);
        let mut contributions: Vec<FeatureContribution> = table
            .columns()
            .iter()
            .enumerate()
            .map(|(j, feature)| FeatureContribution {
                feature: feature.clone(),
                value: feature_row[j],
                contribution: shap_row[j],
            })
            .collect();
        contributions.sort_by(|a, b| b.contribution.abs().total_cmp(&a.contribution.abs()));

        Ok(Self {
            row_index,
            method: attribution.method.clone(),
            expected_value,
            predicted_output: expected_value + shap_row.sum(),
            fraud_probability,
            contributions,
        })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        create_parent_dir(path)?;
        let file = File::create(path)
            .with_context(|| format!("Failed to create local explanation {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .with_context(|| format!("Failed to write local explanation {}", path.display()))?;

        info!(path = %path.display(), row = self.row_index, "Local explanation written");
        Ok(())
    }
}
