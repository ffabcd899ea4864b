//! Persisted model artifact

use super::{Classifier, FittedModel};
use crate::dataset::{create_parent_dir, DatasetError};
use crate::types::table::FeatureTable;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::info;

/// The selected fitted candidate plus the metadata needed to reuse it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Display name of the candidate
    pub model_name: String,
    /// Training column order the model expects
    pub feature_names: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub model: FittedModel,
}

impl ModelArtifact {
    pub fn new(model_name: impl Into<String>, feature_names: Vec<String>, model: FittedModel) -> Self {
        Self {
            model_name: model_name.into(),
            feature_names,
            created_at: Utc::now(),
            model,
        }
    }

    /// Serialize to a single file, creating parent directories
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        create_parent_dir(path)?;

        let file = File::create(path)
            .with_context(|| format!("Failed to create model artifact {}", path.display()))?;
        bincode::serialize_into(BufWriter::new(file), self)
            .with_context(|| format!("Failed to serialize model to {}", path.display()))?;

        info!(model = %self.model_name, path = %path.display(), "Model artifact saved");
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open model artifact {}", path.display()))?;
        let artifact: Self = bincode::deserialize_from(BufReader::new(file))
            .with_context(|| format!("Failed to deserialize model from {}", path.display()))?;

        info!(
            model = %artifact.model_name,
            features = artifact.feature_names.len(),
            created_at = %artifact.created_at,
            "Model artifact loaded"
        );
        Ok(artifact)
    }

    /// Fail unless `table` has exactly the training columns, in order
    pub fn check_columns(&self, table: &FeatureTable) -> Result<(), DatasetError> {
        if table.columns() != self.feature_names.as_slice() {
            return Err(DatasetError::SchemaMismatch {
                train: self.feature_names.clone(),
                test: table.columns().to_vec(),
            });
        }
        Ok(())
    }

    pub fn model(&self) -> &dyn Classifier {
        &self.model
    }
}
