//! Configuration management for the fraud scoring pipeline

use anyhow::{Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub paths: PathsConfig,
    pub training: TrainingConfig,
    pub explain: ExplainConfig,
    pub export: ExportConfig,
    pub logging: LoggingConfig,
}

/// Input and output file locations
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub train_features: PathBuf,
    pub test_features: PathBuf,
    pub train_labels: PathBuf,
    pub test_labels: PathBuf,
    /// Serialized selected model
    pub model_artifact: PathBuf,
    /// Candidate comparison table
    pub comparison_report: PathBuf,
    /// Global attribution ranking
    pub importance_report: PathBuf,
    /// Positive-class attribution matrix, one row per test instance
    pub attribution_values: PathBuf,
    /// Single-instance explanation record
    pub local_explanation: PathBuf,
    /// Scored dataset for analytics
    pub scored_export: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            train_features: "data/processed/X_train.csv".into(),
            test_features: "data/processed/X_test.csv".into(),
            train_labels: "data/processed/y_train.csv".into(),
            test_labels: "data/processed/y_test.csv".into(),
            model_artifact: "models/fraud_model.bin".into(),
            comparison_report: "models/model_comparison.csv".into(),
            importance_report: "reports/shap/shap_feature_importance.csv".into(),
            attribution_values: "reports/shap/shap_values.csv".into(),
            local_explanation: "reports/shap/shap_local_example.json".into(),
            scored_export: "data/powerbi/fraud_powerbi_dataset.csv".into(),
        }
    }
}

/// Candidate roster hyperparameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Seed threaded into every stochastic training step
    pub seed: u64,
    pub logistic: LogisticConfig,
    pub forest: ForestConfig,
    pub boosting: BoostingConfig,
    /// Overrides the build-time availability of the boosted candidate
    pub enable_boosting: Option<bool>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            logistic: LogisticConfig::default(),
            forest: ForestConfig::default(),
            boosting: BoostingConfig::default(),
            enable_boosting: None,
        }
    }
}

/// Linear baseline settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogisticConfig {
    /// Inverse regularization strength
    pub c: f64,
    pub max_iter: usize,
    pub tolerance: f64,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 1000,
            tolerance: 1e-6,
        }
    }
}

/// Bagged tree ensemble settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    pub n_estimators: usize,
    pub max_depth: usize,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            max_depth: 10,
        }
    }
}

/// Boosted tree ensemble settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BoostingConfig {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    /// Fraction of rows sampled per round
    pub subsample: f64,
    /// Fraction of columns sampled per tree
    pub colsample_bytree: f64,
    /// L2 penalty on leaf weights
    pub reg_lambda: f64,
    /// Minimum hessian sum in a child
    pub min_child_weight: f64,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            max_depth: 5,
            learning_rate: 0.1,
            subsample: 0.8,
            colsample_bytree: 0.8,
            reg_lambda: 1.0,
            min_child_weight: 1.0,
        }
    }
}

/// Attribution settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExplainConfig {
    /// Training rows drawn as the sampling background
    pub background_size: usize,
    /// Stochastic samples per explained instance
    pub n_samples: usize,
    pub seed: u64,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            background_size: 100,
            n_samples: 100,
            seed: 42,
        }
    }
}

/// Scored export settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Seed of the synthetic customer and merchant dimensions
    pub seed: u64,
    /// Number of equal-width time bins
    pub time_buckets: u8,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            time_buckets: 10,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Load from `path` when it exists, otherwise use the built-in defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load_from_path(path)
        } else {
            info!(path = %path.display(), "No configuration file, using defaults");
            Ok(Self::default())
        }
    }
}
