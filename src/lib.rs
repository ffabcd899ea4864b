//! Fraud Scoring Pipeline Library
//!
//! Trains and compares candidate fraud classifiers, persists the one chosen
//! by a fixed priority policy, explains its predictions with Shapley
//! attributions and exports a scored dataset for business analytics.

pub mod config;
pub mod dataset;
pub mod evaluation;
pub mod explain;
pub mod export;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod selection;
pub mod training;
pub mod types;

pub use config::AppConfig;
pub use dataset::{Dataset, DatasetError};
pub use evaluation::Evaluator;
pub use explain::{Attribution, AttributionStrategy, ExplainError, Explainer};
pub use export::{ScoringError, ScoringExporter};
pub use models::{Classifier, FittedModel, ModelArtifact};
pub use pipeline::Stage;
pub use selection::ModelSelector;
pub use training::{ModelCandidate, ModelTrainer};
pub use types::{EvaluationResult, FeatureTable, LabelVector, ScoredRecord};
