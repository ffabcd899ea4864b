//! Fits the fixed roster of candidate classifiers

use crate::config::TrainingConfig;
use crate::dataset::check_aligned;
use crate::models::{FittedModel, GradientBoosting, LogisticRegression, RandomForest};
use crate::types::table::{FeatureTable, LabelVector};
use anyhow::{bail, Context, Result};
use std::fmt;
use std::time::Instant;
use tracing::{info, warn};

/// The candidate families, in roster order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandidateKind {
    Logistic,
    Forest,
    Boosted,
}

impl CandidateKind {
    pub const ROSTER: [CandidateKind; 3] = [
        CandidateKind::Logistic,
        CandidateKind::Forest,
        CandidateKind::Boosted,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            CandidateKind::Logistic => "Logistic Regression",
            CandidateKind::Forest => "Random Forest",
            CandidateKind::Boosted => "XGBoost",
        }
    }
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone)]
pub enum CandidateStatus {
    Fitted(FittedModel),
    /// The candidate's implementation is not available in this build
    Unavailable,
}

/// One roster entry after training
#[derive(Debug, Clone)]
pub struct ModelCandidate {
    pub kind: CandidateKind,
    pub status: CandidateStatus,
}

impl ModelCandidate {
    pub fn fitted(kind: CandidateKind, model: FittedModel) -> Self {
        Self {
            kind,
            status: CandidateStatus::Fitted(model),
        }
    }

    pub fn unavailable(kind: CandidateKind) -> Self {
        Self {
            kind,
            status: CandidateStatus::Unavailable,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.display_name()
    }

    pub fn is_available(&self) -> bool {
        matches!(self.status, CandidateStatus::Fitted(_))
    }

    pub fn model(&self) -> Option<&FittedModel> {
        match &self.status {
            CandidateStatus::Fitted(model) => Some(model),
            CandidateStatus::Unavailable => None,
        }
    }

    pub fn into_model(self) -> Option<FittedModel> {
        match self.status {
            CandidateStatus::Fitted(model) => Some(model),
            CandidateStatus::Unavailable => None,
        }
    }
}

/// Trains every candidate on one train split
pub struct ModelTrainer {
    config: TrainingConfig,
    boosting_available: bool,
}

impl ModelTrainer {
    /// Boosting availability is decided here, once: the `boosting` build
    /// feature unless `enable_boosting` overrides it
    pub fn new(config: &TrainingConfig) -> Self {
        let boosting_available = config
            .enable_boosting
            .unwrap_or(cfg!(feature = "boosting"));
        Self {
            config: config.clone(),
            boosting_available,
        }
    }

    pub fn with_boosting(mut self, available: bool) -> Self {
        self.boosting_available = available;
        self
    }

    pub fn boosting_available(&self) -> bool {
        self.boosting_available
    }

    /// Fit the roster in order: logistic, forest, boosted
    pub fn train(&self, x: &FeatureTable, y: &LabelVector) -> Result<Vec<ModelCandidate>> {
        check_aligned(x, y).context("Training table and labels are not aligned")?;
        if y.positives() == 0 || y.negatives() == 0 {
            bail!(
                "Training labels must contain both classes, got {} legitimate and {} fraud",
                y.negatives(),
                y.positives()
            );
        }

        info!(
            rows = x.n_rows(),
            features = x.n_features(),
            fraud = y.positives(),
            "Training candidate models"
        );

        let mut candidates = Vec::with_capacity(CandidateKind::ROSTER.len());
        for kind in CandidateKind::ROSTER {
            let candidate = self.train_one(kind, x, y)?;
            candidates.push(candidate);
        }
        Ok(candidates)
    }

    fn train_one(
        &self,
        kind: CandidateKind,
        x: &FeatureTable,
        y: &LabelVector,
    ) -> Result<ModelCandidate> {
        if kind == CandidateKind::Boosted && !self.boosting_available {
            warn!(model = %kind, "Boosting support not available, skipping candidate");
            return Ok(ModelCandidate::unavailable(kind));
        }

        let start = Instant::now();
        let values = x.values();
        let seed = self.config.seed;
        let model = match kind {
            CandidateKind::Logistic => {
                FittedModel::Logistic(LogisticRegression::fit(values, y, &self.config.logistic)?)
            }
            CandidateKind::Forest => {
                FittedModel::Forest(RandomForest::fit(values, y, &self.config.forest, seed)?)
            }
            CandidateKind::Boosted => {
                FittedModel::Boosted(GradientBoosting::fit(values, y, &self.config.boosting, seed)?)
            }
        };

        info!(
            model = %kind,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Candidate fitted"
        );
        Ok(ModelCandidate::fitted(kind, model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BoostingConfig, ForestConfig};
    use ndarray::array;

    fn small_config() -> TrainingConfig {
        TrainingConfig {
            forest: ForestConfig {
                n_estimators: 5,
                max_depth: 3,
            },
            boosting: BoostingConfig {
                n_estimators: 5,
                max_depth: 2,
                min_child_weight: 0.1,
                ..BoostingConfig::default()
            },
            ..TrainingConfig::default()
        }
    }

    fn train_data() -> (FeatureTable, LabelVector) {
        let x = FeatureTable::new(
            vec!["time".into(), "amount".into()],
            array![
                [0.0, 1.0],
                [1.0, 2.0],
                [2.0, 1.5],
                [3.0, 0.5],
                [4.0, 9.0],
                [5.0, 8.5],
            ],
        )
        .unwrap();
        let y = LabelVector::new(vec![0, 0, 0, 0, 1, 1]).unwrap();
        (x, y)
    }

    #[test]
    fn test_roster_order_and_names() {
        let (x, y) = train_data();
        let candidates = ModelTrainer::new(&small_config())
            .with_boosting(true)
            .train(&x, &y)
            .unwrap();

        let names: Vec<_> = candidates.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["Logistic Regression", "Random Forest", "XGBoost"]);
        assert!(candidates.iter().all(|c| c.is_available()));
    }

    #[test]
    fn test_unavailable_boosting_is_not_fitted() {
        let (x, y) = train_data();
        let candidates = ModelTrainer::new(&small_config())
            .with_boosting(false)
            .train(&x, &y)
            .unwrap();

        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[2].kind, CandidateKind::Boosted);
        assert!(!candidates[2].is_available());
        assert!(candidates[2].model().is_none());
        assert!(candidates[1].is_available());
    }

    #[test]
    fn test_config_overrides_build_feature() {
        let config = TrainingConfig {
            enable_boosting: Some(false),
            ..small_config()
        };
        assert!(!ModelTrainer::new(&config).boosting_available());

        let config = TrainingConfig {
            enable_boosting: None,
            ..small_config()
        };
        assert_eq!(
            ModelTrainer::new(&config).boosting_available(),
            cfg!(feature = "boosting")
        );
    }

    #[test]
    fn test_single_class_labels_rejected() {
        let (x, _) = train_data();
        let y = LabelVector::new(vec![0; 6]).unwrap();
        assert!(ModelTrainer::new(&small_config()).train(&x, &y).is_err());
    }

    #[test]
    fn test_misaligned_labels_rejected() {
        let (x, _) = train_data();
        let y = LabelVector::new(vec![0, 1]).unwrap();
        assert!(ModelTrainer::new(&small_config()).train(&x, &y).is_err());
    }
}
