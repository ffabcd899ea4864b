//! Chooses the candidate to persist and writes the comparison report.
//!
//! Selection follows a fixed priority rather than the evaluation metrics:
//! the boosted ensemble when it was trained, otherwise the random forest.
//! The logistic baseline is reported but never selected.

use crate::dataset::create_parent_dir;
use crate::models::{FittedModel, ModelArtifact};
use crate::training::{CandidateKind, ModelCandidate};
use crate::types::EvaluationResult;
use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::info;

/// Candidates eligible for selection, most preferred first
pub const SELECTION_PRIORITY: [CandidateKind; 2] = [CandidateKind::Boosted, CandidateKind::Forest];

/// The candidate picked for persistence
#[derive(Debug, Clone)]
pub struct SelectedModel {
    pub kind: CandidateKind,
    pub model: FittedModel,
}

impl SelectedModel {
    pub fn name(&self) -> &'static str {
        self.kind.display_name()
    }

    /// Wrap into an artifact recording the training column order
    pub fn into_artifact(self, feature_names: Vec<String>) -> ModelArtifact {
        ModelArtifact::new(self.kind.display_name(), feature_names, self.model)
    }
}

#[derive(Debug, Clone)]
pub struct ModelSelector {
    priority: Vec<CandidateKind>,
}

impl Default for ModelSelector {
    fn default() -> Self {
        Self {
            priority: SELECTION_PRIORITY.to_vec(),
        }
    }
}

impl ModelSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// First available candidate in priority order
    pub fn select(&self, candidates: &[ModelCandidate]) -> Result<SelectedModel> {
        for kind in &self.priority {
            let fitted = candidates
                .iter()
                .find(|c| c.kind == *kind)
                .and_then(|c| c.model());
            if let Some(model) = fitted {
                info!(model = %kind, "Selected model by priority");
                return Ok(SelectedModel {
                    kind: *kind,
                    model: model.clone(),
                });
            }
        }

        let wanted: Vec<&str> = self.priority.iter().map(|k| k.display_name()).collect();
        bail!("No selectable candidate available, need one of {:?}", wanted)
    }

    /// Persist the selected model as the single artifact
    pub fn persist(
        &self,
        selected: SelectedModel,
        feature_names: Vec<String>,
        path: &Path,
    ) -> Result<ModelArtifact> {
        let artifact = selected.into_artifact(feature_names);
        artifact.save(path)?;
        Ok(artifact)
    }
}

/// Write every candidate's metrics as `model,precision,recall,f1,roc_auc`
pub fn write_comparison(path: &Path, results: &[EvaluationResult]) -> Result<()> {
    create_parent_dir(path)?;
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create comparison report {}", path.display()))?;
    for result in results {
        writer.serialize(result)?;
    }
    writer.flush()?;

    info!(path = %path.display(), candidates = results.len(), "Comparison report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Classifier, LogisticRegression, RandomForest};
    use crate::config::ForestConfig;
    use crate::evaluation::Evaluator;
    use crate::types::table::FeatureTable;
    use crate::types::table::LabelVector;
    use ndarray::array;

    fn logistic() -> FittedModel {
        FittedModel::Logistic(LogisticRegression::from_parameters(array![1.0], 0.0))
    }

    fn forest() -> FittedModel {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = LabelVector::new(vec![0, 0, 1, 1]).unwrap();
        let config = ForestConfig {
            n_estimators: 3,
            max_depth: 2,
        };
        FittedModel::Forest(RandomForest::fit(x.view(), &y, &config, 42).unwrap())
    }

    #[test]
    fn test_boosted_preferred_regardless_of_metrics() {
        // The boosted slot holds an inverted ranker that scores worse than the forest
        let inverted = FittedModel::Logistic(LogisticRegression::from_parameters(array![-1.0], 1.5));
        let candidates = vec![
            ModelCandidate::fitted(CandidateKind::Logistic, logistic()),
            ModelCandidate::fitted(CandidateKind::Forest, forest()),
            ModelCandidate::fitted(CandidateKind::Boosted, inverted),
        ];

        let x_test = FeatureTable::new(vec!["amount".into()], array![[0.0], [1.0], [2.0], [3.0]]).unwrap();
        let y_test = LabelVector::new(vec![0, 0, 1, 1]).unwrap();
        let evaluator = Evaluator::new();
        let score = |kind: CandidateKind| {
            let candidate = candidates.iter().find(|c| c.kind == kind).unwrap();
            evaluator
                .evaluate(candidate.name(), candidate.model().unwrap(), &x_test, &y_test)
                .unwrap()
        };
        let boosted = score(CandidateKind::Boosted);
        let forest = score(CandidateKind::Forest);
        assert!(boosted.roc_auc < forest.roc_auc);

        let selected = ModelSelector::new().select(&candidates).unwrap();
        assert_eq!(selected.kind, CandidateKind::Boosted);
        assert_eq!(selected.name(), "XGBoost");
    }

    #[test]
    fn test_forest_selected_without_boosting() {
        let candidates = vec![
            ModelCandidate::fitted(CandidateKind::Logistic, logistic()),
            ModelCandidate::fitted(CandidateKind::Forest, forest()),
            ModelCandidate::unavailable(CandidateKind::Boosted),
        ];

        let selected = ModelSelector::new().select(&candidates).unwrap();
        assert_eq!(selected.kind, CandidateKind::Forest);
        assert!(selected.model.tree_ensemble().is_some());
    }

    #[test]
    fn test_logistic_never_selected() {
        let candidates = vec![
            ModelCandidate::fitted(CandidateKind::Logistic, logistic()),
            ModelCandidate::unavailable(CandidateKind::Boosted),
        ];
        assert!(ModelSelector::new().select(&candidates).is_err());
    }

    #[test]
    fn test_write_comparison() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("model_comparison.csv");
        let results = vec![
            EvaluationResult {
                model: "Logistic Regression".into(),
                precision: 0.5,
                recall: 0.25,
                f1: 1.0 / 3.0,
                roc_auc: 0.75,
            },
            EvaluationResult {
                model: "Random Forest".into(),
                precision: 1.0,
                recall: 0.5,
                f1: 2.0 / 3.0,
                roc_auc: 0.9,
            },
        ];

        write_comparison(&path, &results).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("model,precision,recall,f1,roc_auc"));
        assert!(lines.next().unwrap().starts_with("Logistic Regression,0.5,0.25,"));
        assert!(lines.next().unwrap().starts_with("Random Forest,1.0,0.5,"));
    }

    #[test]
    fn test_persist_writes_loadable_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fraud_model.bin");
        let selected = SelectedModel {
            kind: CandidateKind::Forest,
            model: forest(),
        };

        ModelSelector::new()
            .persist(selected, vec!["amount".into()], &path)
            .unwrap();

        let artifact = ModelArtifact::load(&path).unwrap();
        assert_eq!(artifact.model_name, "Random Forest");
        assert_eq!(artifact.feature_names, vec!["amount".to_string()]);
    }
}
