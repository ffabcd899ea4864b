//! Candidate classifiers and the persisted model artifact

pub mod artifact;
pub mod boosting;
pub mod forest;
pub mod linear;
pub mod tree;

pub use artifact::ModelArtifact;
pub use boosting::GradientBoosting;
pub use forest::RandomForest;
pub use linear::LogisticRegression;
pub use tree::Tree;

use crate::types::table::{LabelVector, FRAUD};
use anyhow::{bail, Result};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Decision threshold on the fraud probability used by `predict`
pub const DECISION_THRESHOLD: f64 = 0.5;

/// A fitted binary classifier
pub trait Classifier: Send + Sync {
    /// Number of feature columns the model was fitted on
    fn n_features(&self) -> usize;

    /// Class probabilities, shape `(rows, 2)`; column 1 is fraud
    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>>;

    /// Hard labels: fraud when its probability exceeds 0.5
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<u8>> {
        Ok(self
            .positive_probability(x)?
            .iter()
            .map(|&p| u8::from(p > DECISION_THRESHOLD))
            .collect())
    }

    /// Fraud-class probability per row
    fn positive_probability(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        Ok(self
            .predict_proba(x)?
            .index_axis(Axis(1), usize::from(FRAUD))
            .to_owned())
    }

    /// Tree structure, for models built from decision trees
    fn tree_ensemble(&self) -> Option<TreeEnsemble<'_>> {
        None
    }
}

/// How an ensemble combines the raw outputs of its trees
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EnsembleOutput {
    /// Mean of leaf probabilities
    MeanProbability,
    /// Base margin plus the sum of leaf values, in log-odds
    LogOdds { base_margin: f64 },
}

/// Borrowed view of a tree ensemble
#[derive(Debug, Clone, Copy)]
pub struct TreeEnsemble<'a> {
    pub trees: &'a [Tree],
    pub output: EnsembleOutput,
}

/// Any fitted candidate, in serializable form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FittedModel {
    Logistic(LogisticRegression),
    Forest(RandomForest),
    Boosted(GradientBoosting),
}

impl FittedModel {
    fn inner(&self) -> &dyn Classifier {
        match self {
            FittedModel::Logistic(model) => model,
            FittedModel::Forest(model) => model,
            FittedModel::Boosted(model) => model,
        }
    }
}

impl Classifier for FittedModel {
    fn n_features(&self) -> usize {
        self.inner().n_features()
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        self.inner().predict_proba(x)
    }

    fn tree_ensemble(&self) -> Option<TreeEnsemble<'_>> {
        self.inner().tree_ensemble()
    }
}

/// Per-class weights `n / (2 * n_class)`, indexed by label
pub fn balanced_class_weights(labels: &LabelVector) -> Result<[f64; 2]> {
    let positives = labels.positives();
    let negatives = labels.negatives();
    if positives == 0 || negatives == 0 {
        bail!(
            "Balanced weighting needs both classes, got {} legitimate and {} fraud labels",
            negatives,
            positives
        );
    }

    let n = labels.len() as f64;
    Ok([n / (2.0 * negatives as f64), n / (2.0 * positives as f64)])
}

/// Fail unless `x` has the width the model was fitted on
pub(crate) fn check_width(x: ArrayView2<'_, f64>, n_features: usize) -> Result<()> {
    if x.ncols() != n_features {
        bail!(
            "Model expects {} features, input has {}",
            n_features,
            x.ncols()
        );
    }
    Ok(())
}

/// Stack fraud probabilities into `(rows, 2)` class probabilities
pub(crate) fn two_class_proba(positive: Array1<f64>) -> Array2<f64> {
    let mut proba = Array2::zeros((positive.len(), 2));
    for (mut row, &p) in proba.outer_iter_mut().zip(positive.iter()) {
        row[0] = 1.0 - p;
        row[1] = p;
    }
    proba
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_class_weights() {
        let labels = LabelVector::new(vec![0, 0, 0, 1]).unwrap();
        let [w0, w1] = balanced_class_weights(&labels).unwrap();
        assert!((w0 - 4.0 / 6.0).abs() < 1e-12);
        assert!((w1 - 2.0).abs() < 1e-12);
        // Both classes carry the same total weight
        assert!((3.0 * w0 - w1).abs() < 1e-12);
    }

    #[test]
    fn test_balanced_class_weights_needs_both_classes() {
        let labels = LabelVector::new(vec![0, 0]).unwrap();
        assert!(balanced_class_weights(&labels).is_err());
    }

    #[test]
    fn test_sigmoid_is_stable() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(800.0) <= 1.0);
        assert!(sigmoid(-800.0) >= 0.0);
        assert!((sigmoid(2.0) + sigmoid(-2.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_two_class_proba() {
        let proba = two_class_proba(Array1::from(vec![0.25, 1.0]));
        assert_eq!(proba.row(0).to_vec(), vec![0.75, 0.25]);
        assert_eq!(proba.row(1).to_vec(), vec![0.0, 1.0]);
    }
}
