//! Gradient-boosted trees on the logistic loss.
//!
//! Every round fits one regression tree to the per-row gradient and hessian
//! of the weighted log-loss at the current margins, using Newton leaf values.
//! Fraud rows are up-weighted by `negatives / positives` so the rare class
//! contributes as much as the common one.

use super::tree::{SplitCriterion, SplitStats, Tree, TreeBuilder};
use super::{check_width, sigmoid, two_class_proba, Classifier, EnsembleOutput, TreeEnsemble};
use crate::config::BoostingConfig;
use crate::types::table::{LabelVector, FRAUD};
use anyhow::{bail, Context, Result};
use ndarray::{Array1, Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Floor on the per-row hessian
const MIN_HESSIAN: f64 = 1e-16;

/// Fitted boosted ensemble; trees sum to a log-odds margin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoosting {
    trees: Vec<Tree>,
    base_margin: f64,
    scale_pos_weight: f64,
    n_features: usize,
}

/// Ratio of legitimate to fraud labels, `None` without fraud labels
pub fn scale_pos_weight(labels: &LabelVector) -> Option<f64> {
    let positives = labels.positives();
    if positives == 0 {
        return None;
    }
    Some(labels.negatives() as f64 / positives as f64)
}

impl GradientBoosting {
    pub fn fit(
        x: ArrayView2<'_, f64>,
        y: &LabelVector,
        config: &BoostingConfig,
        seed: u64,
    ) -> Result<Self> {
        let n_rows = x.nrows();
        let n_features = x.ncols();
        if n_rows != y.len() {
            bail!("{} feature rows but {} labels", n_rows, y.len());
        }
        if n_features == 0 {
            bail!("Gradient boosting needs at least one feature");
        }
        let pos_weight = scale_pos_weight(y).context("Gradient boosting needs fraud labels")?;

        let targets = y.to_targets();
        let row_weights: Vec<f64> = y
            .as_slice()
            .iter()
            .map(|&l| if l == FRAUD { pos_weight } else { 1.0 })
            .collect();

        let criterion = SplitCriterion::Newton {
            reg_lambda: config.reg_lambda,
            min_child_weight: config.min_child_weight,
            learning_rate: config.learning_rate,
        };
        let n_columns = ((config.colsample_bytree * n_features as f64).round() as usize)
            .clamp(1, n_features);

        let base_margin = 0.0;
        let mut margins = vec![base_margin; n_rows];
        let mut trees = Vec::with_capacity(config.n_estimators);
        let mut rng = StdRng::seed_from_u64(seed);

        for round in 0..config.n_estimators {
            let stats: Vec<SplitStats> = margins
                .iter()
                .zip(targets.iter().zip(&row_weights))
                .map(|(&margin, (&target, &weight))| {
                    let p = sigmoid(margin);
                    SplitStats::new(
                        (p - target) * weight,
                        (p * (1.0 - p)).max(MIN_HESSIAN) * weight,
                    )
                })
                .collect();

            let rows: Vec<usize> = if config.subsample < 1.0 {
                (0..n_rows)
                    .filter(|_| rng.gen::<f64>() < config.subsample)
                    .collect()
            } else {
                (0..n_rows).collect()
            };

            let mut columns: Vec<usize> =
                rand::seq::index::sample(&mut rng, n_features, n_columns).into_vec();
            columns.sort_unstable();

            let tree = TreeBuilder::new(x.view(), &stats, criterion, config.max_depth)
                .with_features(columns)
                .build(&rows, &mut rng);

            for (margin, row) in margins.iter_mut().zip(x.outer_iter()) {
                *margin += tree.predict_row(row);
            }
            debug!(round, rows = rows.len(), "Boosting round fitted");
            trees.push(tree);
        }

        info!(
            trees = trees.len(),
            max_depth = config.max_depth,
            scale_pos_weight = pos_weight,
            "Gradient boosting fitted"
        );

        Ok(Self {
            trees,
            base_margin,
            scale_pos_weight: pos_weight,
            n_features,
        })
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn base_margin(&self) -> f64 {
        self.base_margin
    }

    pub fn scale_pos_weight(&self) -> f64 {
        self.scale_pos_weight
    }

    /// Raw log-odds per row
    pub fn margin(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        check_width(x, self.n_features)?;
        Ok(x
            .outer_iter()
            .map(|row| {
                self.base_margin + self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>()
            })
            .collect())
    }
}

impl Classifier for GradientBoosting {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        Ok(two_class_proba(self.margin(x)?.mapv(sigmoid)))
    }

    fn tree_ensemble(&self) -> Option<TreeEnsemble<'_>> {
        Some(TreeEnsemble {
            trees: &self.trees,
            output: EnsembleOutput::LogOdds {
                base_margin: self.base_margin,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn small_config() -> BoostingConfig {
        BoostingConfig {
            n_estimators: 20,
            max_depth: 2,
            min_child_weight: 0.1,
            ..BoostingConfig::default()
        }
    }

    fn imbalanced_data() -> (Array2<f64>, LabelVector) {
        let x = array![
            [0.0, 0.3],
            [0.1, 0.1],
            [0.2, 0.4],
            [0.3, 0.2],
            [0.4, 0.0],
            [0.5, 0.5],
            [0.6, 0.2],
            [0.7, 0.3],
            [3.0, 0.1],
            [3.2, 0.4],
        ];
        let y = LabelVector::new(vec![0, 0, 0, 0, 0, 0, 0, 0, 1, 1]).unwrap();
        (x, y)
    }

    #[test]
    fn test_scale_pos_weight() {
        let mut labels = vec![0u8; 950];
        labels.extend(vec![1u8; 50]);
        let labels = LabelVector::new(labels).unwrap();
        assert_eq!(scale_pos_weight(&labels), Some(19.0));

        let no_fraud = LabelVector::new(vec![0, 0]).unwrap();
        assert_eq!(scale_pos_weight(&no_fraud), None);
    }

    #[test]
    fn test_boosting_separates_fraud() {
        let (x, y) = imbalanced_data();
        let model = GradientBoosting::fit(x.view(), &y, &small_config(), 42).unwrap();

        assert_eq!(model.trees().len(), 20);
        assert_eq!(model.scale_pos_weight(), 4.0);
        let proba = model.positive_probability(x.view()).unwrap();
        assert!(proba[9] > 0.5);
        assert!(proba[0] < 0.5);
    }

    #[test]
    fn test_margin_matches_tree_sum() {
        let (x, y) = imbalanced_data();
        let model = GradientBoosting::fit(x.view(), &y, &small_config(), 1).unwrap();

        let margins = model.margin(x.view()).unwrap();
        let row = x.row(3);
        let expected: f64 =
            model.base_margin() + model.trees().iter().map(|t| t.predict_row(row)).sum::<f64>();
        assert!((margins[3] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_boosting_is_reproducible_with_seed() {
        let (x, y) = imbalanced_data();
        let first = GradientBoosting::fit(x.view(), &y, &small_config(), 9).unwrap();
        let second = GradientBoosting::fit(x.view(), &y, &small_config(), 9).unwrap();
        assert_eq!(first.trees(), second.trees());
    }

    #[test]
    fn test_boosting_requires_fraud_labels() {
        let x = array![[0.0], [1.0]];
        let y = LabelVector::new(vec![0, 0]).unwrap();
        assert!(GradientBoosting::fit(x.view(), &y, &small_config(), 0).is_err());
    }
}
