//! Bagged decision-tree ensemble.
//!
//! Each tree sees a bootstrap sample of the training rows and considers
//! `sqrt(n_features)` random columns at every split. Class imbalance is
//! corrected by weighting every bootstrap copy of a row with its balanced
//! class weight, so no resampling of the minority class takes place.

use super::tree::{SplitCriterion, SplitStats, Tree, TreeBuilder};
use super::{
    balanced_class_weights, check_width, two_class_proba, Classifier, EnsembleOutput,
    TreeEnsemble,
};
use crate::config::ForestConfig;
use crate::types::table::{LabelVector, FRAUD};
use anyhow::{bail, Result};
use ndarray::{Array1, Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Fitted random forest; predicts the mean leaf fraud fraction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<Tree>,
    n_features: usize,
}

impl RandomForest {
    /// Fit `config.n_estimators` trees; tree `i` draws from seed `seed + i`
    pub fn fit(
        x: ArrayView2<'_, f64>,
        y: &LabelVector,
        config: &ForestConfig,
        seed: u64,
    ) -> Result<Self> {
        let n_rows = x.nrows();
        if n_rows != y.len() {
            bail!("{} feature rows but {} labels", n_rows, y.len());
        }
        if config.n_estimators == 0 {
            bail!("Random forest needs at least one tree");
        }

        let class_weights = balanced_class_weights(y)?;
        let n_features = x.ncols();
        let max_features = ((n_features as f64).sqrt() as usize).max(1);
        let labels = y.as_slice();

        let trees: Vec<Tree> = (0..config.n_estimators)
            .into_par_iter()
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));

                let mut counts = vec![0u32; n_rows];
                for _ in 0..n_rows {
                    counts[rng.gen_range(0..n_rows)] += 1;
                }

                let stats: Vec<SplitStats> = counts
                    .iter()
                    .zip(labels)
                    .map(|(&count, &label)| {
                        let is_fraud = label == FRAUD;
                        let weight = f64::from(count) * class_weights[usize::from(is_fraud)];
                        if is_fraud {
                            SplitStats::new(0.0, weight)
                        } else {
                            SplitStats::new(weight, 0.0)
                        }
                    })
                    .collect();
                let rows: Vec<usize> = (0..n_rows).filter(|&r| counts[r] > 0).collect();

                TreeBuilder::new(x.view(), &stats, SplitCriterion::Gini, config.max_depth)
                    .with_max_features(max_features)
                    .build(&rows, &mut rng)
            })
            .collect();

        info!(
            trees = trees.len(),
            max_depth = config.max_depth,
            max_features,
            "Random forest fitted"
        );

        Ok(Self { trees, n_features })
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }
}

impl Classifier for RandomForest {
    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        check_width(x, self.n_features)?;
        let n_trees = self.trees.len() as f64;
        let positive: Array1<f64> = x
            .outer_iter()
            .map(|row| self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / n_trees)
            .collect();
        Ok(two_class_proba(positive))
    }

    fn tree_ensemble(&self) -> Option<TreeEnsemble<'_>> {
        Some(TreeEnsemble {
            trees: &self.trees,
            output: EnsembleOutput::MeanProbability,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn separable_data() -> (Array2<f64>, LabelVector) {
        let x = array![
            [0.0, 1.0],
            [0.1, 0.9],
            [0.2, 1.1],
            [0.3, 0.8],
            [0.4, 1.0],
            [0.5, 1.2],
            [2.0, 0.0],
            [2.1, 0.1],
        ];
        let y = LabelVector::new(vec![0, 0, 0, 0, 0, 0, 1, 1]).unwrap();
        (x, y)
    }

    fn small_config() -> ForestConfig {
        ForestConfig {
            n_estimators: 15,
            max_depth: 4,
        }
    }

    #[test]
    fn test_forest_probabilities_in_range() {
        let (x, y) = separable_data();
        let forest = RandomForest::fit(x.view(), &y, &small_config(), 42).unwrap();

        assert_eq!(forest.trees().len(), 15);
        let proba = forest.predict_proba(x.view()).unwrap();
        for row in proba.outer_iter() {
            assert!((row[0] + row[1] - 1.0).abs() < 1e-12);
            assert!((0.0..=1.0).contains(&row[1]));
        }
        assert!(proba[[7, 1]] > proba[[0, 1]]);
    }

    #[test]
    fn test_forest_is_reproducible_with_seed() {
        let (x, y) = separable_data();
        let first = RandomForest::fit(x.view(), &y, &small_config(), 7).unwrap();
        let second = RandomForest::fit(x.view(), &y, &small_config(), 7).unwrap();

        assert_eq!(first.trees(), second.trees());
    }

    #[test]
    fn test_forest_respects_max_depth() {
        let (x, y) = separable_data();
        let config = ForestConfig {
            n_estimators: 5,
            max_depth: 1,
        };
        let forest = RandomForest::fit(x.view(), &y, &config, 42).unwrap();

        assert!(forest.trees().iter().all(|t| t.depth() <= 1));
    }

    #[test]
    fn test_forest_exposes_tree_ensemble() {
        let (x, y) = separable_data();
        let forest = RandomForest::fit(x.view(), &y, &small_config(), 42).unwrap();

        let ensemble = forest.tree_ensemble().unwrap();
        assert_eq!(ensemble.trees.len(), 15);
        assert_eq!(ensemble.output, EnsembleOutput::MeanProbability);
    }
}
