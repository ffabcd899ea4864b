//! Model-agnostic Monte-Carlo Shapley estimates.
//!
//! Each sample draws a feature permutation and a background row, then walks
//! the permutation switching features from the background value to the
//! explained value one at a time. The change in fraud probability at each
//! step is credited to the switched feature. A final efficiency adjustment
//! spreads any remaining gap between `f(x) - E[f]` and the summed estimates
//! across features in proportion to their sampling variance.

use super::{Attribution, AttributionStrategy, ClassOutputs, ExplainError};
use crate::models::Classifier;
use crate::types::table::FeatureTable;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

pub const METHOD_NAME: &str = "sampling_shap";

/// Permutation-sampling Shapley estimator over a fixed background sample
#[derive(Debug, Clone)]
pub struct SamplingShap {
    background: Array2<f64>,
    n_samples: usize,
    seed: u64,
}

impl SamplingShap {
    pub fn new(background: Array2<f64>, n_samples: usize, seed: u64) -> Self {
        Self {
            background,
            n_samples: n_samples.max(1),
            seed,
        }
    }

    /// Draw up to `size` training rows without replacement as the background
    pub fn from_training(
        train: &FeatureTable,
        size: usize,
        n_samples: usize,
        seed: u64,
    ) -> Result<Self, ExplainError> {
        if train.is_empty() {
            return Err(ExplainError::EmptyBackground);
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let amount = size.clamp(1, train.n_rows());
        let mut rows = rand::seq::index::sample(&mut rng, train.n_rows(), amount).into_vec();
        rows.sort_unstable();

        Ok(Self::new(
            train.values().select(Axis(0), &rows),
            n_samples,
            seed,
        ))
    }

    pub fn background(&self) -> ArrayView2<'_, f64> {
        self.background.view()
    }

    fn explain_row(
        &self,
        model: &dyn Classifier,
        x: &[f64],
        row_seed: u64,
        background_mean: f64,
    ) -> anyhow::Result<Vec<f64>> {
        let n_features = x.len();
        let mut rng = StdRng::seed_from_u64(row_seed);
        let mut order: Vec<usize> = (0..n_features).collect();

        // One block of n_features + 1 rows per sample: background, then one
        // more explained feature switched in per row
        let mut batch = Array2::<f64>::zeros((self.n_samples * (n_features + 1), n_features));
        let mut orders = Vec::with_capacity(self.n_samples);
        for s in 0..self.n_samples {
            order.shuffle(&mut rng);
            let z = self.background.row(rng.gen_range(0..self.background.nrows()));
            let start = s * (n_features + 1);
            let mut current = z.to_owned();
            batch.row_mut(start).assign(&current);
            for (step, &feature) in order.iter().enumerate() {
                current[feature] = x[feature];
                batch.row_mut(start + step + 1).assign(&current);
            }
            orders.push(order.clone());
        }

        let outputs = model.positive_probability(batch.view())?;

        let mut sums = vec![0.0; n_features];
        let mut squares = vec![0.0; n_features];
        for (s, order) in orders.iter().enumerate() {
            let start = s * (n_features + 1);
            for (step, &feature) in order.iter().enumerate() {
                let delta = outputs[start + step + 1] - outputs[start + step];
                sums[feature] += delta;
                squares[feature] += delta * delta;
            }
        }

        let n = self.n_samples as f64;
        let mut phi: Vec<f64> = sums.iter().map(|s| s / n).collect();
        let variances: Vec<f64> = squares
            .iter()
            .zip(&phi)
            .map(|(sq, mean)| (sq / n - mean * mean).max(0.0))
            .collect();

        let fx = model.positive_probability(ArrayView2::from_shape((1, n_features), x)?)?[0];
        let gap = fx - background_mean - phi.iter().sum::<f64>();
        let total_variance: f64 = variances.iter().sum();
        for (value, variance) in phi.iter_mut().zip(&variances) {
            *value += if total_variance > 0.0 {
                gap * variance / total_variance
            } else {
                gap / n_features as f64
            };
        }
        Ok(phi)
    }
}

impl AttributionStrategy for SamplingShap {
    fn name(&self) -> &'static str {
        METHOD_NAME
    }

    fn applies_to(&self, model: &dyn Classifier) -> bool {
        model.n_features() == self.background.ncols()
    }

    fn explain(
        &self,
        model: &dyn Classifier,
        data: ArrayView2<'_, f64>,
    ) -> Result<Attribution, ExplainError> {
        let failed = |source: anyhow::Error| ExplainError::Failed {
            method: METHOD_NAME,
            source: source.into(),
        };
        if self.background.nrows() == 0 {
            return Err(ExplainError::EmptyBackground);
        }
        if data.ncols() != self.background.ncols() {
            return Err(failed(anyhow::anyhow!(
                "data has {} features, background has {}",
                data.ncols(),
                self.background.ncols()
            )));
        }

        let background_output: Array1<f64> = model
            .positive_probability(self.background.view())
            .map_err(failed)?;
        let expected = background_output.mean().unwrap_or(0.0);

        let rows: Vec<Vec<f64>> = (0..data.nrows())
            .into_par_iter()
            .map(|i| {
                let x = data.row(i).to_vec();
                self.explain_row(model, &x, self.seed.wrapping_add(i as u64), expected)
            })
            .collect::<anyhow::Result<_>>()
            .map_err(failed)?;

        let mut positive = Array2::<f64>::zeros(data.dim());
        for (mut out, phi) in positive.axis_iter_mut(Axis(0)).zip(rows) {
            for (o, v) in out.iter_mut().zip(phi) {
                *o = v;
            }
        }

        Ok(Attribution {
            method: METHOD_NAME.to_string(),
            values: ClassOutputs::PerClass(vec![-&positive, positive]),
            expected_value: ClassOutputs::PerClass(vec![1.0 - expected, expected]),
        })
    }
}
