//! L2-regularized logistic regression with balanced class weights.
//!
//! Minimizes `C * sum_i w_i * logloss_i + 0.5 * |beta|^2` (intercept not
//! penalized) with damped Newton steps. Gradient and Hessian are accumulated
//! over rows in parallel.

use super::{balanced_class_weights, check_width, sigmoid, two_class_proba, Classifier};
use crate::config::LogisticConfig;
use crate::types::table::{LabelVector, FRAUD};
use anyhow::{bail, Result};
use ndarray::{Array1, Array2, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Sufficient-decrease constant of the backtracking line search
const ARMIJO: f64 = 1e-4;

/// Smallest step length tried before giving up on a direction
const MIN_STEP: f64 = 1e-10;

/// Fitted linear baseline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    coefficients: Array1<f64>,
    intercept: f64,
    n_iter: usize,
    converged: bool,
}

impl LogisticRegression {
    /// Fit on a feature matrix and aligned labels
    pub fn fit(x: ArrayView2<'_, f64>, y: &LabelVector, config: &LogisticConfig) -> Result<Self> {
        if x.nrows() != y.len() {
            bail!("{} feature rows but {} labels", x.nrows(), y.len());
        }

        let class_weights = balanced_class_weights(y)?;
        let problem = Problem {
            x,
            targets: y.to_targets(),
            weights: y
                .as_slice()
                .iter()
                .map(|&l| class_weights[usize::from(l == FRAUD)])
                .collect(),
            c: config.c,
        };

        let n_params = x.ncols() + 1;
        let mut beta = Array1::zeros(n_params);
        let mut objective = problem.objective(&beta);
        let mut converged = false;
        let mut n_iter = 0;

        while n_iter < config.max_iter {
            n_iter += 1;
            let (gradient, hessian) = problem.gradient_and_hessian(&beta);
            let direction = solve_spd(&hessian, &gradient).unwrap_or_else(|| gradient.clone());

            // Half the Newton decrement squared
            let decrement = gradient.dot(&direction);
            if decrement.abs() / 2.0 <= config.tolerance {
                converged = true;
                break;
            }

            let mut step = 1.0;
            loop {
                let candidate = &beta - &(&direction * step);
                let candidate_objective = problem.objective(&candidate);
                if candidate_objective <= objective - ARMIJO * step * decrement {
                    beta = candidate;
                    objective = candidate_objective;
                    break;
                }
                step /= 2.0;
                if step < MIN_STEP {
                    break;
                }
            }
            if step < MIN_STEP {
                // No descent left along the Newton direction
                converged = true;
                break;
            }

            debug!(iteration = n_iter, objective, "Logistic regression step");
        }

        if !converged {
            warn!(
                max_iter = config.max_iter,
                "Logistic regression did not converge, keeping last iterate"
            );
        }

        let intercept = beta[n_params - 1];
        let coefficients = beta.slice(ndarray::s![..n_params - 1]).to_owned();

        Ok(Self {
            coefficients,
            intercept,
            n_iter,
            converged,
        })
    }

    /// Build a model from known parameters
    pub fn from_parameters(coefficients: Array1<f64>, intercept: f64) -> Self {
        Self {
            coefficients,
            intercept,
            n_iter: 0,
            converged: true,
        }
    }

    pub fn coefficients(&self) -> &Array1<f64> {
        &self.coefficients
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    /// Raw log-odds per row
    pub fn decision_function(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        check_width(x, self.coefficients.len())?;
        Ok(x.dot(&self.coefficients) + self.intercept)
    }
}

impl Classifier for LogisticRegression {
    fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let proba = self.decision_function(x)?.mapv(sigmoid);
        Ok(two_class_proba(proba))
    }
}

/// Weighted, regularized log-loss over a fixed training set
struct Problem<'a> {
    x: ArrayView2<'a, f64>,
    targets: Vec<f64>,
    weights: Vec<f64>,
    c: f64,
}

impl Problem<'_> {
    fn margin(&self, row: usize, beta: &Array1<f64>) -> f64 {
        let n_features = self.x.ncols();
        let mut z = beta[n_features];
        for (j, &value) in self.x.row(row).iter().enumerate() {
            z += value * beta[j];
        }
        z
    }

    fn penalty(&self, beta: &Array1<f64>) -> f64 {
        let n_features = self.x.ncols();
        0.5 * beta.iter().take(n_features).map(|b| b * b).sum::<f64>()
    }

    fn objective(&self, beta: &Array1<f64>) -> f64 {
        let loss: f64 = (0..self.x.nrows())
            .into_par_iter()
            .map(|i| {
                let z = self.margin(i, beta);
                self.weights[i] * (softplus(z) - self.targets[i] * z)
            })
            .sum();
        self.c * loss + self.penalty(beta)
    }

    fn gradient_and_hessian(&self, beta: &Array1<f64>) -> (Array1<f64>, Array2<f64>) {
        let n_features = self.x.ncols();
        let n_params = n_features + 1;

        let (mut gradient, mut hessian) = (0..self.x.nrows())
            .into_par_iter()
            .fold(
                || (Array1::<f64>::zeros(n_params), Array2::<f64>::zeros((n_params, n_params))),
                |(mut g, mut h), i| {
                    let p = sigmoid(self.margin(i, beta));
                    let residual = self.c * self.weights[i] * (p - self.targets[i]);
                    let curvature = self.c * self.weights[i] * p * (1.0 - p);
                    let row = self.x.row(i);
                    let value = |j: usize| if j < n_features { row[j] } else { 1.0 };

                    for j in 0..n_params {
                        let xj = value(j);
                        g[j] += residual * xj;
                        let scaled = curvature * xj;
                        for k in 0..=j {
                            h[[j, k]] += scaled * value(k);
                        }
                    }
                    (g, h)
                },
            )
            .reduce(
                || (Array1::<f64>::zeros(n_params), Array2::<f64>::zeros((n_params, n_params))),
                |(g1, h1), (g2, h2)| (g1 + g2, h1 + h2),
            );

        for j in 0..n_params {
            for k in 0..j {
                hessian[[k, j]] = hessian[[j, k]];
            }
        }
        for j in 0..n_features {
            gradient[j] += beta[j];
            hessian[[j, j]] += 1.0;
        }

        (gradient, hessian)
    }
}

/// `ln(1 + e^z)` without overflow
fn softplus(z: f64) -> f64 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

/// Solve `a * x = b` for symmetric positive definite `a` by Cholesky
/// decomposition; `None` when `a` is not numerically positive definite
fn solve_spd(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = b.len();
    let mut l = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                l[[i, i]] = sum.sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }

    // Forward substitution: L y = b
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = b[i];
        for k in 0..i {
            sum -= l[[i, k]] * y[k];
        }
        y[i] = sum / l[[i, i]];
    }

    // Back substitution: L^T x = y
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = y[i];
        for k in i + 1..n {
            sum -= l[[k, i]] * x[k];
        }
        x[i] = sum / l[[i, i]];
    }

    Some(x)
}
