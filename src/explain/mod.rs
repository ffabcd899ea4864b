//! Feature attributions for the selected model.
//!
//! Attribution methods are tried in a fixed order. The first one that both
//! applies to the model and returns a well-shaped result wins; failures are
//! logged and the next method is tried.

pub mod report;
pub mod sampling;
pub mod tree_shap;

pub use report::{FeatureContribution, FeatureImportance, LocalExplanation};
pub use sampling::SamplingShap;
pub use tree_shap::TreeShap;

use crate::config::ExplainConfig;
use crate::models::Classifier;
use crate::types::table::{FeatureTable, FRAUD};
use ndarray::{Array2, ArrayView2};
use thiserror::Error;
use tracing::{info, warn};

/// Why an attribution method produced no result
#[derive(Debug, Error)]
pub enum ExplainError {
    #[error("{method} does not apply to this model")]
    NotApplicable { method: &'static str },

    #[error("{method} failed: {source}")]
    Failed {
        method: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{method} returned attributions of shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        method: String,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("attribution output has no positive class")]
    MissingPositiveClass,

    #[error("background sample is empty")]
    EmptyBackground,

    #[error("every attribution method failed: {0:?}")]
    Exhausted(Vec<String>),
}

/// Output that is either one value or one value per class
#[derive(Debug, Clone, PartialEq)]
pub enum ClassOutputs<T> {
    Single(T),
    /// Indexed by class label
    PerClass(Vec<T>),
}

impl<T> ClassOutputs<T> {
    /// The fraud-class entry: the only entry of a single output, or index 1
    pub fn positive(&self) -> Option<&T> {
        match self {
            ClassOutputs::Single(value) => Some(value),
            ClassOutputs::PerClass(values) => values.get(usize::from(FRAUD)),
        }
    }
}

/// Attribution matrix and baseline produced by one method
#[derive(Debug, Clone)]
pub struct Attribution {
    /// Name of the producing method
    pub method: String,
    /// `(rows, features)` contributions
    pub values: ClassOutputs<Array2<f64>>,
    /// Expected model output the contributions are measured against
    pub expected_value: ClassOutputs<f64>,
}

impl Attribution {
    pub fn positive_class_values(&self) -> Result<ArrayView2<'_, f64>, ExplainError> {
        self.values
            .positive()
            .map(|values| values.view())
            .ok_or(ExplainError::MissingPositiveClass)
    }

    pub fn positive_class_baseline(&self) -> Result<f64, ExplainError> {
        self.expected_value
            .positive()
            .copied()
            .ok_or(ExplainError::MissingPositiveClass)
    }
}

/// One way of attributing model output to features
pub trait AttributionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Cheap capability check done before `explain`
    fn applies_to(&self, model: &dyn Classifier) -> bool;

    fn explain(
        &self,
        model: &dyn Classifier,
        data: ArrayView2<'_, f64>,
    ) -> Result<Attribution, ExplainError>;
}

/// Ordered attribution fallback chain
pub struct Explainer {
    strategies: Vec<Box<dyn AttributionStrategy>>,
}

impl Explainer {
    pub fn new(strategies: Vec<Box<dyn AttributionStrategy>>) -> Self {
        Self { strategies }
    }

    /// Tree SHAP first, sampling SHAP over a training background second
    pub fn with_defaults(background: &FeatureTable, config: &ExplainConfig) -> Result<Self, ExplainError> {
        let sampling = SamplingShap::from_training(
            background,
            config.background_size,
            config.n_samples,
            config.seed,
        )?;
        Ok(Self::new(vec![Box::new(TreeShap), Box::new(sampling)]))
    }

    /// Result of the first strategy that applies and succeeds
    pub fn explain(
        &self,
        model: &dyn Classifier,
        data: ArrayView2<'_, f64>,
    ) -> Result<Attribution, ExplainError> {
        let mut failures = Vec::new();

        for strategy in &self.strategies {
            if !strategy.applies_to(model) {
                info!(method = strategy.name(), "Attribution method does not apply, skipping");
                failures.push(format!("{}: not applicable", strategy.name()));
                continue;
            }

            match strategy
                .explain(model, data)
                .and_then(|attribution| check_shape(attribution, data.dim()))
            {
                Ok(attribution) => {
                    info!(
                        method = %attribution.method,
                        rows = data.nrows(),
                        "Attributions computed"
                    );
                    return Ok(attribution);
                }
                Err(e) => {
                    warn!(method = strategy.name(), error = %e, "Attribution method failed, trying next");
                    failures.push(format!("{}: {}", strategy.name(), e));
                }
            }
        }

        Err(ExplainError::Exhausted(failures))
    }
}

fn check_shape(attribution: Attribution, expected: (usize, usize)) -> Result<Attribution, ExplainError> {
    let found = attribution.positive_class_values()?.dim();
    if found != expected {
        return Err(ExplainError::ShapeMismatch {
            method: attribution.method,
            expected,
            found,
        });
    }
    Ok(attribution)
}
