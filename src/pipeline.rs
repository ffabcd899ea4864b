//! Sequential stage orchestration over the file-based handoff.
//!
//! Each stage reads its inputs from the configured paths and writes its
//! outputs only after all of its computation has succeeded.

use crate::config::AppConfig;
use crate::dataset::{check_aligned, check_same_schema, read_feature_table, read_labels, Dataset};
use crate::evaluation::{log_comparison, Evaluator};
use crate::explain::report::{
    global_importance, select_local_row, write_attribution_values, write_importance,
};
use crate::explain::{Attribution, Explainer, FeatureImportance, LocalExplanation};
use crate::export::{ScoredDataset, ScoringExporter};
use crate::metrics::PipelineMetrics;
use crate::models::ModelArtifact;
use crate::selection::{write_comparison, ModelSelector};
use crate::training::ModelTrainer;
use crate::types::EvaluationResult;
use anyhow::{bail, Context, Result};
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// Which part of the pipeline to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Train,
    Explain,
    Export,
    All,
}

impl FromStr for Stage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "train" => Ok(Stage::Train),
            "explain" => Ok(Stage::Explain),
            "export" => Ok(Stage::Export),
            "all" => Ok(Stage::All),
            other => bail!("Unknown stage '{}', expected train, explain, export or all", other),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Train => "train",
            Stage::Explain => "explain",
            Stage::Export => "export",
            Stage::All => "all",
        };
        f.write_str(name)
    }
}

/// What the training stage produced
#[derive(Debug)]
pub struct TrainingOutcome {
    pub results: Vec<EvaluationResult>,
    pub artifact: ModelArtifact,
}

/// What the explain stage produced
#[derive(Debug)]
pub struct ExplainOutcome {
    pub method: String,
    pub attribution: Attribution,
    pub importance: Vec<FeatureImportance>,
    pub local: LocalExplanation,
}

/// Train every candidate, evaluate, select by priority and persist
pub fn run_training(config: &AppConfig) -> Result<TrainingOutcome> {
    let dataset = Dataset::load(&config.paths)?;

    let candidates = ModelTrainer::new(&config.training).train(&dataset.x_train, &dataset.y_train)?;

    let evaluator = Evaluator::new();
    let mut results = Vec::new();
    for candidate in &candidates {
        let Some(model) = candidate.model() else {
            continue;
        };
        results.push(evaluator.evaluate(candidate.name(), model, &dataset.x_test, &dataset.y_test)?);
    }
    log_comparison(&results);

    let selector = ModelSelector::new();
    let selected = selector.select(&candidates)?;
    write_comparison(&config.paths.comparison_report, &results)?;
    let artifact = selector.persist(
        selected,
        dataset.x_train.columns().to_vec(),
        &config.paths.model_artifact,
    )?;

    Ok(TrainingOutcome { results, artifact })
}

/// Attribute the persisted model's test-set output to features
pub fn run_explain(config: &AppConfig) -> Result<ExplainOutcome> {
    let paths = &config.paths;
    let artifact = ModelArtifact::load(&paths.model_artifact)?;
    let x_train = read_feature_table(&paths.train_features).context("Failed to load training features")?;
    let x_test = read_feature_table(&paths.test_features).context("Failed to load test features")?;
    check_same_schema(&x_train, &x_test)?;
    artifact.check_columns(&x_test)?;

    let explainer = Explainer::with_defaults(&x_train, &config.explain)?;
    let attribution = explainer.explain(artifact.model(), x_test.values())?;

    let importance = global_importance(&attribution, x_test.columns())?;
    let (row, probability) = select_local_row(artifact.model(), &x_test);
    let local = LocalExplanation::build(&attribution, &x_test, row, probability)?;

    write_importance(&paths.importance_report, &importance)?;
    write_attribution_values(&paths.attribution_values, &attribution, x_test.columns())?;
    local.write(&paths.local_explanation)?;

    if let Some(top) = importance.first() {
        info!(
            method = %attribution.method,
            top_feature = %top.feature,
            mean_abs_shap = top.mean_abs_shap,
            "Explanations written"
        );
    }

    Ok(ExplainOutcome {
        method: attribution.method.clone(),
        attribution,
        importance,
        local,
    })
}

/// Score the test table with the persisted model and write the export
pub fn run_export(config: &AppConfig) -> Result<ScoredDataset> {
    let paths = &config.paths;
    let artifact = ModelArtifact::load(&paths.model_artifact)?;
    let x_test = read_feature_table(&paths.test_features).context("Failed to load test features")?;
    let y_test = read_labels(&paths.test_labels).context("Failed to load test labels")?;
    check_aligned(&x_test, &y_test)?;
    artifact.check_columns(&x_test)?;

    let dataset = ScoringExporter::new(&config.export).score(artifact.model(), &x_test, Some(&y_test))?;
    dataset.write(&paths.scored_export)?;
    Ok(dataset)
}

/// Run one stage, or every stage in order, and return the run statistics
pub fn run(config: &AppConfig, stage: Stage) -> Result<PipelineMetrics> {
    let mut metrics = PipelineMetrics::new();
    info!(stage = %stage, "Starting fraud scoring pipeline");

    if matches!(stage, Stage::Train | Stage::All) {
        let outcome = metrics.time_stage("train", || run_training(config))?;
        info!(model = %outcome.artifact.model_name, "Training stage complete");
    }
    if matches!(stage, Stage::Explain | Stage::All) {
        let outcome = metrics.time_stage("explain", || run_explain(config))?;
        info!(method = %outcome.method, "Explain stage complete");
    }
    if matches!(stage, Stage::Export | Stage::All) {
        let dataset = metrics.time_stage("export", || run_export(config))?;
        metrics.record_export(&dataset.records);
    }

    Ok(metrics)
}
