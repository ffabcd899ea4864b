//! End-to-end runs over the file handoff in a temporary directory

use fraud_scoring_pipeline::config::AppConfig;
use fraud_scoring_pipeline::dataset::{write_feature_table, write_labels};
use fraud_scoring_pipeline::explain::LocalExplanation;
use fraud_scoring_pipeline::models::ModelArtifact;
use fraud_scoring_pipeline::pipeline::{self, Stage};
use fraud_scoring_pipeline::{FeatureTable, LabelVector};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

const COLUMNS: [&str; 6] = ["time", "amount", "v1", "v2", "v3", "v4"];

/// Rows where `v1 + v2` is large are mostly fraud
fn synthetic_split(n: usize, seed: u64) -> (FeatureTable, LabelVector) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut values = Array2::<f64>::zeros((n, COLUMNS.len()));
    let mut labels = Vec::with_capacity(n);

    for i in 0..n {
        let v1: f64 = rng.gen_range(-2.0..2.0);
        let v2: f64 = rng.gen_range(-2.0..2.0);
        let noise: f64 = rng.gen_range(-0.5..0.5);
        values[[i, 0]] = i as f64 * 10.0;
        values[[i, 1]] = rng.gen_range(1.0..500.0);
        values[[i, 2]] = v1;
        values[[i, 3]] = v2;
        values[[i, 4]] = rng.gen_range(-1.0..1.0);
        values[[i, 5]] = rng.gen_range(-1.0..1.0);
        labels.push(u8::from(v1 + v2 + noise > 2.0));
    }
    // Both classes must be present in every split
    labels[0] = 1;
    labels[1] = 0;

    let columns = COLUMNS.iter().map(|c| c.to_string()).collect();
    (
        FeatureTable::new(columns, values).unwrap(),
        LabelVector::new(labels).unwrap(),
    )
}

fn config_in(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    let paths = &mut config.paths;
    paths.train_features = dir.join("data/processed/X_train.csv");
    paths.test_features = dir.join("data/processed/X_test.csv");
    paths.train_labels = dir.join("data/processed/y_train.csv");
    paths.test_labels = dir.join("data/processed/y_test.csv");
    paths.model_artifact = dir.join("models/fraud_model.bin");
    paths.comparison_report = dir.join("models/model_comparison.csv");
    paths.importance_report = dir.join("reports/shap/shap_feature_importance.csv");
    paths.attribution_values = dir.join("reports/shap/shap_values.csv");
    paths.local_explanation = dir.join("reports/shap/shap_local_example.json");
    paths.scored_export = dir.join("data/powerbi/fraud_powerbi_dataset.csv");

    config.training.forest.n_estimators = 10;
    config.training.forest.max_depth = 4;
    config.training.boosting.n_estimators = 10;
    config.training.boosting.max_depth = 3;
    config.explain.background_size = 20;
    config.explain.n_samples = 10;
    config
}

fn write_inputs(config: &AppConfig) {
    let (x_train, y_train) = synthetic_split(240, 1);
    let (x_test, y_test) = synthetic_split(80, 2);
    write_feature_table(&config.paths.train_features, &x_train).unwrap();
    write_labels(&config.paths.train_labels, "class", &y_train).unwrap();
    write_feature_table(&config.paths.test_features, &x_test).unwrap();
    write_labels(&config.paths.test_labels, "class", &y_test).unwrap();
}

#[test]
fn test_full_run_with_boosting() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.training.enable_boosting = Some(true);
    write_inputs(&config);

    let metrics = pipeline::run(&config, Stage::All).unwrap();
    assert_eq!(metrics.stages().len(), 3);
    assert_eq!(metrics.records_scored(), 80);

    let artifact = ModelArtifact::load(&config.paths.model_artifact).unwrap();
    assert_eq!(artifact.model_name, "XGBoost");
    assert_eq!(artifact.feature_names, COLUMNS.to_vec());

    let comparison = std::fs::read_to_string(&config.paths.comparison_report).unwrap();
    let lines: Vec<_> = comparison.lines().collect();
    assert_eq!(lines[0], "model,precision,recall,f1,roc_auc");
    assert_eq!(lines.len(), 4);
    assert!(lines[1].starts_with("Logistic Regression,"));
    assert!(lines[2].starts_with("Random Forest,"));
    assert!(lines[3].starts_with("XGBoost,"));

    let mut importance = csv::Reader::from_path(&config.paths.importance_report).unwrap();
    let scores: Vec<f64> = importance
        .records()
        .map(|r| r.unwrap()[1].parse().unwrap())
        .collect();
    assert_eq!(scores.len(), COLUMNS.len());
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));

    let mut matrix = csv::Reader::from_path(&config.paths.attribution_values).unwrap();
    let matrix_header: Vec<&str> = matrix.headers().unwrap().iter().collect();
    assert_eq!(matrix_header, COLUMNS.to_vec());
    assert_eq!(matrix.records().count(), 80);

    let local: LocalExplanation = serde_json::from_str(
        &std::fs::read_to_string(&config.paths.local_explanation).unwrap(),
    )
    .unwrap();
    assert_eq!(local.method, "tree_shap");
    assert_eq!(local.contributions.len(), COLUMNS.len());

    let mut export = csv::Reader::from_path(&config.paths.scored_export).unwrap();
    let header: Vec<String> = export.headers().unwrap().iter().map(String::from).collect();
    assert_eq!(
        header,
        vec![
            "customer_id",
            "merchant_category",
            "time",
            "time_bucket",
            "amount",
            "fraud_probability",
            "risk_bucket",
            "fraud_flag",
            "fraud_label",
            "actual_class",
            "v1",
            "v2",
            "v3",
            "v4"
        ]
    );
    let rows: Vec<csv::StringRecord> = export.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 80);
    for row in &rows {
        let probability: f64 = row[5].parse().unwrap();
        assert!((0.0..=1.0).contains(&probability));
        assert_eq!(&row[7] == "1", probability > 0.85);
    }
    assert_eq!(&rows[0][3], "T1");
    assert_eq!(&rows[79][3], "T10");
}

#[test]
fn test_forest_selected_when_boosting_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.training.enable_boosting = Some(false);
    write_inputs(&config);

    let outcome = pipeline::run_training(&config).unwrap();
    assert_eq!(outcome.artifact.model_name, "Random Forest");
    assert_eq!(outcome.results.len(), 2);
    for result in &outcome.results {
        for metric in [result.precision, result.recall, result.f1, result.roc_auc] {
            assert!((0.0..=1.0).contains(&metric));
        }
    }

    let explained = pipeline::run_explain(&config).unwrap();
    assert_eq!(explained.method, "tree_shap");
    let values = explained.attribution.positive_class_values().unwrap();
    assert_eq!(values.dim(), (80, COLUMNS.len()));
    assert_eq!(explained.importance.len(), COLUMNS.len());
}

#[test]
fn test_export_is_reproducible() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.training.enable_boosting = Some(false);
    write_inputs(&config);
    pipeline::run(&config, Stage::Train).unwrap();

    pipeline::run(&config, Stage::Export).unwrap();
    let first = std::fs::read_to_string(&config.paths.scored_export).unwrap();
    pipeline::run(&config, Stage::Export).unwrap();
    let second = std::fs::read_to_string(&config.paths.scored_export).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_schema_mismatch_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    write_inputs(&config);

    let (x_test, _) = synthetic_split(80, 2);
    let mut reordered: Vec<String> = x_test.columns().to_vec();
    reordered.swap(2, 3);
    let shuffled = FeatureTable::new(reordered, x_test.values().to_owned()).unwrap();
    write_feature_table(&config.paths.test_features, &shuffled).unwrap();

    assert!(pipeline::run_training(&config).is_err());
    assert!(!config.paths.model_artifact.exists());
}

#[test]
fn test_failed_comparison_report_leaves_no_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.training.enable_boosting = Some(false);
    write_inputs(&config);
    // A directory where the report file should go makes the write fail
    std::fs::create_dir_all(&config.paths.comparison_report).unwrap();

    assert!(pipeline::run_training(&config).is_err());
    assert!(!config.paths.model_artifact.exists());
}
