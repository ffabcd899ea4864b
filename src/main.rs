//! Fraud Scoring Pipeline - Main Entry Point
//!
//! Usage: `fraud-pipeline [train|explain|export|all] [config-path]`
//!
//! Runs the requested stage (default `all`) against the tables and artifacts
//! named in the configuration file.

use anyhow::Result;
use fraud_scoring_pipeline::config::{AppConfig, LoggingConfig, DEFAULT_CONFIG_PATH};
use fraud_scoring_pipeline::pipeline::{self, Stage};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let stage: Stage = match args.next() {
        Some(arg) => arg.parse()?,
        None => Stage::All,
    };
    let config_path = args.next().unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());

    let config = AppConfig::load_or_default(&config_path)?;
    init_logging(&config.logging)?;

    info!(stage = %stage, config = %config_path, "Starting Fraud Scoring Pipeline");
    info!(
        seed = config.training.seed,
        forest_trees = config.training.forest.n_estimators,
        boosting_rounds = config.training.boosting.n_estimators,
        "Configuration loaded successfully"
    );

    match pipeline::run(&config, stage) {
        Ok(metrics) => {
            metrics.print_summary();
            Ok(())
        }
        Err(e) => {
            error!(error = format!("{:#}", e), "Pipeline failed");
            Err(e)
        }
    }
}

fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive(format!("fraud_scoring_pipeline={}", logging.level).parse()?)
        .add_directive(format!("fraud_pipeline={}", logging.level).parse()?);

    if logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}
