//! Scored dataset export for business analytics.
//!
//! Scores a feature table with the persisted model and derives the
//! business-facing fields: risk bucket, fraud flag and label, time bucket,
//! plus seeded synthetic customer and merchant dimensions for drill-down.

use crate::config::ExportConfig;
use crate::dataset::{check_aligned, create_parent_dir};
use crate::models::Classifier;
use crate::types::scored::{
    FraudLabel, MerchantCategory, RiskBucket, ScoredRecord, TimeBucket, FRAUD_FLAG_THRESHOLD,
};
use crate::types::table::{FeatureTable, LabelVector};
use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use thiserror::Error;
use tracing::info;

pub const TIME_COLUMN: &str = "time";
pub const AMOUNT_COLUMN: &str = "amount";

/// Columns whose name starts with this prefix are carried into the export
pub const COMPONENT_PREFIX: &str = "v";

/// Synthetic customer ids are drawn from this range
pub const CUSTOMER_ID_RANGE: std::ops::Range<u32> = 10_000..20_000;

/// Problems that make a table unscorable
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("row {row}: fraud probability {value} is outside [0, 1]")]
    ProbabilityOutOfRange { row: usize, value: f64 },

    #[error("required column '{0}' is missing")]
    MissingColumn(&'static str),

    #[error("row {row}: time value {value} cannot be bucketed")]
    InvalidTime { row: usize, value: f64 },

    #[error("{probabilities} probabilities for {rows} rows")]
    LengthMismatch { probabilities: usize, rows: usize },
}

/// Business-rule fields derived from one fraud probability
pub fn classify_probability(row: usize, probability: f64) -> Result<(RiskBucket, bool), ScoringError> {
    let bucket = RiskBucket::from_probability(probability).ok_or(
        ScoringError::ProbabilityOutOfRange {
            row,
            value: probability,
        },
    )?;
    Ok((bucket, probability > FRAUD_FLAG_THRESHOLD))
}

/// Assign each value to one of `n_bins` equal-width, right-closed bins.
///
/// Bin edges span `[min, max]`; the lowest edge is pushed down by 0.1% of
/// the range so the minimum lands in the first bin. A constant column is
/// widened by 0.1% of its value (0.001 when the value is zero) on both
/// sides.
pub fn time_buckets(values: &[f64], n_bins: u8) -> Result<Vec<TimeBucket>, ScoringError> {
    if let Some((row, &value)) = values.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(ScoringError::InvalidTime { row, value });
    }
    if values.is_empty() {
        return Ok(Vec::new());
    }

    let n_bins = n_bins.max(1);
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let (low, high) = if min == max {
        let pad = if min != 0.0 { 0.001 * min.abs() } else { 0.001 };
        (min - pad, max + pad)
    } else {
        (min, max)
    };

    let n = usize::from(n_bins);
    let width = (high - low) / n as f64;
    let mut edges: Vec<f64> = (0..=n).map(|i| low + width * i as f64).collect();
    edges[n] = high;
    if min != max {
        edges[0] -= (max - min) * 0.001;
    }

    values
        .iter()
        .enumerate()
        .map(|(row, &value)| {
            // First upper edge at or above the value; the last edge is max
            let bin = edges[1..]
                .iter()
                .position(|&edge| value <= edge)
                .ok_or(ScoringError::InvalidTime { row, value })?;
            Ok(TimeBucket(bin as u8 + 1))
        })
        .collect()
}

/// Seeded customer ids and merchant categories for `n` rows.
///
/// All ids are drawn before any category, so the sequence for a given seed
/// and length never changes.
pub fn synthetic_dimensions(n: usize, seed: u64) -> (Vec<u32>, Vec<MerchantCategory>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let customer_ids = (0..n).map(|_| rng.gen_range(CUSTOMER_ID_RANGE)).collect();
    let categories = (0..n)
        .map(|_| MerchantCategory::ALL[rng.gen_range(0..MerchantCategory::ALL.len())])
        .collect();
    (customer_ids, categories)
}

/// Scored records plus the header they are written under
#[derive(Debug, Clone)]
pub struct ScoredDataset {
    pub header: Vec<String>,
    pub records: Vec<ScoredRecord>,
}

impl ScoredDataset {
    pub fn write(&self, path: &Path) -> Result<()> {
        create_parent_dir(path)?;
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create scored export {}", path.display()))?;
        writer.write_record(&self.header)?;
        for record in &self.records {
            writer.write_record(record.to_fields())?;
        }
        writer.flush()?;

        info!(
            path = %path.display(),
            rows = self.records.len(),
            columns = self.header.len(),
            "Scored dataset written"
        );
        Ok(())
    }

    /// Number of flagged records
    pub fn flagged(&self) -> usize {
        self.records.iter().filter(|r| r.fraud_flag).count()
    }
}

/// Turns model output into the analytics export
#[derive(Debug, Clone)]
pub struct ScoringExporter {
    config: ExportConfig,
}

impl ScoringExporter {
    pub fn new(config: &ExportConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// Score `table` with `model`; `labels`, when given, become `actual_class`
    pub fn score(
        &self,
        model: &dyn Classifier,
        table: &FeatureTable,
        labels: Option<&LabelVector>,
    ) -> Result<ScoredDataset> {
        let probabilities = model
            .positive_probability(table.values())
            .context("Failed to score export table")?;
        self.assemble(table, &probabilities.to_vec(), labels)
    }

    /// Build records from precomputed fraud probabilities
    pub fn assemble(
        &self,
        table: &FeatureTable,
        probabilities: &[f64],
        labels: Option<&LabelVector>,
    ) -> Result<ScoredDataset> {
        if probabilities.len() != table.n_rows() {
            return Err(ScoringError::LengthMismatch {
                probabilities: probabilities.len(),
                rows: table.n_rows(),
            }
            .into());
        }
        if let Some(labels) = labels {
            check_aligned(table, labels)?;
        }

        let time = table
            .column(TIME_COLUMN)
            .ok_or(ScoringError::MissingColumn(TIME_COLUMN))?
            .to_vec();
        let amount = table
            .column(AMOUNT_COLUMN)
            .ok_or(ScoringError::MissingColumn(AMOUNT_COLUMN))?;
        let component_indices: Vec<usize> = table
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, name)| name.starts_with(COMPONENT_PREFIX))
            .map(|(idx, _)| idx)
            .collect();

        let buckets = time_buckets(&time, self.config.time_buckets)?;
        let (customer_ids, categories) = synthetic_dimensions(table.n_rows(), self.config.seed);

        let mut records = Vec::with_capacity(table.n_rows());
        for row in 0..table.n_rows() {
            let probability = probabilities[row];
            let (risk_bucket, fraud_flag) = classify_probability(row, probability)?;
            let features = table.row(row);

            records.push(ScoredRecord {
                customer_id: customer_ids[row],
                merchant_category: categories[row],
                time: time[row],
                time_bucket: buckets[row],
                amount: amount[row],
                fraud_probability: probability,
                risk_bucket,
                fraud_flag,
                fraud_label: FraudLabel::from_flag(fraud_flag),
                actual_class: labels.map(|l| l.as_slice()[row]),
                components: component_indices.iter().map(|&j| features[j]).collect(),
            });
        }

        let mut header: Vec<String> = [
            "customer_id",
            "merchant_category",
            "time",
            "time_bucket",
            "amount",
            "fraud_probability",
            "risk_bucket",
            "fraud_flag",
            "fraud_label",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        if labels.is_some() {
            header.push("actual_class".to_string());
        }
        header.extend(component_indices.iter().map(|&j| table.columns()[j].clone()));

        let dataset = ScoredDataset { header, records };
        info!(
            rows = dataset.records.len(),
            flagged = dataset.flagged(),
            "Scored export assembled"
        );
        Ok(dataset)
    }
}
