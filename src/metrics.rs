//! Run statistics for the batch pipeline: stage timings and the score
//! distribution of the scored export.

use crate::types::scored::{RiskBucket, ScoredRecord};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::info;

/// Collects per-stage timings and export statistics for one run
pub struct PipelineMetrics {
    /// Completed stages, in run order
    stages: Vec<(String, Duration)>,
    /// Records per risk bucket in the export
    records_by_bucket: BTreeMap<RiskBucket, u64>,
    /// Fraud probability histogram, ten equal-width buckets over [0, 1]
    score_buckets: [u64; 10],
    records_scored: u64,
    records_flagged: u64,
    start_time: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            stages: Vec::new(),
            records_by_bucket: BTreeMap::new(),
            score_buckets: [0; 10],
            records_scored: 0,
            records_flagged: 0,
            start_time: Instant::now(),
        }
    }

    /// Time a stage closure and record its duration
    pub fn time_stage<T, F>(&mut self, name: &str, stage: F) -> T
    where
        F: FnOnce() -> T,
    {
        let start = Instant::now();
        let output = stage();
        let elapsed = start.elapsed();
        info!(stage = name, elapsed_ms = elapsed.as_millis() as u64, "Stage finished");
        self.stages.push((name.to_string(), elapsed));
        output
    }

    /// Record the scored export
    pub fn record_export(&mut self, records: &[ScoredRecord]) {
        for record in records {
            self.records_scored += 1;
            if record.fraud_flag {
                self.records_flagged += 1;
            }
            *self.records_by_bucket.entry(record.risk_bucket).or_insert(0) += 1;

            let bucket = (record.fraud_probability * 10.0).min(9.0) as usize;
            self.score_buckets[bucket] += 1;
        }
    }

    pub fn stages(&self) -> &[(String, Duration)] {
        &self.stages
    }

    pub fn records_scored(&self) -> u64 {
        self.records_scored
    }

    pub fn records_flagged(&self) -> u64 {
        self.records_flagged
    }

    pub fn records_in_bucket(&self, bucket: RiskBucket) -> u64 {
        self.records_by_bucket.get(&bucket).copied().unwrap_or(0)
    }

    pub fn score_distribution(&self) -> [u64; 10] {
        self.score_buckets
    }

    /// Percentage of scored records that were flagged
    pub fn flag_rate(&self) -> f64 {
        if self.records_scored > 0 {
            (self.records_flagged as f64 / self.records_scored as f64) * 100.0
        } else {
            0.0
        }
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let total_elapsed = self.start_time.elapsed().as_secs_f64();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║            FRAUD SCORING PIPELINE - RUN SUMMARY              ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        for (stage, elapsed) in &self.stages {
            info!("║ Stage {:10}: {:>10.2}s                                  ║", stage, elapsed.as_secs_f64());
        }
        info!("║ Total:            {:>10.2}s                                  ║", total_elapsed);

        if self.records_scored == 0 {
            info!("╚══════════════════════════════════════════════════════════════╝");
            return;
        }

        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Records Scored: {:>8}  │  Flagged: {:>8} ({:>5.1}%)       ║",
            self.records_scored,
            self.records_flagged,
            self.flag_rate()
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Records by Risk Bucket:                                      ║");
        for (bucket, count) in &self.records_by_bucket {
            let pct = (*count as f64 / self.records_scored as f64) * 100.0;
            info!("║   {:10}: {:>8} ({:>5.1}%)                              ║", bucket.as_str(), count, pct);
        }
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Fraud Probability Distribution:                              ║");
        for (i, &count) in self.score_buckets.iter().enumerate() {
            let pct = (count as f64 / self.records_scored as f64) * 100.0;
            let bar_len = (pct / 2.0) as usize;
            let bar: String = "█".repeat(bar_len.min(20));
            info!(
                "║   {:.1}-{:.1}: {:>8} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}
