//! Type definitions for the fraud scoring pipeline

pub mod evaluation;
pub mod scored;
pub mod table;

pub use evaluation::EvaluationResult;
pub use scored::{FraudLabel, MerchantCategory, RiskBucket, ScoredRecord, TimeBucket};
pub use table::{FeatureTable, LabelVector};
