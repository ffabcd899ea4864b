//! Scored transaction records produced for downstream analytics

use serde::{Deserialize, Serialize};
use std::fmt;

/// Probability above which a transaction is flagged as fraud (strict)
pub const FRAUD_FLAG_THRESHOLD: f64 = 0.85;

/// Cut points of the risk buckets: Low | Medium | High | Critical
pub const RISK_CUT_POINTS: [f64; 5] = [0.0, 0.30, 0.60, 0.85, 1.00];

/// Ordinal risk bucket derived from the fraud probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskBucket {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskBucket {
    /// Bucket a probability.
    ///
    /// The first cut point is left-closed and every other cut point is
    /// right-closed: `[0, 0.30)`, `[0.30, 0.60]`, `(0.60, 0.85]`, `(0.85, 1]`.
    /// Returns `None` for values outside `[0, 1]` (including NaN).
    pub fn from_probability(probability: f64) -> Option<Self> {
        let [lowest, low, medium, high, highest] = RISK_CUT_POINTS;
        if !(lowest..=highest).contains(&probability) {
            return None;
        }

        let bucket = if probability < low {
            RiskBucket::Low
        } else if probability <= medium {
            RiskBucket::Medium
        } else if probability <= high {
            RiskBucket::High
        } else {
            RiskBucket::Critical
        };
        Some(bucket)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskBucket::Low => "Low",
            RiskBucket::Medium => "Medium",
            RiskBucket::High => "High",
            RiskBucket::Critical => "Critical",
        }
    }
}

impl fmt::Display for RiskBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Business-facing label of the fraud decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FraudLabel {
    Legitimate,
    Fraud,
}

impl FraudLabel {
    pub fn from_flag(flag: bool) -> Self {
        if flag {
            FraudLabel::Fraud
        } else {
            FraudLabel::Legitimate
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FraudLabel::Legitimate => "Legitimate",
            FraudLabel::Fraud => "Fraud",
        }
    }
}

impl fmt::Display for FraudLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Simulated merchant category attached to exported records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MerchantCategory {
    ECommerce,
    Pos,
    Atm,
    Travel,
    Food,
}

impl MerchantCategory {
    /// Every category, in draw order
    pub const ALL: [MerchantCategory; 5] = [
        MerchantCategory::ECommerce,
        MerchantCategory::Pos,
        MerchantCategory::Atm,
        MerchantCategory::Travel,
        MerchantCategory::Food,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MerchantCategory::ECommerce => "E-commerce",
            MerchantCategory::Pos => "POS",
            MerchantCategory::Atm => "ATM",
            MerchantCategory::Travel => "Travel",
            MerchantCategory::Food => "Food",
        }
    }
}

impl fmt::Display for MerchantCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One-based ordinal time bin, rendered as `T1`..`Tn`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeBucket(pub u8);

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.0)
    }
}

/// A transaction row enriched with model output and business fields
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRecord {
    /// Simulated customer identifier
    pub customer_id: u32,

    /// Simulated merchant category
    pub merchant_category: MerchantCategory,

    /// Raw `time` feature
    pub time: f64,

    /// Equal-width bin of `time`
    pub time_bucket: TimeBucket,

    /// Raw `amount` feature
    pub amount: f64,

    /// Positive-class probability from the selected model
    pub fraud_probability: f64,

    /// Ordinal risk bucket
    pub risk_bucket: RiskBucket,

    /// `fraud_probability > 0.85`
    pub fraud_flag: bool,

    /// Label derived from the flag
    pub fraud_label: FraudLabel,

    /// True label when the export was given one
    pub actual_class: Option<u8>,

    /// Anonymized principal-component features, in table order
    pub components: Vec<f64>,
}

impl ScoredRecord {
    /// CSV fields in export column order
    pub fn to_fields(&self) -> Vec<String> {
        let mut fields = vec![
            self.customer_id.to_string(),
            self.merchant_category.to_string(),
            self.time.to_string(),
            self.time_bucket.to_string(),
            self.amount.to_string(),
            self.fraud_probability.to_string(),
            self.risk_bucket.to_string(),
            u8::from(self.fraud_flag).to_string(),
            self.fraud_label.to_string(),
        ];
        if let Some(actual) = self.actual_class {
            fields.push(actual.to_string());
        }
        fields.extend(self.components.iter().map(|v| v.to_string()));
        fields
    }
}
