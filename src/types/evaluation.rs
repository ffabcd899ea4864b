//! Per-candidate evaluation results

use serde::{Deserialize, Serialize};

/// Test-set metrics of one fitted candidate.
///
/// Precision, recall and F1 are reported for the fraud class only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Candidate display name
    pub model: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Threshold-independent ranking quality
    pub roc_auc: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluation_result_serialization() {
        let result = EvaluationResult {
            model: "Random Forest".to_string(),
            precision: 0.9,
            recall: 0.8,
            f1: 0.847,
            roc_auc: 0.97,
        };

        let json = serde_json::to_string(&result).unwrap();
        let deserialized: EvaluationResult = serde_json::from_str(&json).unwrap();

        assert_eq!(result, deserialized);
    }
}
