//! Test-set metrics for fitted candidates

use crate::dataset::check_aligned;
use crate::models::Classifier;
use crate::types::table::{FeatureTable, LabelVector, FRAUD};
use crate::types::EvaluationResult;
use anyhow::{bail, Context, Result};
use tracing::info;

/// Fraud-class precision, recall and F1.
///
/// Each metric is 0.0 when its denominator is zero.
pub fn binary_scores(y_true: &[u8], y_pred: &[u8]) -> (f64, f64, f64) {
    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut fn_ = 0usize;
    for (&actual, &predicted) in y_true.iter().zip(y_pred) {
        match (actual == FRAUD, predicted == FRAUD) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (true, false) => fn_ += 1,
            (false, false) => {}
        }
    }

    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };
    (precision, recall, f1)
}

/// Area under the ROC curve by the Mann-Whitney rank statistic.
///
/// Tied scores share their average rank. Errors when `y_true` holds a
/// single class, where the curve is undefined.
pub fn roc_auc(y_true: &[u8], scores: &[f64]) -> Result<f64> {
    if y_true.len() != scores.len() {
        bail!("{} labels but {} scores", y_true.len(), scores.len());
    }
    let positives = y_true.iter().filter(|&&l| l == FRAUD).count();
    let negatives = y_true.len() - positives;
    if positives == 0 || negatives == 0 {
        bail!("ROC-AUC is undefined when only one class is present");
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // One-based ranks start+1..=end share their mean
        let rank = (start + end + 1) as f64 / 2.0;
        for &idx in &order[start..end] {
            if y_true[idx] == FRAUD {
                positive_rank_sum += rank;
            }
        }
        start = end;
    }

    let n_pos = positives as f64;
    let n_neg = negatives as f64;
    Ok((positive_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

/// Scores fitted candidates on the held-out split
#[derive(Debug, Default, Clone, Copy)]
pub struct Evaluator;

impl Evaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(
        &self,
        name: &str,
        model: &dyn Classifier,
        x_test: &FeatureTable,
        y_test: &LabelVector,
    ) -> Result<EvaluationResult> {
        check_aligned(x_test, y_test).context("Test table and labels are not aligned")?;

        let probabilities = model
            .positive_probability(x_test.values())
            .with_context(|| format!("Failed to score test set with {name}"))?;
        let predictions = model.predict(x_test.values())?;

        let (precision, recall, f1) = binary_scores(y_test.as_slice(), &predictions);
        let scores = probabilities.to_vec();
        let roc_auc = roc_auc(y_test.as_slice(), &scores)
            .with_context(|| format!("Failed to compute ROC-AUC for {name}"))?;

        Ok(EvaluationResult {
            model: name.to_string(),
            precision,
            recall,
            f1,
            roc_auc,
        })
    }
}

/// Log the comparison table, one line per candidate
pub fn log_comparison(results: &[EvaluationResult]) {
    for result in results {
        info!(
            model = %result.model,
            precision = result.precision,
            recall = result.recall,
            f1 = result.f1,
            roc_auc = result.roc_auc,
            "Candidate evaluation"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LogisticRegression;
    use ndarray::array;

    #[test]
    fn test_binary_scores() {
        let y_true = [1, 1, 0, 0, 1];
        let y_pred = [1, 0, 1, 0, 1];
        let (precision, recall, f1) = binary_scores(&y_true, &y_pred);
        assert!((precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((recall - 2.0 / 3.0).abs() < 1e-12);
        assert!((f1 - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_binary_scores_zero_division() {
        let (precision, recall, f1) = binary_scores(&[1, 0], &[0, 0]);
        assert_eq!((precision, recall, f1), (0.0, 0.0, 0.0));
    }

    #[test]
    fn test_roc_auc_perfect_and_inverted() {
        let labels = [0, 0, 1, 1];
        assert_eq!(roc_auc(&labels, &[0.1, 0.2, 0.8, 0.9]).unwrap(), 1.0);
        assert_eq!(roc_auc(&labels, &[0.9, 0.8, 0.2, 0.1]).unwrap(), 0.0);
    }

    #[test]
    fn test_roc_auc_ties_use_average_rank() {
        let labels = [0, 1, 0, 1];
        assert_eq!(roc_auc(&labels, &[0.5, 0.5, 0.5, 0.5]).unwrap(), 0.5);
        // One of four pairs tied, three correctly ordered
        assert_eq!(roc_auc(&labels, &[0.1, 0.4, 0.4, 0.9]).unwrap(), 0.875);
    }

    #[test]
    fn test_roc_auc_single_class_is_error() {
        assert!(roc_auc(&[1, 1], &[0.2, 0.9]).is_err());
    }

    #[test]
    fn test_evaluate_metrics_in_unit_interval() {
        let model = LogisticRegression::from_parameters(array![2.0], -1.0);
        let x = FeatureTable::new(
            vec!["amount".into()],
            array![[0.0], [0.2], [0.4], [0.6], [0.8], [1.0]],
        )
        .unwrap();
        let y = LabelVector::new(vec![0, 0, 1, 0, 1, 1]).unwrap();

        let result = Evaluator::new()
            .evaluate("Logistic Regression", &model, &x, &y)
            .unwrap();

        assert_eq!(result.model, "Logistic Regression");
        for metric in [result.precision, result.recall, result.f1, result.roc_auc] {
            assert!((0.0..=1.0).contains(&metric));
        }
        // Predictions: p > 0.5 for amount > 0.5
        assert!((result.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((result.recall - 2.0 / 3.0).abs() < 1e-12);
    }
}
