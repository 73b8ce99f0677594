//! Final evaluation of a fitted classifier on the untouched holdout rows.

use tracing::{info, instrument};

use crate::error::EvalError;
use crate::metrics::{MetricsReport, compute_metrics};
use crate::pipeline::{Classifier, check_labels};
use crate::table::Table;

/// Holdout probabilities and the metrics computed from them.
#[derive(Debug, Clone, PartialEq)]
pub struct HoldoutEvaluation {
    /// Positive-class probability per holdout row.
    pub probabilities: Vec<f64>,
    /// Metrics at the chosen threshold.
    pub metrics: MetricsReport,
}

/// Score `model` on the holdout table and report metrics at `threshold`.
///
/// # Errors
///
/// Propagates prediction and validation failures as [`EvalError`].
#[instrument(skip_all, fields(n_rows = table.n_rows(), threshold = threshold))]
pub fn evaluate_holdout<C: Classifier>(
    model: &C,
    table: &Table,
    labels: &[u8],
    threshold: f64,
    k: Option<usize>,
) -> Result<HoldoutEvaluation, EvalError> {
    check_labels(labels, table.n_rows())?;
    let probabilities = model.predict_proba(table)?;
    let metrics = compute_metrics(labels, &probabilities, threshold, k)?;
    info!(
        pr_auc = metrics.pr_auc,
        roc_auc = metrics.roc_auc,
        brier = metrics.brier,
        tp = metrics.confusion.tp,
        fp = metrics.confusion.fp,
        "holdout evaluated"
    );
    Ok(HoldoutEvaluation {
        probabilities,
        metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{clustered, stub_pipeline};

    #[test]
    fn holdout_metrics_use_given_threshold() {
        let (train, train_labels) = clustered(100, 20);
        let (test, test_labels) = clustered(50, 10);
        let mut model = stub_pipeline();
        model.fit(&train, &train_labels).unwrap();

        let eval = evaluate_holdout(&model, &test, &test_labels, 0.3, Some(5)).unwrap();
        assert_eq!(eval.probabilities.len(), 50);
        assert_eq!(eval.metrics.threshold, 0.3);
        assert_eq!(eval.metrics.confusion.total(), 50);
        assert_eq!(eval.metrics.recall_at_k, Some(0.5));
    }

    #[test]
    fn unfitted_stub_still_checks_labels() {
        let (test, _) = clustered(20, 4);
        let err = evaluate_holdout(&stub_pipeline(), &test, &[0, 1], 0.5, None).unwrap_err();
        assert!(matches!(err, EvalError::LengthMismatch { .. }));
    }
}
