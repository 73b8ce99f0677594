//! Ranking and decision metrics for binary probabilistic predictions.
//!
//! The scalar scorers (`roc_auc`, `pr_auc`, `average_precision`, `brier`)
//! take pre-validated inputs of equal length and are cheap enough to run
//! inside bootstrap loops. [`compute_metrics`] validates its inputs and
//! assembles the full [`MetricsReport`].
//!
//! When only one class is present, ROC-AUC is reported as 0.5 and PR-AUC /
//! average precision as 0.0.


use crate::error::EvalError;
use crate::pipeline::{check_labels, check_probabilities};

/// Signature shared by the scalar scorers.
pub type Scorer = fn(&[u8], &[f64]) -> f64;

/// Binary confusion counts at a fixed threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Confusion {
    /// Negatives predicted negative.
    pub tn: usize,
    /// Negatives predicted positive.
    pub fp: usize,
    /// Positives predicted negative.
    #[serde(rename = "fn")]
    pub fn_: usize,
    /// Positives predicted positive.
    pub tp: usize,
}

impl Confusion {
    /// Count outcomes, predicting positive when `probability >= threshold`.
    #[must_use]
    pub fn at_threshold(labels: &[u8], proba: &[f64], threshold: f64) -> Self {
        let mut c = Self::default();
        for (&y, &p) in labels.iter().zip(proba) {
            match (y == 1, p >= threshold) {
                (false, false) => c.tn += 1,
                (false, true) => c.fp += 1,
                (true, false) => c.fn_ += 1,
                (true, true) => c.tp += 1,
            }
        }
        c
    }

    /// Total number of samples.
    #[must_use]
    pub fn total(&self) -> usize {
        self.tn + self.fp + self.fn_ + self.tp
    }

    /// Proportion of correct predictions. 0.0 when empty.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            (self.tp + self.tn) as f64 / total as f64
        }
    }

    /// F1 of the positive class: 2TP / (2TP + FP + FN). 0.0 when undefined.
    #[must_use]
    pub fn f1(&self) -> f64 {
        let denom = 2 * self.tp + self.fp + self.fn_;
        if denom == 0 {
            0.0
        } else {
            (2 * self.tp) as f64 / denom as f64
        }
    }
}

/// Metrics of one set of predictions at one decision threshold.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MetricsReport {
    /// Area under the ROC curve.
    pub roc_auc: f64,
    /// Trapezoidal area under the precision-recall curve.
    pub pr_auc: f64,
    /// Mean squared error between probability and label.
    pub brier: f64,
    /// Accuracy at `threshold`.
    pub accuracy: f64,
    /// F1 of the positive class at `threshold`.
    pub f1_at_thr: f64,
    /// Share of all positives found in the top-k; absent when k was not requested.
    pub recall_at_k: Option<f64>,
    /// Confusion counts at `threshold`.
    #[serde(flatten)]
    pub confusion: Confusion,
    /// Decision threshold the threshold-dependent metrics were computed at.
    pub threshold: f64,
}

/// Compute the full metrics report.
///
/// `threshold` is inclusive; `k` of `None` or `Some(0)` leaves `recall_at_k` absent.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`EvalError::EmptyDataset`] | zero labels |
/// | [`EvalError::LengthMismatch`] | `proba.len() != labels.len()` |
/// | [`EvalError::InvalidLabel`] | a label is not 0/1 |
/// | [`EvalError::InvalidProbability`] | a probability is outside [0, 1] |
pub fn compute_metrics(
    labels: &[u8],
    proba: &[f64],
    threshold: f64,
    k: Option<usize>,
) -> Result<MetricsReport, EvalError> {
    check_inputs(labels, proba)?;
    let confusion = Confusion::at_threshold(labels, proba, threshold);
    Ok(MetricsReport {
        roc_auc: roc_auc(labels, proba),
        pr_auc: pr_auc(labels, proba),
        brier: brier(labels, proba),
        accuracy: confusion.accuracy(),
        f1_at_thr: confusion.f1(),
        recall_at_k: recall_at_k(labels, proba, k),
        confusion,
        threshold,
    })
}

pub(crate) fn check_inputs(labels: &[u8], proba: &[f64]) -> Result<(), EvalError> {
    if labels.is_empty() {
        return Err(EvalError::EmptyDataset);
    }
    if proba.len() != labels.len() {
        return Err(EvalError::LengthMismatch {
            what: "probabilities",
            expected: labels.len(),
            got: proba.len(),
        });
    }
    check_labels(labels, labels.len())?;
    check_probabilities(proba)
}

/// Cumulative (true positive, false positive) counts at each distinct
/// score, sweeping from the highest score down.
fn sweep(labels: &[u8], proba: &[f64]) -> Vec<(f64, usize, usize)> {
    let mut order: Vec<usize> = (0..labels.len().min(proba.len())).collect();
    order.sort_by(|&a, &b| proba[b].total_cmp(&proba[a]));

    let mut points = Vec::new();
    let (mut tps, mut fps) = (0usize, 0usize);
    for (pos, &i) in order.iter().enumerate() {
        if labels[i] == 1 {
            tps += 1;
        } else {
            fps += 1;
        }
        let last_of_score = order
            .get(pos + 1)
            .is_none_or(|&next| proba[next] != proba[i]);
        if last_of_score {
            points.push((proba[i], tps, fps));
        }
    }
    points
}

fn trapezoid(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| (xs[1] - xs[0]) * (ys[0] + ys[1]) / 2.0)
        .sum::<f64>()
        .abs()
}

/// A receiver-operating-characteristic curve, starting at (0, 0).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RocCurve {
    /// False positive rate per point.
    pub fpr: Vec<f64>,
    /// True positive rate per point.
    pub tpr: Vec<f64>,
}

/// Build the ROC curve over all distinct scores. `None` with a single class.
#[must_use]
pub fn roc_curve(labels: &[u8], proba: &[f64]) -> Option<RocCurve> {
    let points = sweep(labels, proba);
    let &(_, pos, neg) = points.last()?;
    if pos == 0 || neg == 0 {
        return None;
    }
    let mut fpr = vec![0.0];
    let mut tpr = vec![0.0];
    for &(_, tps, fps) in &points {
        fpr.push(fps as f64 / neg as f64);
        tpr.push(tps as f64 / pos as f64);
    }
    Some(RocCurve { fpr, tpr })
}

/// Area under the ROC curve (trapezoid rule).
#[must_use]
pub fn roc_auc(labels: &[u8], proba: &[f64]) -> f64 {
    roc_curve(labels, proba).map_or(0.5, |c| trapezoid(&c.fpr, &c.tpr))
}

/// A precision-recall curve ordered by increasing threshold, ending at
/// (recall 0, precision 1).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PrCurve {
    /// Precision per point.
    pub precision: Vec<f64>,
    /// Recall per point.
    pub recall: Vec<f64>,
    /// Score threshold per point (one fewer than precision/recall).
    pub thresholds: Vec<f64>,
}

/// Build the precision-recall curve. `None` when there are no positives.
#[must_use]
pub fn pr_curve(labels: &[u8], proba: &[f64]) -> Option<PrCurve> {
    let points = sweep(labels, proba);
    let &(_, pos, _) = points.last()?;
    if pos == 0 {
        return None;
    }
    let mut precision = Vec::with_capacity(points.len() + 1);
    let mut recall = Vec::with_capacity(points.len() + 1);
    let mut thresholds = Vec::with_capacity(points.len());
    for &(score, tps, fps) in points.iter().rev() {
        precision.push(tps as f64 / (tps + fps) as f64);
        recall.push(tps as f64 / pos as f64);
        thresholds.push(score);
    }
    precision.push(1.0);
    recall.push(0.0);
    Some(PrCurve {
        precision,
        recall,
        thresholds,
    })
}

/// Trapezoidal area under the precision-recall curve.
#[must_use]
pub fn pr_auc(labels: &[u8], proba: &[f64]) -> f64 {
    pr_curve(labels, proba).map_or(0.0, |c| trapezoid(&c.recall, &c.precision))
}

/// Step-wise area under the precision-recall curve: Σ (Rₙ − Rₙ₋₁) · Pₙ.
#[must_use]
pub fn average_precision(labels: &[u8], proba: &[f64]) -> f64 {
    let points = sweep(labels, proba);
    let Some(&(_, pos, _)) = points.last() else {
        return 0.0;
    };
    if pos == 0 {
        return 0.0;
    }
    let mut prev_recall = 0.0;
    let mut ap = 0.0;
    for &(_, tps, fps) in &points {
        let recall = tps as f64 / pos as f64;
        let precision = tps as f64 / (tps + fps) as f64;
        ap += (recall - prev_recall) * precision;
        prev_recall = recall;
    }
    ap
}

/// Mean squared difference between probability and label.
#[must_use]
pub fn brier(labels: &[u8], proba: &[f64]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    labels
        .iter()
        .zip(proba)
        .map(|(&y, &p)| (p - f64::from(y)).powi(2))
        .sum::<f64>()
        / labels.len() as f64
}

/// Fraction of all positives found among the `k` highest-scored samples.
///
/// Returns `None` when `k` is absent or zero, `Some(0.0)` when there are no
/// positives. `k` larger than the sample count covers every sample. Equal
/// scores keep their original order.
#[must_use]
pub fn recall_at_k(labels: &[u8], proba: &[f64], k: Option<usize>) -> Option<f64> {
    let k = k.filter(|&k| k > 0)?;
    let positives = labels.iter().filter(|&&y| y == 1).count();
    if positives == 0 {
        return Some(0.0);
    }
    let mut order: Vec<usize> = (0..labels.len().min(proba.len())).collect();
    order.sort_by(|&a, &b| proba[b].total_cmp(&proba[a]));
    let hits = order.iter().take(k).filter(|&&i| labels[i] == 1).count();
    Some(hits as f64 / positives as f64)
}

/// Reliability diagram data over uniform bins on [0, 1].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CalibrationCurve {
    /// Mean predicted probability of each non-empty bin.
    pub mean_predicted: Vec<f64>,
    /// Observed fraction of positives in each non-empty bin.
    pub fraction_positive: Vec<f64>,
}

/// Bin predictions into `n_bins` uniform bins and compare mean prediction
/// with observed positive rate. Empty bins are skipped.
#[must_use]
pub fn calibration_curve(labels: &[u8], proba: &[f64], n_bins: usize) -> CalibrationCurve {
    let n_bins = n_bins.max(1);
    let inner_edges: Vec<f64> = (1..n_bins).map(|i| i as f64 / n_bins as f64).collect();
    let mut sum_pred = vec![0.0f64; n_bins];
    let mut sum_true = vec![0.0f64; n_bins];
    let mut count = vec![0usize; n_bins];
    for (&y, &p) in labels.iter().zip(proba) {
        let bin = inner_edges.partition_point(|&edge| edge < p);
        sum_pred[bin] += p;
        sum_true[bin] += f64::from(y);
        count[bin] += 1;
    }
    let mut curve = CalibrationCurve {
        mean_predicted: Vec::new(),
        fraction_positive: Vec::new(),
    };
    for b in 0..n_bins {
        if count[b] > 0 {
            curve.mean_predicted.push(sum_pred[b] / count[b] as f64);
            curve.fraction_positive.push(sum_true[b] / count[b] as f64);
        }
    }
    curve
}
