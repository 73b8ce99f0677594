//! Per-candidate out-of-fold evaluation and model selection.

use tracing::{info, instrument};

use crate::bootstrap::{ConfidenceInterval, bootstrap_ci};
use crate::cv::RepeatedStratifiedKFold;
use crate::error::EvalError;
use crate::metrics::{MetricsReport, average_precision, brier, compute_metrics, roc_auc};
use crate::oof::{OofPredictions, oof_predict};
use crate::pipeline::Classifier;
use crate::table::Table;

/// Reporting options for candidate evaluation.
#[derive(Debug, Clone)]
pub struct EvaluationOptions {
    /// Threshold for the threshold-dependent OOF metrics.
    pub threshold: f64,
    /// Top-k for recall@k; `None` skips it.
    pub k: Option<usize>,
    /// Bootstrap resample count.
    pub n_bootstrap: usize,
    /// Bootstrap seed.
    pub seed: u64,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            k: None,
            n_bootstrap: 400,
            seed: 42,
        }
    }
}

/// Bootstrap intervals reported for every candidate.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CandidateIntervals {
    /// Average precision interval.
    pub pr_auc_ci: ConfidenceInterval,
    /// ROC-AUC interval.
    pub roc_auc_ci: ConfidenceInterval,
    /// Brier score interval.
    pub brier_ci: ConfidenceInterval,
}

/// The serializable part of a [`TrainedCandidate`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CandidateSummary {
    /// OOF metrics report.
    pub oof: MetricsReport,
    /// Bootstrap intervals over the OOF predictions.
    pub ci: CandidateIntervals,
}

/// A candidate after out-of-fold evaluation.
///
/// `pipeline` is the unfitted template the OOF predictor cloned per fold;
/// the winner is refit on the full training set by the calibrator.
#[derive(Debug, Clone)]
pub struct TrainedCandidate<S, C> {
    /// The descriptor the candidate was built from.
    pub spec: S,
    /// The candidate's classifier template.
    pub pipeline: C,
    /// Aggregated OOF probabilities.
    pub oof: OofPredictions,
    /// Metrics of the OOF probabilities.
    pub metrics: MetricsReport,
    /// Bootstrap intervals of the OOF probabilities.
    pub intervals: CandidateIntervals,
}

impl<S, C> TrainedCandidate<S, C> {
    /// Copy out the reportable metrics.
    #[must_use]
    pub fn summary(&self) -> CandidateSummary {
        CandidateSummary {
            oof: self.metrics.clone(),
            ci: self.intervals,
        }
    }
}

/// Run OOF prediction for one candidate and compute its metrics and intervals.
///
/// # Errors
///
/// Propagates any [`EvalError`] from [`oof_predict`], [`compute_metrics`],
/// or [`bootstrap_ci`].
#[instrument(skip_all, fields(n_samples = table.n_rows()))]
pub fn evaluate_candidate<S, C: Classifier>(
    spec: S,
    pipeline: C,
    table: &Table,
    labels: &[u8],
    cv: &RepeatedStratifiedKFold,
    options: &EvaluationOptions,
) -> Result<TrainedCandidate<S, C>, EvalError> {
    let oof = oof_predict(&pipeline, table, labels, cv)?;
    let proba = &oof.probabilities;
    let metrics = compute_metrics(labels, proba, options.threshold, options.k)?;
    let intervals = CandidateIntervals {
        pr_auc_ci: bootstrap_ci(labels, proba, average_precision, options.n_bootstrap, options.seed)?,
        roc_auc_ci: bootstrap_ci(labels, proba, roc_auc, options.n_bootstrap, options.seed)?,
        brier_ci: bootstrap_ci(labels, proba, brier, options.n_bootstrap, options.seed)?,
    };
    info!(
        pr_auc = metrics.pr_auc,
        roc_auc = metrics.roc_auc,
        brier = metrics.brier,
        "candidate evaluated"
    );
    Ok(TrainedCandidate {
        spec,
        pipeline,
        oof,
        metrics,
        intervals,
    })
}

/// Index of the candidate with the highest OOF PR-AUC.
///
/// The comparison is strict, so among equal PR-AUC values the earliest
/// candidate wins.
///
/// # Errors
///
/// Returns [`EvalError::NoCandidates`] for an empty slice.
pub fn select_best<S, C>(candidates: &[TrainedCandidate<S, C>]) -> Result<usize, EvalError> {
    let mut best: Option<(usize, f64)> = None;
    for (i, candidate) in candidates.iter().enumerate() {
        let score = candidate.metrics.pr_auc;
        match best {
            Some((_, best_score)) if !(score > best_score) => {}
            _ => best = Some((i, score)),
        }
    }
    best.map(|(i, _)| i).ok_or(EvalError::NoCandidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Confusion;
    use crate::pipeline::testing::{clustered, stub_pipeline};

    fn candidate(pr_auc: f64) -> TrainedCandidate<&'static str, ()> {
        let ci = ConfidenceInterval {
            mean: pr_auc,
            low: pr_auc,
            high: pr_auc,
        };
        TrainedCandidate {
            spec: "c",
            pipeline: (),
            oof: OofPredictions {
                probabilities: vec![],
                counts: vec![],
            },
            metrics: MetricsReport {
                roc_auc: 0.5,
                pr_auc,
                brier: 0.25,
                accuracy: 0.5,
                f1_at_thr: 0.0,
                recall_at_k: None,
                confusion: Confusion::default(),
                threshold: 0.5,
            },
            intervals: CandidateIntervals {
                pr_auc_ci: ci,
                roc_auc_ci: ci,
                brier_ci: ci,
            },
        }
    }

    #[test]
    fn picks_highest_pr_auc() {
        let c = vec![candidate(0.3), candidate(0.7), candidate(0.5)];
        assert_eq!(select_best(&c).unwrap(), 1);
    }

    #[test]
    fn first_candidate_wins_ties() {
        let c = vec![candidate(0.2), candidate(0.6), candidate(0.6), candidate(0.6)];
        assert_eq!(select_best(&c).unwrap(), 1);
    }

    #[test]
    fn nan_never_displaces_a_real_score() {
        let c = vec![candidate(0.4), candidate(f64::NAN)];
        assert_eq!(select_best(&c).unwrap(), 0);
    }

    #[test]
    fn empty_is_an_error() {
        let c: Vec<TrainedCandidate<&str, ()>> = vec![];
        assert!(matches!(select_best(&c), Err(EvalError::NoCandidates)));
    }

    #[test]
    fn evaluate_fills_metrics_and_intervals() {
        let (table, labels) = clustered(100, 20);
        let cv = RepeatedStratifiedKFold::new(5, 1).unwrap();
        let options = EvaluationOptions {
            n_bootstrap: 50,
            k: Some(10),
            ..EvaluationOptions::default()
        };
        let trained =
            evaluate_candidate("stub", stub_pipeline(), &table, &labels, &cv, &options).unwrap();
        assert_eq!(trained.oof.probabilities.len(), 100);
        assert!(trained.metrics.pr_auc > 0.9);
        assert_eq!(trained.metrics.recall_at_k, Some(0.5));
        let ci = trained.intervals.pr_auc_ci;
        assert!(ci.low <= ci.high);
        let json = serde_json::to_value(trained.summary()).unwrap();
        assert!(json["ci"]["brier_ci"].is_array());
    }
}
