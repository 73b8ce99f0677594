//! Leak-free evaluation and decisioning for imbalanced binary classifiers.
//!
//! Repeated stratified cross-validation producing out-of-fold probabilities,
//! ranking/decision metrics with bootstrap intervals, model selection by
//! PR-AUC, cross-validated probability calibration, and cost-optimal
//! threshold search. Learners and feature transforms are plugged in through
//! the [`Estimator`] and [`Preprocessor`] traits.

mod bootstrap;
mod calibrate;
mod cv;
mod error;
mod holdout;
mod metrics;
mod oof;
mod pipeline;
mod select;
mod table;
mod threshold;

pub use bootstrap::{ConfidenceInterval, bootstrap_ci};
pub use calibrate::{
    CalibratedModel, CalibrationMap, CalibrationMethod, Calibrator, Isotonic, Platt,
};
pub use cv::{FoldAssignment, FoldIter, HoldoutSplit, RepeatedStratifiedKFold, stratified_holdout_split};
pub use error::{BoxError, EvalError};
pub use holdout::{HoldoutEvaluation, evaluate_holdout};
pub use metrics::{
    CalibrationCurve, Confusion, MetricsReport, PrCurve, RocCurve, Scorer, average_precision,
    brier, calibration_curve, compute_metrics, pr_auc, pr_curve, recall_at_k, roc_auc, roc_curve,
};
pub use oof::{OofPredictions, oof_predict};
pub use pipeline::{Classifier, Estimator, Pipeline, Preprocessor, check_labels, check_probabilities};
pub use select::{
    CandidateIntervals, CandidateSummary, EvaluationOptions, TrainedCandidate, evaluate_candidate,
    select_best,
};
pub use table::{Column, ColumnKind, ColumnValues, Table};
pub use threshold::{CostCurve, CostWeights, ThresholdDecision, ThresholdGrid, optimize_threshold};
