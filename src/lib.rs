//! Imbalanced binary classifier training and inference.
//!
//! [`run_training`] turns a validated [`Config`](mlc_io::Config) into an
//! artifact directory: each candidate is scored out-of-fold, the best by
//! PR-AUC is calibrated and refit, the decision threshold minimises expected
//! misclassification cost, and the result is evaluated once on the holdout.
//! [`InferenceModel`] loads that directory and scores new rows.

mod error;
mod infer;
mod train;

use tracing::{Span, info_span};

pub use error::{Error, ErrorCategory};
pub use infer::{InferenceModel, Prediction};
pub use train::{CandidateScore, TrainingSummary, run_training};

/// Logging context for one run.
///
/// Holds the run's root span; entry points do all their work inside it so
/// every event carries the run seed.
#[derive(Debug, Clone)]
pub struct RunContext {
    span: Span,
}

impl RunContext {
    /// Open the root span for a run with `seed`.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            span: info_span!("run", seed),
        }
    }

    /// The root span.
    #[must_use]
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Run `f` inside the root span.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        self.span.in_scope(f)
    }
}
