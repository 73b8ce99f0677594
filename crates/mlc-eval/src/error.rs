/// Boxed error from an external capability (estimator or preprocessor).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors from cross-validation, metrics, calibration, and threshold search.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    /// Returned when n_splits is less than 2.
    #[error("n_splits must be at least 2, got {n_splits}")]
    InvalidFoldCount {
        /// The invalid n_splits value provided.
        n_splits: usize,
    },

    /// Returned when n_repeats is zero.
    #[error("n_repeats must be at least 1, got {n_repeats}")]
    InvalidRepeatCount {
        /// The invalid n_repeats value provided.
        n_repeats: usize,
    },

    /// Returned when the holdout fraction is not in (0.0, 1.0).
    #[error("test_size must be in (0.0, 1.0), got {test_size}")]
    InvalidTestSize {
        /// The invalid fraction.
        test_size: f64,
    },

    /// Returned when zero samples are provided.
    #[error("dataset has zero samples")]
    EmptyDataset,

    /// Returned when two parallel inputs disagree in length.
    #[error("length mismatch: {what} has {got} entries, expected {expected}")]
    LengthMismatch {
        /// Which input is mismatched.
        what: &'static str,
        /// The expected length.
        expected: usize,
        /// The actual length.
        got: usize,
    },

    /// Returned when a label is not coded 0 or 1.
    #[error("label at sample {sample_index} is {label}, expected 0 or 1")]
    InvalidLabel {
        /// The zero-based index of the offending sample.
        sample_index: usize,
        /// The offending label value.
        label: u8,
    },

    /// Returned when a class has fewer samples than the number of folds.
    #[error("class {class} has only {count} samples, need at least {n_splits} for stratified CV")]
    TooFewSamplesForFolds {
        /// The class label with insufficient samples.
        class: u8,
        /// The number of samples belonging to that class.
        count: usize,
        /// The requested number of folds.
        n_splits: usize,
    },

    /// Returned when a sample never lands in any validation fold.
    #[error("sample {sample_index} received no out-of-fold prediction")]
    MissingOofPrediction {
        /// The zero-based index of the sample without a prediction.
        sample_index: usize,
    },

    /// Returned when a sample received a different number of out-of-fold scores than repeats.
    #[error("sample {sample_index} received {got} out-of-fold predictions, expected {expected}")]
    OofCountMismatch {
        /// The zero-based index of the sample.
        sample_index: usize,
        /// The number of repeats.
        expected: usize,
        /// The number of contributions observed.
        got: usize,
    },

    /// Returned when a fitted estimator fails.
    #[error("estimator failed during {stage}")]
    Estimator {
        /// Which step was running (`fit` or `predict_proba`).
        stage: &'static str,
        /// The underlying estimator error.
        source: BoxError,
    },

    /// Returned when the preprocessor fails.
    #[error("preprocessor failed during {stage}")]
    Preprocessor {
        /// Which step was running (`fit` or `transform`).
        stage: &'static str,
        /// The underlying preprocessor error.
        source: BoxError,
    },

    /// Returned when a cross-validation fold fails; wraps the cause.
    #[error("fold {fold} of repeat {repeat} failed")]
    FoldFailed {
        /// Zero-based repeat index.
        repeat: usize,
        /// Zero-based fold index within the repeat.
        fold: usize,
        /// The underlying failure.
        source: Box<EvalError>,
    },

    /// Returned when an estimator returns a probability outside [0, 1] or NaN.
    #[error("predicted probability {value} at sample {sample_index} is outside [0, 1]")]
    InvalidProbability {
        /// The zero-based index of the offending sample.
        sample_index: usize,
        /// The offending value.
        value: f64,
    },

    /// Returned when the calibration method string is not recognised.
    #[error("calibration method must be 'sigmoid' or 'isotonic', got \"{method}\"")]
    InvalidCalibrationMethod {
        /// The rejected method string.
        method: String,
    },

    /// Returned when a cost weight is negative or non-finite.
    #[error("cost weight {name} must be finite and non-negative, got {value}")]
    InvalidCost {
        /// Which weight (`fn` or `fp`).
        name: &'static str,
        /// The rejected value.
        value: f64,
    },

    /// Returned when a threshold grid is empty, unordered, or leaves [0, 1].
    #[error("invalid threshold grid: {reason}")]
    InvalidThresholdGrid {
        /// Human-readable description of the problem.
        reason: String,
    },

    /// Returned when the bootstrap resample count is zero.
    #[error("n_resamples must be at least 1, got {n_resamples}")]
    InvalidResampleCount {
        /// The invalid resample count.
        n_resamples: usize,
    },

    /// Returned when a model is used for prediction before `fit`.
    #[error("{what} must be fitted before predicting")]
    NotFitted {
        /// Which component is unfitted.
        what: &'static str,
    },

    /// Returned when model selection receives no candidates.
    #[error("no candidates to select from")]
    NoCandidates,

    /// Returned when a table column has a different row count than the first column.
    #[error("column \"{column}\" has {got} rows, expected {expected}")]
    RaggedTable {
        /// The offending column name.
        column: String,
        /// Row count of the first column.
        expected: usize,
        /// Row count of the offending column.
        got: usize,
    },
}
