//! Top-level error type for training and inference runs.

use mlc_eval::EvalError;
use mlc_io::{ConfigError, IoError};
use mlc_models::ModelError;

/// Broad class of a run failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The configuration is invalid.
    Configuration,
    /// The dataset cannot support the requested run.
    Data,
    /// A fit, prediction or resample failed.
    Computation,
    /// Reading or writing files failed.
    Io,
}

/// Any failure of a training or inference run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration document.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Dataset or artifact I/O failure.
    #[error(transparent)]
    Io(#[from] IoError),

    /// Evaluation core failure.
    #[error(transparent)]
    Eval(#[from] EvalError),

    /// Estimator or preprocessor failure outside a pipeline.
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl Error {
    /// Classify the failure.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) => ErrorCategory::Configuration,
            Error::Io(
                IoError::MissingTargetColumn { .. }
                | IoError::InvalidLabel { .. }
                | IoError::EmptyDataset { .. }
                | IoError::InconsistentRowLength { .. }
                | IoError::NonNumericValue { .. }
                | IoError::CsvParse { .. },
            ) => ErrorCategory::Data,
            Error::Io(IoError::Table(e)) | Error::Eval(e) => eval_category(e),
            Error::Io(_) => ErrorCategory::Io,
            Error::Model(
                ModelError::SchemaMismatch { .. } | ModelError::ColumnKindMismatch { .. },
            ) => ErrorCategory::Data,
            Error::Model(_) => ErrorCategory::Computation,
        }
    }
}

fn eval_category(e: &EvalError) -> ErrorCategory {
    match e {
        EvalError::TooFewSamplesForFolds { .. }
        | EvalError::EmptyDataset
        | EvalError::LengthMismatch { .. }
        | EvalError::InvalidLabel { .. }
        | EvalError::RaggedTable { .. } => ErrorCategory::Data,
        EvalError::InvalidFoldCount { .. }
        | EvalError::InvalidRepeatCount { .. }
        | EvalError::InvalidTestSize { .. }
        | EvalError::InvalidCalibrationMethod { .. }
        | EvalError::InvalidCost { .. }
        | EvalError::InvalidThresholdGrid { .. }
        | EvalError::InvalidResampleCount { .. } => ErrorCategory::Configuration,
        _ => ErrorCategory::Computation,
    }
}
