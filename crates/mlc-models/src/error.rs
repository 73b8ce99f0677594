use mlc_eval::ColumnKind;

/// Errors from estimators and the column preprocessor.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Returned when a hyperparameter is out of range.
    #[error("{model}: invalid {param}: {reason}")]
    InvalidParam {
        /// Model type tag (`logistic`, `rf`, `hist_gbdt`).
        model: &'static str,
        /// Parameter name.
        param: &'static str,
        /// What is wrong with the value.
        reason: String,
    },

    /// Returned when the training dataset has zero samples.
    #[error("training dataset has zero samples")]
    EmptyDataset,

    /// Returned when samples have zero feature columns.
    #[error("samples have zero features")]
    ZeroFeatures,

    /// Returned when a sample's feature count differs from the first sample's.
    #[error("sample {sample_index} has {got} features, expected {expected}")]
    FeatureCountMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features found.
        got: usize,
        /// The zero-based index of the offending sample.
        sample_index: usize,
    },

    /// Returned when a feature value is NaN or infinite.
    #[error("non-finite value at sample {sample_index}, feature {feature_index}")]
    NonFiniteValue {
        /// The zero-based index of the sample.
        sample_index: usize,
        /// The zero-based index of the feature.
        feature_index: usize,
    },

    /// Returned when feature rows and labels differ in count.
    #[error("{n_samples} samples but {n_labels} labels")]
    LabelCountMismatch {
        /// Number of feature rows.
        n_samples: usize,
        /// Number of labels.
        n_labels: usize,
    },

    /// Returned when a label is not 0 or 1.
    #[error("label at sample {sample_index} is {label}, expected 0 or 1")]
    InvalidLabel {
        /// The zero-based index of the sample.
        sample_index: usize,
        /// The offending label.
        label: u8,
    },

    /// Returned when all training labels belong to one class.
    #[error("training labels contain only class {class}")]
    SingleClass {
        /// The only class present.
        class: u8,
    },

    /// Returned when predicting with an unfitted model.
    #[error("{model} must be fitted before predicting")]
    NotFitted {
        /// Which component is unfitted.
        model: &'static str,
    },

    /// Returned when prediction rows have a different feature count than training.
    #[error("prediction sample has {got} features, model was trained on {expected}")]
    PredictionFeatureMismatch {
        /// Feature count seen during training.
        expected: usize,
        /// Feature count of the prediction sample.
        got: usize,
    },

    /// Returned when the Newton system cannot be solved.
    #[error("logistic regression Hessian is singular at iteration {iteration}")]
    SingularHessian {
        /// The zero-based Newton iteration.
        iteration: usize,
    },

    /// Returned when the columns of a table differ from the fitted columns.
    #[error("column names {got:?} do not match fitted columns {expected:?}")]
    SchemaMismatch {
        /// Column names seen during fit.
        expected: Vec<String>,
        /// Column names of the table being transformed.
        got: Vec<String>,
    },

    /// Returned when a column changes kind between fit and transform.
    #[error("column \"{column}\" is {got}, but was {expected} during fit")]
    ColumnKindMismatch {
        /// The column name.
        column: String,
        /// Kind seen during fit.
        expected: ColumnKind,
        /// Kind of the table being transformed.
        got: ColumnKind,
    },
}
