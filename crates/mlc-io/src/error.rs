//! Error types for configuration, dataset, and artifact I/O.

use std::path::PathBuf;

/// Errors from loading and validating a configuration document.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Returned when the config file cannot be read.
    #[error("cannot read config file {path}")]
    Read {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when the document is not valid YAML.
    #[error("invalid config document: {source}")]
    Parse {
        /// Underlying YAML error.
        source: serde_yaml::Error,
    },

    /// Returned when a section does not deserialize into its expected shape.
    #[error("invalid config section `{section}`: {source}")]
    InvalidSection {
        /// Top-level section name.
        section: &'static str,
        /// Underlying YAML error (unknown key, wrong type, ...).
        source: serde_yaml::Error,
    },

    /// Returned when the top level is not a mapping.
    #[error("config document must be a mapping at the top level")]
    NotAMapping,

    /// Returned when required top-level sections are absent.
    #[error("config missing sections: {}", sections.join(", "))]
    MissingSection {
        /// Names of the missing sections, sorted.
        sections: Vec<String>,
    },

    /// Returned when `models` is not a non-empty list.
    #[error("config.models must be a non-empty list")]
    EmptyModels,

    /// Returned when a model entry lacks a `type`.
    #[error("models[{index}] has no type")]
    MissingModelType {
        /// Zero-based position in the models list.
        index: usize,
    },

    /// Returned when a model `type` tag is not recognised.
    #[error("models[{index}]: {source}")]
    UnknownModelType {
        /// Zero-based position in the models list.
        index: usize,
        /// The parse failure naming the tag.
        source: mlc_models::UnknownModelType,
    },

    /// Returned when a model's params do not deserialize into its parameter struct.
    #[error("models[{index}] ({model_type}) params: {source}")]
    InvalidModelParams {
        /// Zero-based position in the models list.
        index: usize,
        /// The model type tag.
        model_type: mlc_models::ModelType,
        /// Underlying YAML error (unknown key, wrong type, ...).
        source: serde_yaml::Error,
    },

    /// Returned when a model's params deserialize but are out of range.
    #[error("models[{index}]: {source}")]
    InvalidModelValue {
        /// Zero-based position in the models list.
        index: usize,
        /// The range violation.
        source: mlc_models::ModelError,
    },

    /// Returned when two candidates share a name.
    #[error("duplicate model name \"{name}\"")]
    DuplicateModelName {
        /// The repeated name.
        name: String,
    },

    /// Returned when the calibration method is not `sigmoid` or `isotonic`.
    #[error("{source}")]
    InvalidCalibrationMethod {
        /// The parse failure naming the method.
        source: mlc_eval::EvalError,
    },

    /// Returned when `data.kind` is not supported or lacks what it needs.
    #[error("unsupported data source: {reason}")]
    UnsupportedDataKind {
        /// What is wrong.
        reason: String,
    },

    /// Returned when a scalar field is out of range.
    #[error("invalid {field}: {reason}")]
    InvalidValue {
        /// Dotted path of the field.
        field: &'static str,
        /// What is wrong with the value.
        reason: String,
    },
}

/// Errors from dataset reading and artifact persistence.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Returned when an input file does not exist or is unreadable.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when the CSV parser encounters a malformed record.
    #[error("CSV parse error in {path} at byte offset {offset}")]
    CsvParse {
        /// Path to the CSV file.
        path: PathBuf,
        /// Byte offset where the error occurred.
        offset: u64,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// Returned when the CSV file contains a header but zero data rows.
    #[error("empty dataset (no data rows) in {path}")]
    EmptyDataset {
        /// Path to the CSV file.
        path: PathBuf,
    },

    /// Returned when a data row has a different number of columns than the header.
    #[error("inconsistent row length in {path}: row {row_index} has {got} columns, expected {expected}")]
    InconsistentRowLength {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// Expected number of columns (from header).
        expected: usize,
        /// Actual number of columns in this row.
        got: usize,
    },

    /// Returned when the target column is absent from the header.
    #[error("target column \"{target}\" not found in {path}")]
    MissingTargetColumn {
        /// Path to the CSV file.
        path: PathBuf,
        /// The configured target column.
        target: String,
    },

    /// Returned when a target cell is not 0 or 1.
    #[error("invalid label \"{raw}\" in {path} at row {row_index}: expected 0 or 1")]
    InvalidLabel {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// The raw cell.
        raw: String,
    },

    /// Returned when a column that must be numeric holds a non-numeric cell.
    #[error("non-numeric value \"{raw}\" in {path}: row {row_index}, column \"{column}\"")]
    NonNumericValue {
        /// Path to the CSV file.
        path: PathBuf,
        /// Zero-based row index (excluding header).
        row_index: usize,
        /// Column name.
        column: String,
        /// The raw cell.
        raw: String,
    },

    /// Returned when synthetic-data parameters are inconsistent.
    #[error("invalid synthetic data parameters: {reason}")]
    InvalidSynthetic {
        /// What is wrong.
        reason: String,
    },

    /// Returned when assembled columns do not form a table.
    #[error(transparent)]
    Table(#[from] mlc_eval::EvalError),

    /// Returned when the output directory cannot be created.
    #[error("cannot create output directory {path}")]
    OutputDirCreate {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when a file cannot be written.
    #[error("cannot write file {path}")]
    WriteFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Returned when a CSV file cannot be written.
    #[error("cannot write CSV {path}")]
    WriteCsv {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// Returned when bincode encoding fails.
    #[error("failed to serialize {what}")]
    Serialize {
        /// Which artifact.
        what: &'static str,
        /// Underlying bincode error.
        source: bincode::Error,
    },

    /// Returned when a binary artifact cannot be decoded.
    #[error("failed to deserialize {path}")]
    Deserialize {
        /// Path to the artifact.
        path: PathBuf,
        /// Underlying bincode error.
        source: bincode::Error,
    },

    /// Returned when a binary artifact was written by an incompatible version.
    #[error("incompatible artifact format in {path}: expected version {expected}, found {found}")]
    IncompatibleVersion {
        /// Expected format version.
        expected: u32,
        /// Version found in the file.
        found: u32,
        /// Path to the artifact.
        path: PathBuf,
    },

    /// Returned when a binary artifact holds a different kind of object.
    #[error("{path} holds a {found} artifact, expected {expected}")]
    WrongArtifact {
        /// Path to the artifact.
        path: PathBuf,
        /// Artifact kind requested.
        expected: &'static str,
        /// Artifact kind found in the file.
        found: String,
    },

    /// Returned when a JSON report cannot be encoded or decoded.
    #[error("invalid JSON in {path}")]
    Json {
        /// Path to the report.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}
