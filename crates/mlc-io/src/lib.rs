//! Configuration, dataset sources, and artifact persistence for mlc.

mod artifacts;
mod config;
mod dataset;
mod error;
mod synthetic;

pub use artifacts::{
    ArtifactStore, CALIBRATION_CURVE_FILE, COST_CURVE_FILE, METRICS_CV_FILE, METRICS_TEST_FILE,
    MODEL_FILE, PR_CURVE_FILE, PREPROCESSOR_FILE, TEST_CSV_FILE, THRESHOLDS_FILE, Thresholds,
    TrainedModel, write_predictions,
};
pub use config::{Config, DataConfig, DataSource, REQUIRED_SECTIONS, ReportsConfig};
pub use dataset::{CsvDatasetReader, Dataset, FeatureCsvReader, FeatureFile};
pub use error::{ConfigError, IoError};
pub use synthetic::{CATEGORY_COLUMN, SyntheticParams, make_classification};
