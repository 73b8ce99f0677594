//! Concrete estimators and column preprocessing for mlc pipelines.
//!
//! Logistic regression, random forest and histogram gradient boosting behind
//! the [`mlc_eval::Estimator`] trait, selected through the tagged
//! [`ModelKind`], plus the [`ColumnPreprocessor`] implementing
//! [`mlc_eval::Preprocessor`].

mod error;
mod forest;
mod gbdt;
mod histogram;
mod logistic;
mod model;
mod node;
mod params;
mod preprocess;
mod tree;
mod validate;

pub use error::ModelError;
pub use forest::RandomForest;
pub use gbdt::HistGradientBoosting;
pub use logistic::LogisticRegression;
pub use model::{CandidateSpec, Model, ModelKind, ModelType, UnknownModelType};
pub use node::{FeatureIndex, Node, NodeIndex, Tree};
pub use params::{ClassWeight, DEFAULT_SEED, HistGbdtParams, LogisticParams, MaxFeatures, RandomForestParams};
pub use preprocess::ColumnPreprocessor;
