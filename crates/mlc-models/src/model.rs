//! Tagged model kinds and the estimator they build.

use std::fmt;
use std::str::FromStr;

use mlc_eval::Estimator;

use crate::error::ModelError;
use crate::forest::RandomForest;
use crate::gbdt::HistGradientBoosting;
use crate::logistic::LogisticRegression;
use crate::params::{HistGbdtParams, LogisticParams, RandomForestParams};

/// The estimator families understood by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ModelType {
    /// `logistic`
    #[serde(rename = "logistic")]
    Logistic,
    /// `rf`
    #[serde(rename = "rf")]
    RandomForest,
    /// `hist_gbdt`
    #[serde(rename = "hist_gbdt")]
    HistGbdt,
}

impl ModelType {
    /// All types, in tag order.
    pub const ALL: [ModelType; 3] = [ModelType::Logistic, ModelType::RandomForest, ModelType::HistGbdt];

    /// The configuration tag.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            ModelType::Logistic => "logistic",
            ModelType::RandomForest => "rf",
            ModelType::HistGbdt => "hist_gbdt",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Error for an unrecognised model type tag.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown model type \"{0}\" (expected logistic, rf or hist_gbdt)")]
pub struct UnknownModelType(pub String);

impl FromStr for ModelType {
    type Err = UnknownModelType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelType::ALL
            .into_iter()
            .find(|t| t.tag() == s)
            .ok_or_else(|| UnknownModelType(s.to_owned()))
    }
}

/// A model type together with its hyperparameters.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ModelKind {
    /// Logistic regression.
    Logistic(LogisticParams),
    /// Random forest.
    RandomForest(RandomForestParams),
    /// Histogram gradient boosting.
    HistGbdt(HistGbdtParams),
}

impl ModelKind {
    /// Return the type of this kind.
    #[must_use]
    pub fn model_type(&self) -> ModelType {
        match self {
            ModelKind::Logistic(_) => ModelType::Logistic,
            ModelKind::RandomForest(_) => ModelType::RandomForest,
            ModelKind::HistGbdt(_) => ModelType::HistGbdt,
        }
    }

    /// Fill an unset `random_state` for the kinds that use one.
    #[must_use]
    pub fn with_default_seed(self, seed: u64) -> Self {
        match self {
            ModelKind::RandomForest(p) if p.random_state().is_none() => {
                ModelKind::RandomForest(p.with_random_state(seed))
            }
            ModelKind::HistGbdt(p) if p.random_state().is_none() => {
                ModelKind::HistGbdt(p.with_random_state(seed))
            }
            other => other,
        }
    }

    /// Check the hyperparameters.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidParam`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ModelError> {
        match self {
            ModelKind::Logistic(p) => p.validate(),
            ModelKind::RandomForest(p) => p.validate(),
            ModelKind::HistGbdt(p) => p.validate(),
        }
    }

    /// Build an unfitted estimator.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidParam`] when the hyperparameters are out of range.
    pub fn build(&self) -> Result<Model, ModelError> {
        self.validate()?;
        Ok(match self {
            ModelKind::Logistic(p) => Model::Logistic(LogisticRegression::new(p.clone())),
            ModelKind::RandomForest(p) => Model::RandomForest(RandomForest::new(p.clone())),
            ModelKind::HistGbdt(p) => Model::HistGbdt(HistGradientBoosting::new(p.clone())),
        })
    }
}

/// Immutable description of one candidate: a display name and its model kind.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CandidateSpec {
    /// Name used in reports; unique within a run.
    pub name: String,
    /// What to build.
    pub kind: ModelKind,
}

impl CandidateSpec {
    /// Create a spec.
    pub fn new(name: impl Into<String>, kind: ModelKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// A concrete estimator of any supported family.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub enum Model {
    /// Logistic regression.
    Logistic(LogisticRegression),
    /// Random forest.
    RandomForest(RandomForest),
    /// Histogram gradient boosting.
    HistGbdt(HistGradientBoosting),
}

impl Model {
    /// Return the family of this estimator.
    #[must_use]
    pub fn model_type(&self) -> ModelType {
        match self {
            Model::Logistic(_) => ModelType::Logistic,
            Model::RandomForest(_) => ModelType::RandomForest,
            Model::HistGbdt(_) => ModelType::HistGbdt,
        }
    }
}

impl Estimator for Model {
    type Error = ModelError;

    fn fresh(&self) -> Self {
        match self {
            Model::Logistic(m) => Model::Logistic(LogisticRegression::new(m.params().clone())),
            Model::RandomForest(m) => Model::RandomForest(RandomForest::new(m.params().clone())),
            Model::HistGbdt(m) => Model::HistGbdt(HistGradientBoosting::new(m.params().clone())),
        }
    }

    fn fit(&mut self, features: &[Vec<f64>], labels: &[u8]) -> Result<(), ModelError> {
        match self {
            Model::Logistic(m) => m.fit(features, labels),
            Model::RandomForest(m) => m.fit(features, labels),
            Model::HistGbdt(m) => m.fit(features, labels),
        }
    }

    fn predict_proba(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        match self {
            Model::Logistic(m) => m.predict_proba(features),
            Model::RandomForest(m) => m.predict_proba(features),
            Model::HistGbdt(m) => m.predict_proba(features),
        }
    }
}
