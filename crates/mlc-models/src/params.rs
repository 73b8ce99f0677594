//! Validated hyperparameters for each estimator family.
//!
//! Each struct deserialises from a config `params` mapping (unknown keys
//! rejected, missing keys defaulted) and can also be built with `with_*`
//! methods.

use crate::error::ModelError;

/// Seed used when `random_state` is unset.
pub const DEFAULT_SEED: u64 = 42;

/// Class weighting strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassWeight {
    /// Weight each class by `n_samples / (2 · n_class)`.
    Balanced,
}

/// Strategy for determining the number of features to consider at each split.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    /// Square root of total features.
    Sqrt,
    /// Log base 2 of total features.
    Log2,
    /// All features (no subsampling).
    All,
    /// A fixed count.
    Count(usize),
    /// A fraction of total features (must be in (0.0, 1.0]).
    Fraction(f64),
}

impl MaxFeatures {
    /// Resolve to a concrete count in `1..=n_features`, rounding down.
    pub(crate) fn resolve(self, n_features: usize) -> usize {
        let resolved = match self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().floor() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().floor() as usize,
            MaxFeatures::All => n_features,
            MaxFeatures::Count(n) => n,
            MaxFeatures::Fraction(f) => (n_features as f64 * f).floor() as usize,
        };
        resolved.clamp(1, n_features.max(1))
    }
}

fn invalid(model: &'static str, param: &'static str, reason: impl Into<String>) -> ModelError {
    ModelError::InvalidParam {
        model,
        param,
        reason: reason.into(),
    }
}

fn check_positive_finite(model: &'static str, param: &'static str, value: f64) -> Result<(), ModelError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(model, param, format!("must be finite and > 0, got {value}")))
    }
}

fn check_at_least(model: &'static str, param: &'static str, value: usize, min: usize) -> Result<(), ModelError> {
    if value >= min {
        Ok(())
    } else {
        Err(invalid(model, param, format!("must be >= {min}, got {value}")))
    }
}

/// L2-penalised logistic regression.
///
/// # Defaults
///
/// | Parameter      | Default |
/// |----------------|---------|
/// | `c`            | 1.0     |
/// | `max_iter`     | 200     |
/// | `tol`          | 1e-4    |
/// | `fit_intercept`| `true`  |
/// | `class_weight` | `None`  |
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogisticParams {
    /// Inverse regularisation strength.
    #[serde(alias = "C")]
    pub(crate) c: f64,
    pub(crate) max_iter: usize,
    pub(crate) tol: f64,
    pub(crate) fit_intercept: bool,
    pub(crate) class_weight: Option<ClassWeight>,
}

impl Default for LogisticParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 200,
            tol: 1e-4,
            fit_intercept: true,
            class_weight: None,
        }
    }
}

impl LogisticParams {
    /// Set the inverse regularisation strength.
    #[must_use]
    pub fn with_c(mut self, c: f64) -> Self {
        self.c = c;
        self
    }

    /// Set the Newton iteration cap.
    #[must_use]
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set the convergence tolerance on the largest coefficient step.
    #[must_use]
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Set the class weighting.
    #[must_use]
    pub fn with_class_weight(mut self, class_weight: Option<ClassWeight>) -> Self {
        self.class_weight = class_weight;
        self
    }

    /// Check every value is in range.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidParam`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ModelError> {
        check_positive_finite("logistic", "c", self.c)?;
        check_at_least("logistic", "max_iter", self.max_iter, 1)?;
        check_positive_finite("logistic", "tol", self.tol)
    }
}

/// Bagged CART forest.
///
/// # Defaults
///
/// | Parameter            | Default |
/// |----------------------|---------|
/// | `n_trees`            | 100     |
/// | `max_depth`          | `None`  |
/// | `min_samples_split`  | 2       |
/// | `min_samples_leaf`   | 1       |
/// | `max_features`       | `Sqrt`  |
/// | `bootstrap`          | `true`  |
/// | `class_weight`       | `None`  |
/// | `random_state`       | unset   |
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RandomForestParams {
    #[serde(alias = "n_estimators")]
    pub(crate) n_trees: usize,
    pub(crate) max_depth: Option<usize>,
    pub(crate) min_samples_split: usize,
    pub(crate) min_samples_leaf: usize,
    pub(crate) max_features: MaxFeatures,
    pub(crate) bootstrap: bool,
    pub(crate) class_weight: Option<ClassWeight>,
    pub(crate) random_state: Option<u64>,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            class_weight: None,
            random_state: None,
        }
    }
}

impl RandomForestParams {
    /// Set the number of trees.
    #[must_use]
    pub fn with_n_trees(mut self, n_trees: usize) -> Self {
        self.n_trees = n_trees;
        self
    }

    /// Set the maximum tree depth (`None` = unlimited).
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the minimum samples per leaf.
    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf;
        self
    }

    /// Set the per-split feature subsampling.
    #[must_use]
    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    /// Set the class weighting.
    #[must_use]
    pub fn with_class_weight(mut self, class_weight: Option<ClassWeight>) -> Self {
        self.class_weight = class_weight;
        self
    }

    /// Set the master seed.
    #[must_use]
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Return the master seed, if set.
    #[must_use]
    pub fn random_state(&self) -> Option<u64> {
        self.random_state
    }

    /// Check every value is in range.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidParam`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ModelError> {
        check_at_least("rf", "n_trees", self.n_trees, 1)?;
        if self.max_depth == Some(0) {
            return Err(invalid("rf", "max_depth", "must be >= 1 when set"));
        }
        check_at_least("rf", "min_samples_split", self.min_samples_split, 2)?;
        check_at_least("rf", "min_samples_leaf", self.min_samples_leaf, 1)?;
        match self.max_features {
            MaxFeatures::Count(0) => Err(invalid("rf", "max_features", "count must be >= 1")),
            MaxFeatures::Fraction(f) if !(f > 0.0 && f <= 1.0) => Err(invalid(
                "rf",
                "max_features",
                format!("fraction must be in (0, 1], got {f}"),
            )),
            _ => Ok(()),
        }
    }
}

/// Histogram gradient-boosted trees on the log-loss.
///
/// # Defaults
///
/// | Parameter           | Default |
/// |---------------------|---------|
/// | `learning_rate`     | 0.1     |
/// | `max_iter`          | 100     |
/// | `max_depth`         | 6       |
/// | `min_samples_leaf`  | 20      |
/// | `l2_regularization` | 0.0     |
/// | `max_bins`          | 255     |
/// | `random_state`      | unset   |
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HistGbdtParams {
    pub(crate) learning_rate: f64,
    pub(crate) max_iter: usize,
    pub(crate) max_depth: usize,
    pub(crate) min_samples_leaf: usize,
    pub(crate) l2_regularization: f64,
    pub(crate) max_bins: usize,
    pub(crate) random_state: Option<u64>,
}

impl Default for HistGbdtParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            max_iter: 100,
            max_depth: 6,
            min_samples_leaf: 20,
            l2_regularization: 0.0,
            max_bins: 255,
            random_state: None,
        }
    }
}

impl HistGbdtParams {
    /// Set the shrinkage applied to every tree.
    #[must_use]
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Set the number of boosting rounds.
    #[must_use]
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set the maximum tree depth.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Set the minimum samples per leaf.
    #[must_use]
    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf;
        self
    }

    /// Set the seed used when subsampling rows for bin edges.
    #[must_use]
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Return the seed, if set.
    #[must_use]
    pub fn random_state(&self) -> Option<u64> {
        self.random_state
    }

    /// Check every value is in range.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidParam`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ModelError> {
        check_positive_finite("hist_gbdt", "learning_rate", self.learning_rate)?;
        check_at_least("hist_gbdt", "max_iter", self.max_iter, 1)?;
        check_at_least("hist_gbdt", "max_depth", self.max_depth, 1)?;
        check_at_least("hist_gbdt", "min_samples_leaf", self.min_samples_leaf, 1)?;
        if !(self.l2_regularization.is_finite() && self.l2_regularization >= 0.0) {
            return Err(invalid(
                "hist_gbdt",
                "l2_regularization",
                format!("must be finite and >= 0, got {}", self.l2_regularization),
            ));
        }
        if !(2..=255).contains(&self.max_bins) {
            return Err(invalid(
                "hist_gbdt",
                "max_bins",
                format!("must be in [2, 255], got {}", self.max_bins),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        LogisticParams::default().validate().unwrap();
        RandomForestParams::default().validate().unwrap();
        HistGbdtParams::default().validate().unwrap();
    }

    #[test]
    fn resolve_max_features() {
        assert_eq!(MaxFeatures::Sqrt.resolve(24), 4);
        assert_eq!(MaxFeatures::Sqrt.resolve(25), 5);
        assert_eq!(MaxFeatures::Sqrt.resolve(2), 1);
        assert_eq!(MaxFeatures::Log2.resolve(16), 4);
        assert_eq!(MaxFeatures::Log2.resolve(10), 3);
        assert_eq!(MaxFeatures::Log2.resolve(1), 1);
        assert_eq!(MaxFeatures::Fraction(0.5).resolve(9), 4);
        assert_eq!(MaxFeatures::Fraction(0.01).resolve(9), 1);
        assert_eq!(MaxFeatures::Count(50).resolve(9), 9);
        assert_eq!(MaxFeatures::All.resolve(9), 9);
    }

    #[test]
    fn bad_values_name_the_field() {
        let err = LogisticParams::default().with_c(0.0).validate().unwrap_err();
        assert!(matches!(err, ModelError::InvalidParam { param: "c", .. }));

        let err = RandomForestParams::default()
            .with_max_features(MaxFeatures::Fraction(1.5))
            .validate()
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidParam { param: "max_features", .. }));

        let err = HistGbdtParams::default()
            .with_learning_rate(f64::NAN)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ModelError::InvalidParam { model: "hist_gbdt", .. }));
    }

    #[test]
    fn max_depth_zero_rejected() {
        let err = RandomForestParams::default()
            .with_max_depth(Some(0))
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("max_depth"));
    }
}
