//! Capability traits consumed by the evaluation core, and the
//! preprocessor + estimator composition.

use tracing::{debug, instrument};

use crate::error::EvalError;
use crate::table::Table;

/// A binary probabilistic learner over a dense numeric matrix.
///
/// `features[sample_idx][feature_idx]`, row-major.
/// `labels[sample_idx]`, 0 or 1.
pub trait Estimator: Send + Sync {
    /// Error type surfaced by `fit` and `predict_proba`.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Return an unfitted copy with identical hyperparameters.
    #[must_use]
    fn fresh(&self) -> Self
    where
        Self: Sized;

    /// Fit on the given samples.
    fn fit(&mut self, features: &[Vec<f64>], labels: &[u8]) -> Result<(), Self::Error>;

    /// Return the positive-class probability for each sample.
    fn predict_proba(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, Self::Error>;
}

/// A label-agnostic fit/transform step turning a [`Table`] into a numeric matrix.
pub trait Preprocessor: Send + Sync {
    /// Error type surfaced by `fit` and `transform`.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Return an unfitted copy with identical settings.
    #[must_use]
    fn fresh(&self) -> Self
    where
        Self: Sized;

    /// Learn transform parameters from the table.
    fn fit(&mut self, table: &Table) -> Result<(), Self::Error>;

    /// Transform the table into a row-major numeric matrix.
    fn transform(&self, table: &Table) -> Result<Vec<Vec<f64>>, Self::Error>;
}

/// Anything that can be fit on a table and emit positive-class probabilities.
///
/// Implemented by [`Pipeline`] and by
/// [`CalibratedModel`](crate::calibrate::CalibratedModel).
pub trait Classifier: Send + Sync {
    /// Return an unfitted copy built from the same settings.
    ///
    /// Every fold works on its own fresh copy; fitted state is never shared.
    #[must_use]
    fn fresh(&self) -> Self
    where
        Self: Sized;

    /// Fit on the given rows.
    fn fit(&mut self, features: &Table, labels: &[u8]) -> Result<(), EvalError>;

    /// Return the positive-class probability for each row.
    fn predict_proba(&self, features: &Table) -> Result<Vec<f64>, EvalError>;
}

/// Preprocessor followed by estimator.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Pipeline<P, E> {
    preprocessor: P,
    estimator: E,
}

impl<P, E> Pipeline<P, E> {
    /// Compose a preprocessor and an estimator.
    pub fn new(preprocessor: P, estimator: E) -> Self {
        Self {
            preprocessor,
            estimator,
        }
    }

    /// Borrow the preprocessor.
    #[must_use]
    pub fn preprocessor(&self) -> &P {
        &self.preprocessor
    }

    /// Borrow the estimator.
    #[must_use]
    pub fn estimator(&self) -> &E {
        &self.estimator
    }
}

impl<P: Preprocessor, E: Estimator> Classifier for Pipeline<P, E> {
    fn fresh(&self) -> Self {
        Self {
            preprocessor: self.preprocessor.fresh(),
            estimator: self.estimator.fresh(),
        }
    }

    #[instrument(skip_all, fields(n_rows = features.n_rows()))]
    fn fit(&mut self, features: &Table, labels: &[u8]) -> Result<(), EvalError> {
        check_labels(labels, features.n_rows())?;
        self.preprocessor
            .fit(features)
            .map_err(|e| EvalError::Preprocessor {
                stage: "fit",
                source: Box::new(e),
            })?;
        let matrix = self.transform(features)?;
        debug!(n_features = matrix.first().map_or(0, Vec::len), "features transformed");
        self.estimator
            .fit(&matrix, labels)
            .map_err(|e| EvalError::Estimator {
                stage: "fit",
                source: Box::new(e),
            })
    }

    fn predict_proba(&self, features: &Table) -> Result<Vec<f64>, EvalError> {
        let matrix = self.transform(features)?;
        let proba = self
            .estimator
            .predict_proba(&matrix)
            .map_err(|e| EvalError::Estimator {
                stage: "predict_proba",
                source: Box::new(e),
            })?;
        check_probabilities(&proba)?;
        Ok(proba)
    }
}

impl<P: Preprocessor, E> Pipeline<P, E> {
    fn transform(&self, features: &Table) -> Result<Vec<Vec<f64>>, EvalError> {
        self.preprocessor
            .transform(features)
            .map_err(|e| EvalError::Preprocessor {
                stage: "transform",
                source: Box::new(e),
            })
    }
}

/// Validate that labels are binary and match the expected sample count.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`EvalError::LengthMismatch`] | `labels.len() != n_samples` |
/// | [`EvalError::InvalidLabel`] | a label is neither 0 nor 1 |
pub fn check_labels(labels: &[u8], n_samples: usize) -> Result<(), EvalError> {
    if labels.len() != n_samples {
        return Err(EvalError::LengthMismatch {
            what: "labels",
            expected: n_samples,
            got: labels.len(),
        });
    }
    if let Some((sample_index, &label)) = labels.iter().enumerate().find(|&(_, &l)| l > 1) {
        return Err(EvalError::InvalidLabel {
            sample_index,
            label,
        });
    }
    Ok(())
}

/// Validate that every probability is a number in [0, 1].
pub fn check_probabilities(proba: &[f64]) -> Result<(), EvalError> {
    match proba
        .iter()
        .enumerate()
        .find(|&(_, p)| !(0.0..=1.0).contains(p))
    {
        Some((sample_index, &value)) => Err(EvalError::InvalidProbability {
            sample_index,
            value,
        }),
        None => Ok(()),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{clustered, stub_pipeline};
    use super::*;

    #[test]
    fn pipeline_fit_predict() {
        let (table, labels) = clustered(100, 20);
        let mut pipe = stub_pipeline();
        pipe.fit(&table, &labels).unwrap();
        assert!(pipe.preprocessor().fitted);
        let proba = pipe.predict_proba(&table).unwrap();
        assert_eq!(proba.len(), 100);
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn fresh_drops_fitted_state() {
        let (table, labels) = clustered(50, 10);
        let mut pipe = stub_pipeline();
        pipe.fit(&table, &labels).unwrap();
        let fresh = pipe.fresh();
        assert!(!fresh.preprocessor().fitted);
        assert!(fresh.estimator().midpoint.is_none());
        assert!(pipe.estimator().midpoint.is_some());
    }

    #[test]
    fn non_binary_label_rejected() {
        let err = check_labels(&[0, 1, 2], 3).unwrap_err();
        assert!(matches!(
            err,
            EvalError::InvalidLabel {
                sample_index: 2,
                label: 2
            }
        ));
    }

    #[test]
    fn label_length_checked() {
        assert!(matches!(
            check_labels(&[0, 1], 3).unwrap_err(),
            EvalError::LengthMismatch { expected: 3, got: 2, .. }
        ));
    }

    #[test]
    fn probability_range_checked() {
        assert!(check_probabilities(&[0.0, 0.5, 1.0]).is_ok());
        assert!(check_probabilities(&[0.2, f64::NAN]).is_err());
        assert!(check_probabilities(&[1.2]).is_err());
    }
}
