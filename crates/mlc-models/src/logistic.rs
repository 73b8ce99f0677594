//! L2-penalised logistic regression fitted by Newton–Raphson.

use faer::linalg::solvers::{Llt, Solve};
use faer::{Mat, Side};
use tracing::{debug, info, instrument, warn};

use crate::error::ModelError;
use crate::params::{ClassWeight, LogisticParams};
use crate::validate::{balanced_weights, check_prediction_rows, check_training_set};

/// Maximum step halvings per Newton iteration.
const MAX_BACKTRACK: usize = 30;

/// Logistic function, evaluated without overflow for large `|z|`.
pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// `ln(1 + e^z)`, evaluated without overflow.
pub(crate) fn softplus(z: f64) -> f64 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

/// Binary logistic regression.
///
/// Minimises `Σ wᵢ·logloss(yᵢ, σ(xᵢ·β + b)) + ‖β‖² / (2c)`; the intercept is
/// not penalised.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LogisticRegression {
    params: LogisticParams,
    fitted: Option<FittedLogistic>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct FittedLogistic {
    coef: Vec<f64>,
    intercept: f64,
    n_iter: usize,
}

/// Penalised objective and its derivatives over a fixed design.
struct Objective<'a> {
    features: &'a [Vec<f64>],
    labels: &'a [u8],
    weights: &'a [f64],
    n_features: usize,
    fit_intercept: bool,
    alpha: f64,
}

impl Objective<'_> {
    fn dim(&self) -> usize {
        self.n_features + usize::from(self.fit_intercept)
    }

    fn margin(&self, row: &[f64], params: &[f64]) -> f64 {
        let dot: f64 = row.iter().zip(params).map(|(x, b)| x * b).sum();
        if self.fit_intercept {
            dot + params[self.n_features]
        } else {
            dot
        }
    }

    fn penalty(&self, params: &[f64]) -> f64 {
        0.5 * self.alpha * params[..self.n_features].iter().map(|b| b * b).sum::<f64>()
    }

    fn loss(&self, params: &[f64]) -> f64 {
        let data: f64 = self
            .features
            .iter()
            .zip(self.labels)
            .zip(self.weights)
            .map(|((row, &y), &w)| {
                let z = self.margin(row, params);
                w * (softplus(z) - f64::from(y) * z)
            })
            .sum();
        data + self.penalty(params)
    }

    /// Gradient and Hessian at `params`.
    fn derivatives(&self, params: &[f64]) -> (Vec<f64>, Mat<f64>) {
        let dim = self.dim();
        let mut grad = vec![0.0; dim];
        let mut hess = Mat::<f64>::zeros(dim, dim);
        let mut x = vec![0.0; dim];

        for ((row, &y), &w) in self.features.iter().zip(self.labels).zip(self.weights) {
            x[..self.n_features].copy_from_slice(row);
            if self.fit_intercept {
                x[self.n_features] = 1.0;
            }
            let p = sigmoid(self.margin(row, params));
            let r = w * (p - f64::from(y));
            let s = w * p * (1.0 - p);
            for j in 0..dim {
                grad[j] += r * x[j];
                let sx = s * x[j];
                for k in 0..=j {
                    hess[(j, k)] += sx * x[k];
                }
            }
        }
        for j in 0..self.n_features {
            grad[j] += self.alpha * params[j];
            hess[(j, j)] += self.alpha;
        }
        for j in 0..dim {
            for k in 0..j {
                hess[(k, j)] = hess[(j, k)];
            }
        }
        (grad, hess)
    }
}

/// Solve `hess · x = grad` through an LLᵀ factorisation.
///
/// Returns `None` when `hess` is not positive definite or the solution is
/// not finite.
fn newton_step(hess: &Mat<f64>, grad: &[f64]) -> Option<Vec<f64>> {
    let llt = Llt::new(hess.as_ref(), Side::Lower).ok()?;
    let rhs = Mat::<f64>::from_fn(grad.len(), 1, |i, _| grad[i]);
    let sol = llt.solve(rhs.as_ref());
    let step: Vec<f64> = (0..grad.len()).map(|i| sol[(i, 0)]).collect();
    step.iter().all(|d| d.is_finite()).then_some(step)
}

impl LogisticRegression {
    /// Create an unfitted model.
    #[must_use]
    pub fn new(params: LogisticParams) -> Self {
        Self {
            params,
            fitted: None,
        }
    }

    /// Borrow the hyperparameters.
    #[must_use]
    pub fn params(&self) -> &LogisticParams {
        &self.params
    }

    /// Return the fitted coefficients, if fitted.
    #[must_use]
    pub fn coef(&self) -> Option<&[f64]> {
        self.fitted.as_ref().map(|f| f.coef.as_slice())
    }

    /// Return the fitted intercept, if fitted.
    #[must_use]
    pub fn intercept(&self) -> Option<f64> {
        self.fitted.as_ref().map(|f| f.intercept)
    }

    /// Fit by damped Newton iterations.
    ///
    /// Stops when the largest coefficient step is below `tol`. Reaching
    /// `max_iter` first keeps the last iterate and logs a warning.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidParam`] for bad hyperparameters,
    /// [`ModelError::SingularHessian`] when a Newton system cannot be solved,
    /// and the input errors documented on [`check_training_set`].
    #[instrument(skip_all, fields(n_samples = features.len(), c = self.params.c))]
    pub fn fit(&mut self, features: &[Vec<f64>], labels: &[u8]) -> Result<(), ModelError> {
        self.params.validate()?;
        let n_features = check_training_set(features, labels)?;
        let weights = match self.params.class_weight {
            Some(ClassWeight::Balanced) => balanced_weights(labels),
            None => vec![1.0; labels.len()],
        };
        let objective = Objective {
            features,
            labels,
            weights: &weights,
            n_features,
            fit_intercept: self.params.fit_intercept,
            alpha: 1.0 / self.params.c,
        };

        let mut params = vec![0.0; objective.dim()];
        let mut loss = objective.loss(&params);
        let mut converged = false;
        let mut n_iter = 0;

        for iteration in 0..self.params.max_iter {
            n_iter = iteration + 1;
            let (grad, hess) = objective.derivatives(&params);
            let step = newton_step(&hess, &grad).ok_or(ModelError::SingularHessian { iteration })?;

            let mut scale = 1.0;
            let mut candidate: Vec<f64> = params.iter().zip(&step).map(|(b, d)| b - d).collect();
            let mut candidate_loss = objective.loss(&candidate);
            for _ in 0..MAX_BACKTRACK {
                if candidate_loss <= loss {
                    break;
                }
                scale *= 0.5;
                candidate = params.iter().zip(&step).map(|(b, d)| b - scale * d).collect();
                candidate_loss = objective.loss(&candidate);
            }

            let max_step = step.iter().fold(0.0f64, |m, d| m.max((scale * d).abs()));
            params = candidate;
            loss = candidate_loss;
            debug!(iteration, loss, max_step, "newton step");
            if max_step < self.params.tol {
                converged = true;
                break;
            }
        }

        if converged {
            info!(n_iter, loss, "logistic regression converged");
        } else {
            warn!(n_iter, loss, "logistic regression reached max_iter without converging");
        }

        let intercept = if self.params.fit_intercept { params[n_features] } else { 0.0 };
        params.truncate(n_features);
        self.fitted = Some(FittedLogistic {
            coef: params,
            intercept,
            n_iter,
        });
        Ok(())
    }

    /// Return `σ(x·β + b)` for each sample.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::NotFitted`] before [`LogisticRegression::fit`],
    /// or [`ModelError::PredictionFeatureMismatch`] for rows of the wrong width.
    pub fn predict_proba(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        let fitted = self
            .fitted
            .as_ref()
            .ok_or(ModelError::NotFitted { model: "logistic" })?;
        check_prediction_rows(features, fitted.coef.len())?;
        Ok(features
            .iter()
            .map(|row| {
                let z: f64 = row.iter().zip(&fitted.coef).map(|(x, b)| x * b).sum();
                sigmoid(z + fitted.intercept)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overlapping_data() -> (Vec<Vec<f64>>, Vec<u8>) {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for i in 0..60 {
            let x = i as f64 / 10.0 - 3.0;
            features.push(vec![x, (i % 3) as f64]);
            // Mostly increasing in x with some overlap.
            labels.push(u8::from(x > 0.5 || i % 9 == 0));
        }
        (features, labels)
    }

    #[test]
    fn sigmoid_and_softplus_stable() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!(sigmoid(800.0) == 1.0 && sigmoid(-800.0) == 0.0);
        assert!(softplus(800.0).is_finite());
        assert!((softplus(0.0) - 2f64.ln()).abs() < 1e-12);
    }

    #[test]
    fn newton_step_solves_spd_system() {
        let a = Mat::<f64>::from_fn(2, 2, |i, j| [[4.0, 2.0], [2.0, 3.0]][i][j]);
        let x = newton_step(&a, &[2.0, 1.0]).unwrap();
        assert!((4.0 * x[0] + 2.0 * x[1] - 2.0).abs() < 1e-12);
        assert!((2.0 * x[0] + 3.0 * x[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn newton_step_rejects_indefinite_hessian() {
        assert!(newton_step(&Mat::<f64>::zeros(1, 1), &[1.0]).is_none());
        let indefinite = Mat::<f64>::from_fn(2, 2, |i, j| [[1.0, 2.0], [2.0, 1.0]][i][j]);
        assert!(newton_step(&indefinite, &[1.0, 1.0]).is_none());
    }

    #[test]
    fn gradient_vanishes_at_solution() {
        let (features, labels) = overlapping_data();
        let mut model = LogisticRegression::new(LogisticParams::default().with_tol(1e-10));
        model.fit(&features, &labels).unwrap();

        let coef = model.coef().unwrap();
        let b = model.intercept().unwrap();
        let mut grad = [coef[0], coef[1], 0.0];
        for (row, &y) in features.iter().zip(&labels) {
            let p = sigmoid(row[0] * coef[0] + row[1] * coef[1] + b);
            let r = p - f64::from(y);
            grad[0] += r * row[0];
            grad[1] += r * row[1];
            grad[2] += r;
        }
        assert!(grad.iter().all(|g| g.abs() < 1e-6), "gradient = {grad:?}");
        assert!(coef[0] > 0.0);
    }

    #[test]
    fn stronger_penalty_shrinks_coefficients() {
        let (features, labels) = overlapping_data();
        let mut loose = LogisticRegression::new(LogisticParams::default().with_c(10.0));
        let mut tight = LogisticRegression::new(LogisticParams::default().with_c(0.01));
        loose.fit(&features, &labels).unwrap();
        tight.fit(&features, &labels).unwrap();
        assert!(tight.coef().unwrap()[0].abs() < loose.coef().unwrap()[0].abs());
    }

    #[test]
    fn balanced_weights_raise_minority_scores() {
        let features: Vec<Vec<f64>> = (0..50).map(|i| vec![(i % 10) as f64]).collect();
        let labels: Vec<u8> = (0..50).map(|i| u8::from(i % 10 >= 8 && i < 30)).collect();
        let mut plain = LogisticRegression::new(LogisticParams::default());
        let mut balanced = LogisticRegression::new(
            LogisticParams::default().with_class_weight(Some(ClassWeight::Balanced)),
        );
        plain.fit(&features, &labels).unwrap();
        balanced.fit(&features, &labels).unwrap();
        let probe = [vec![9.0]];
        assert!(balanced.predict_proba(&probe).unwrap()[0] > plain.predict_proba(&probe).unwrap()[0]);
    }

    #[test]
    fn predict_before_fit_errors() {
        let model = LogisticRegression::new(LogisticParams::default());
        assert!(matches!(
            model.predict_proba(&[vec![0.0]]),
            Err(ModelError::NotFitted { model: "logistic" })
        ));
    }
}
