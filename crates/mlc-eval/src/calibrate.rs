//! Probability calibration: sigmoid (Platt) and isotonic maps fitted on
//! internal out-of-fold scores, wrapped around a base classifier.

use std::fmt;
use std::str::FromStr;

use tracing::{debug, info, instrument};

use crate::cv::RepeatedStratifiedKFold;
use crate::error::EvalError;
use crate::oof::oof_predict;
use crate::pipeline::{Classifier, check_labels, check_probabilities};
use crate::table::Table;

/// Calibration map family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationMethod {
    /// Logistic (Platt) scaling of the raw score.
    #[default]
    Sigmoid,
    /// Monotone non-parametric step function (pool adjacent violators).
    Isotonic,
}

impl FromStr for CalibrationMethod {
    type Err = EvalError;

    /// Parse `sigmoid` or `isotonic`, ignoring ASCII case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sigmoid" => Ok(Self::Sigmoid),
            "isotonic" => Ok(Self::Isotonic),
            _ => Err(EvalError::InvalidCalibrationMethod {
                method: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for CalibrationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sigmoid => f.write_str("sigmoid"),
            Self::Isotonic => f.write_str("isotonic"),
        }
    }
}

const PLATT_MAX_ITER: usize = 100;
const PLATT_MIN_STEP: f64 = 1e-10;
const PLATT_SIGMA: f64 = 1e-12;
const PLATT_EPS: f64 = 1e-5;

/// Platt scaling: `p = 1 / (1 + exp(a·s + b))`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Platt {
    a: f64,
    b: f64,
}

impl Platt {
    /// Fit `a`, `b` by regularised maximum likelihood.
    ///
    /// Targets are smoothed to `(n₊ + 1) / (n₊ + 2)` and `1 / (n₋ + 2)`;
    /// the likelihood is maximised by Newton steps with backtracking.
    #[must_use]
    pub fn fit(scores: &[f64], labels: &[u8]) -> Self {
        let n_pos = labels.iter().filter(|&&y| y == 1).count() as f64;
        let n_neg = labels.len() as f64 - n_pos;
        let hi = (n_pos + 1.0) / (n_pos + 2.0);
        let lo = 1.0 / (n_neg + 2.0);
        let targets: Vec<f64> = labels.iter().map(|&y| if y == 1 { hi } else { lo }).collect();

        let objective = |a: f64, b: f64| -> f64 {
            scores
                .iter()
                .zip(&targets)
                .map(|(&s, &t)| {
                    let z = s * a + b;
                    if z >= 0.0 {
                        t * z + (-z).exp().ln_1p()
                    } else {
                        (t - 1.0) * z + z.exp().ln_1p()
                    }
                })
                .sum()
        };

        let mut a = 0.0;
        let mut b = ((n_neg + 1.0) / (n_pos + 1.0)).ln();
        let mut fval = objective(a, b);

        for iter in 0..PLATT_MAX_ITER {
            let (mut h11, mut h22, mut h21) = (PLATT_SIGMA, PLATT_SIGMA, 0.0);
            let (mut g1, mut g2) = (0.0, 0.0);
            for (&s, &t) in scores.iter().zip(&targets) {
                let z = s * a + b;
                let (p, q) = if z >= 0.0 {
                    let e = (-z).exp();
                    (e / (1.0 + e), 1.0 / (1.0 + e))
                } else {
                    let e = z.exp();
                    (1.0 / (1.0 + e), e / (1.0 + e))
                };
                let d2 = p * q;
                h11 += s * s * d2;
                h22 += d2;
                h21 += s * d2;
                let d1 = t - p;
                g1 += s * d1;
                g2 += d1;
            }
            if g1.abs() < PLATT_EPS && g2.abs() < PLATT_EPS {
                debug!(iter, a, b, "platt converged");
                break;
            }

            let det = h11 * h22 - h21 * h21;
            let da = -(h22 * g1 - h21 * g2) / det;
            let db = -(-h21 * g1 + h11 * g2) / det;
            let gd = g1 * da + g2 * db;

            let mut step = 1.0;
            while step >= PLATT_MIN_STEP {
                let (na, nb) = (a + step * da, b + step * db);
                let nf = objective(na, nb);
                if nf < fval + 1e-4 * step * gd {
                    (a, b, fval) = (na, nb, nf);
                    break;
                }
                step /= 2.0;
            }
            if step < PLATT_MIN_STEP {
                debug!(iter, "platt line search stalled");
                break;
            }
        }
        Self { a, b }
    }

    /// Map a raw score to a probability.
    #[must_use]
    pub fn apply(&self, score: f64) -> f64 {
        let z = self.a * score + self.b;
        if z >= 0.0 {
            let e = (-z).exp();
            e / (1.0 + e)
        } else {
            1.0 / (1.0 + z.exp())
        }
    }
}

/// Isotonic step map with linear interpolation between fitted points.
///
/// Scores outside the fitted range are clipped to its ends.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Isotonic {
    x: Vec<f64>,
    y: Vec<f64>,
}

impl Isotonic {
    /// Fit a non-decreasing map from scores to label frequency.
    ///
    /// Equal scores are pooled first; the pool-adjacent-violators pass then
    /// merges any decreasing neighbours. Only the end points of each
    /// constant run are kept.
    #[must_use]
    pub fn fit(scores: &[f64], labels: &[u8]) -> Self {
        let mut pairs: Vec<(f64, f64)> = scores
            .iter()
            .zip(labels)
            .map(|(&s, &y)| (s, f64::from(y)))
            .collect();
        pairs.sort_by(|l, r| l.0.total_cmp(&r.0));

        // (score, sum of labels, weight)
        let mut unique: Vec<(f64, f64, f64)> = Vec::new();
        for (s, y) in pairs {
            match unique.last_mut() {
                Some(last) if last.0 == s => {
                    last.1 += y;
                    last.2 += 1.0;
                }
                _ => unique.push((s, y, 1.0)),
            }
        }

        // Blocks of (sum, weight, number of unique points).
        let mut blocks: Vec<(f64, f64, usize)> = Vec::with_capacity(unique.len());
        for &(_, sum, weight) in &unique {
            blocks.push((sum, weight, 1));
            while blocks.len() > 1 {
                let last = blocks[blocks.len() - 1];
                let prev = blocks[blocks.len() - 2];
                if prev.0 / prev.1 > last.0 / last.1 {
                    blocks.pop();
                    if let Some(merged) = blocks.last_mut() {
                        merged.0 += last.0;
                        merged.1 += last.1;
                        merged.2 += last.2;
                    }
                } else {
                    break;
                }
            }
        }

        let fitted: Vec<f64> = blocks
            .iter()
            .flat_map(|&(sum, weight, len)| std::iter::repeat_n(sum / weight, len))
            .collect();

        let mut x = Vec::new();
        let mut y = Vec::new();
        let last = fitted.len().saturating_sub(1);
        for (i, (&(s, _, _), &v)) in unique.iter().zip(&fitted).enumerate() {
            let keep = i == 0 || i == last || fitted[i - 1] != v || fitted[i + 1] != v;
            if keep {
                x.push(s);
                y.push(v);
            }
        }
        Self { x, y }
    }

    /// Map a raw score to a probability.
    #[must_use]
    pub fn apply(&self, score: f64) -> f64 {
        let (Some(&x_min), Some(&x_max)) = (self.x.first(), self.x.last()) else {
            return 0.5;
        };
        let s = score.clamp(x_min, x_max);
        let idx = self.x.partition_point(|&xi| xi <= s);
        if idx == 0 {
            return self.y[0];
        }
        if idx >= self.x.len() {
            return self.y[self.x.len() - 1];
        }
        let (x0, x1) = (self.x[idx - 1], self.x[idx]);
        let (y0, y1) = (self.y[idx - 1], self.y[idx]);
        y0 + (y1 - y0) * (s - x0) / (x1 - x0)
    }
}

/// A fitted calibration map.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum CalibrationMap {
    /// Platt scaling.
    Sigmoid(Platt),
    /// Isotonic regression.
    Isotonic(Isotonic),
}

impl CalibrationMap {
    /// Fit a map of the given family.
    #[must_use]
    pub fn fit(method: CalibrationMethod, scores: &[f64], labels: &[u8]) -> Self {
        match method {
            CalibrationMethod::Sigmoid => Self::Sigmoid(Platt::fit(scores, labels)),
            CalibrationMethod::Isotonic => Self::Isotonic(Isotonic::fit(scores, labels)),
        }
    }

    /// Remap a raw score. Output is clamped to [0, 1].
    #[must_use]
    pub fn apply(&self, score: f64) -> f64 {
        let p = match self {
            Self::Sigmoid(platt) => platt.apply(score),
            Self::Isotonic(iso) => iso.apply(score),
        };
        p.clamp(0.0, 1.0)
    }
}

/// Settings for cross-validated calibration.
#[derive(Debug, Clone)]
pub struct Calibrator {
    method: CalibrationMethod,
    n_folds: usize,
    seed: u64,
}

impl Calibrator {
    /// Create a calibrator with `n_folds` internal folds (5 is the usual choice).
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::InvalidFoldCount`] if `n_folds` < 2.
    pub fn new(method: CalibrationMethod, n_folds: usize) -> Result<Self, EvalError> {
        if n_folds < 2 {
            return Err(EvalError::InvalidFoldCount { n_splits: n_folds });
        }
        Ok(Self {
            method,
            n_folds,
            seed: 42,
        })
    }

    /// Set the seed for the internal fold shuffle.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Return the method.
    #[must_use]
    pub fn method(&self) -> CalibrationMethod {
        self.method
    }

    /// Wrap `base` and fit the wrapper on the full training set.
    ///
    /// # Errors
    ///
    /// Propagates any [`EvalError`] from the internal folds or the final refit.
    pub fn calibrate<C: Classifier>(
        &self,
        base: C,
        table: &Table,
        labels: &[u8],
    ) -> Result<CalibratedModel<C>, EvalError> {
        let mut model = CalibratedModel {
            method: self.method,
            n_folds: self.n_folds,
            seed: self.seed,
            base: base.fresh(),
            map: None,
        };
        model.fit(table, labels)?;
        Ok(model)
    }
}

/// A base classifier followed by a calibration map.
///
/// Fitting scores the training rows out-of-fold with fresh copies of the
/// base, fits the map on those scores, then refits the base on every row.
/// The wrapper owns its base exclusively.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CalibratedModel<C> {
    method: CalibrationMethod,
    n_folds: usize,
    seed: u64,
    base: C,
    map: Option<CalibrationMap>,
}

impl<C> CalibratedModel<C> {
    /// Borrow the wrapped classifier.
    #[must_use]
    pub fn base(&self) -> &C {
        &self.base
    }

    /// Return the calibration family.
    #[must_use]
    pub fn method(&self) -> CalibrationMethod {
        self.method
    }

    /// Return the fitted map, if any.
    #[must_use]
    pub fn map(&self) -> Option<&CalibrationMap> {
        self.map.as_ref()
    }
}

impl<C: Classifier> Classifier for CalibratedModel<C> {
    fn fresh(&self) -> Self {
        Self {
            method: self.method,
            n_folds: self.n_folds,
            seed: self.seed,
            base: self.base.fresh(),
            map: None,
        }
    }

    #[instrument(skip_all, fields(method = %self.method, n_folds = self.n_folds, n_rows = features.n_rows()))]
    fn fit(&mut self, features: &Table, labels: &[u8]) -> Result<(), EvalError> {
        check_labels(labels, features.n_rows())?;
        let cv = RepeatedStratifiedKFold::new(self.n_folds, 1)?.with_seed(self.seed);
        let scores = oof_predict(&self.base, features, labels, &cv)?;
        let map = CalibrationMap::fit(self.method, &scores.probabilities, labels);

        let mut base = self.base.fresh();
        base.fit(features, labels)?;
        self.base = base;
        self.map = Some(map);
        info!("calibrated model fitted");
        Ok(())
    }

    fn predict_proba(&self, features: &Table) -> Result<Vec<f64>, EvalError> {
        let map = self.map.as_ref().ok_or(EvalError::NotFitted {
            what: "calibrated model",
        })?;
        let raw = self.base.predict_proba(features)?;
        let proba: Vec<f64> = raw.iter().map(|&s| map.apply(s)).collect();
        check_probabilities(&proba)?;
        Ok(proba)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::brier;
    use crate::pipeline::testing::{clustered, stub_pipeline};

    #[test]
    fn method_parsing() {
        assert_eq!("sigmoid".parse::<CalibrationMethod>().unwrap(), CalibrationMethod::Sigmoid);
        assert_eq!("Isotonic".parse::<CalibrationMethod>().unwrap(), CalibrationMethod::Isotonic);
        let err = "beta".parse::<CalibrationMethod>().unwrap_err();
        assert!(matches!(err, EvalError::InvalidCalibrationMethod { method } if method == "beta"));
    }

    #[test]
    fn platt_is_increasing_for_informative_scores() {
        let scores: Vec<f64> = (0..100).map(|i| i as f64 / 100.0).collect();
        let labels: Vec<u8> = (0..100).map(|i| u8::from(i >= 70)).collect();
        let platt = Platt::fit(&scores, &labels);
        assert!(platt.apply(0.9) > platt.apply(0.5));
        assert!(platt.apply(0.1) < 0.1);
        assert!(platt.apply(0.95) > 0.9);
    }

    #[test]
    fn platt_without_signal_returns_base_rate() {
        let scores = vec![0.5; 50];
        let labels: Vec<u8> = (0..50).map(|i| u8::from(i < 10)).collect();
        let p = Platt::fit(&scores, &labels).apply(0.5);
        // Smoothed targets: (10·11/12 + 40·1/42) / 50
        let expected = (10.0 * 11.0 / 12.0 + 40.0 / 42.0) / 50.0;
        assert!((p - expected).abs() < 1e-3, "{p} vs {expected}");
    }

    #[test]
    fn isotonic_pools_violators() {
        let scores = [0.1, 0.2, 0.3, 0.4];
        let labels = [0, 1, 0, 1];
        let iso = Isotonic::fit(&scores, &labels);
        assert_eq!(iso.apply(0.1), 0.0);
        assert_eq!(iso.apply(0.2), 0.5);
        assert_eq!(iso.apply(0.3), 0.5);
        assert_eq!(iso.apply(0.4), 1.0);
        assert!((iso.apply(0.15) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn isotonic_clips_outside_range() {
        let iso = Isotonic::fit(&[0.2, 0.8], &[0, 1]);
        assert_eq!(iso.apply(-1.0), 0.0);
        assert_eq!(iso.apply(2.0), 1.0);
    }

    #[test]
    fn isotonic_pools_equal_scores() {
        let iso = Isotonic::fit(&[0.5, 0.5, 0.5, 0.9], &[0, 1, 1, 1]);
        assert!((iso.apply(0.5) - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(iso.apply(0.9), 1.0);
    }

    #[test]
    fn isotonic_is_monotone() {
        let scores: Vec<f64> = (0..200).map(|i| ((i * 37) % 200) as f64 / 200.0).collect();
        let labels: Vec<u8> = scores
            .iter()
            .enumerate()
            .map(|(i, &s)| u8::from(s + ((i * 13) % 7) as f64 / 20.0 > 0.6))
            .collect();
        let iso = Isotonic::fit(&scores, &labels);
        let mut prev = f64::NEG_INFINITY;
        for i in 0..=100 {
            let p = iso.apply(i as f64 / 100.0);
            assert!(p >= prev);
            prev = p;
        }
    }

    #[test]
    fn calibrated_model_predicts_in_range() {
        let (table, labels) = clustered(200, 20);
        for method in [CalibrationMethod::Sigmoid, CalibrationMethod::Isotonic] {
            let calibrator = Calibrator::new(method, 5).unwrap().with_seed(3);
            let model = calibrator.calibrate(stub_pipeline(), &table, &labels).unwrap();
            assert!(model.map().is_some());
            assert!(model.base().estimator().midpoint.is_some());
            let proba = model.predict_proba(&table).unwrap();
            assert_eq!(proba.len(), 200);
            assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
        }
    }

    #[test]
    fn calibration_lowers_brier_of_overconfident_scores() {
        let (table, labels) = clustered(200, 20);
        let mut raw = stub_pipeline();
        raw.fit(&table, &labels).unwrap();
        let raw_brier = brier(&labels, &raw.predict_proba(&table).unwrap());
        let model = Calibrator::new(CalibrationMethod::Isotonic, 5)
            .unwrap()
            .calibrate(stub_pipeline(), &table, &labels)
            .unwrap();
        let cal_brier = brier(&labels, &model.predict_proba(&table).unwrap());
        assert!(cal_brier <= raw_brier, "{cal_brier} > {raw_brier}");
    }

    #[test]
    fn unfitted_model_refuses_to_predict() {
        let (table, labels) = clustered(50, 10);
        let model = Calibrator::new(CalibrationMethod::Sigmoid, 2)
            .unwrap()
            .calibrate(stub_pipeline(), &table, &labels)
            .unwrap();
        let fresh = model.fresh();
        assert!(fresh.map().is_none());
        assert!(matches!(
            fresh.predict_proba(&table),
            Err(EvalError::NotFitted { .. })
        ));
    }

    #[test]
    fn too_few_folds_rejected() {
        assert!(Calibrator::new(CalibrationMethod::Sigmoid, 1).is_err());
    }
}
