//! Percentile bootstrap confidence intervals for scalar scorers.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{Span, debug, instrument};

use crate::error::EvalError;
use crate::metrics::check_inputs;

/// Mean and 2.5 / 97.5 percentiles of a bootstrapped statistic.
///
/// Serialized as `[mean, low, high]`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct ConfidenceInterval {
    /// Mean of the resampled statistic.
    pub mean: f64,
    /// 2.5th percentile.
    pub low: f64,
    /// 97.5th percentile.
    pub high: f64,
}

impl From<[f64; 3]> for ConfidenceInterval {
    fn from([mean, low, high]: [f64; 3]) -> Self {
        Self { mean, low, high }
    }
}

impl From<ConfidenceInterval> for [f64; 3] {
    fn from(ci: ConfidenceInterval) -> Self {
        [ci.mean, ci.low, ci.high]
    }
}

/// Bootstrap a scorer over `n_resamples` resamples of size N drawn with replacement.
///
/// Resample `b` draws its indices from a ChaCha stream keyed by `(seed, b)`,
/// so the result is identical whether resamples run sequentially or on the
/// rayon pool. Resampling is not stratified: a resample may hold a single
/// class, in which case the scorer's degenerate value is used.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`EvalError::InvalidResampleCount`] | `n_resamples` == 0 |
/// | [`EvalError::EmptyDataset`] | zero labels |
/// | [`EvalError::LengthMismatch`] | `proba.len() != labels.len()` |
/// | [`EvalError::InvalidLabel`] | a label is not 0/1 |
/// | [`EvalError::InvalidProbability`] | a probability is outside [0, 1] |
#[instrument(skip_all, fields(n_samples = labels.len(), n_resamples = n_resamples, seed = seed))]
pub fn bootstrap_ci<F>(
    labels: &[u8],
    proba: &[f64],
    scorer: F,
    n_resamples: usize,
    seed: u64,
) -> Result<ConfidenceInterval, EvalError>
where
    F: Fn(&[u8], &[f64]) -> f64 + Sync,
{
    if n_resamples == 0 {
        return Err(EvalError::InvalidResampleCount { n_resamples });
    }
    check_inputs(labels, proba)?;

    let n = labels.len();
    let span = Span::current();
    let mut stats: Vec<f64> = (0..n_resamples)
        .into_par_iter()
        .map(|b| {
            let _span = span.enter();
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            rng.set_stream(b as u64);
            let mut y = Vec::with_capacity(n);
            let mut p = Vec::with_capacity(n);
            for _ in 0..n {
                let i = rng.gen_range(0..n);
                y.push(labels[i]);
                p.push(proba[i]);
            }
            scorer(&y, &p)
        })
        .collect();

    stats.sort_by(f64::total_cmp);
    let mean = stats.iter().sum::<f64>() / stats.len() as f64;
    let ci = ConfidenceInterval {
        mean,
        low: percentile(&stats, 2.5),
        high: percentile(&stats, 97.5),
    };
    debug!(mean = ci.mean, low = ci.low, high = ci.high, "bootstrap complete");
    Ok(ci)
}

/// Linear-interpolation percentile of sorted, non-empty values.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{Confusion, Scorer, average_precision, brier, roc_auc};

    fn noisy_scores(n: usize) -> (Vec<u8>, Vec<f64>) {
        let labels: Vec<u8> = (0..n).map(|i| u8::from(i % 5 == 0)).collect();
        let proba = labels
            .iter()
            .enumerate()
            .map(|(i, &y)| {
                let noise = ((i * 37) % 50) as f64 / 100.0;
                if y == 1 { 0.3 + noise } else { noise * 0.8 }
            })
            .collect();
        (labels, proba)
    }

    #[test]
    fn percentile_matches_linear_interpolation() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&v, 0.0), 1.0);
        assert_eq!(percentile(&v, 100.0), 5.0);
        assert!((percentile(&v, 2.5) - 1.1).abs() < 1e-12);
        assert!((percentile(&v, 50.0) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn reproducible_with_same_seed() {
        let (labels, proba) = noisy_scores(200);
        let a = bootstrap_ci(&labels, &proba, roc_auc, 100, 5).unwrap();
        let b = bootstrap_ci(&labels, &proba, roc_auc, 100, 5).unwrap();
        assert_eq!(a, b);
        let c = bootstrap_ci(&labels, &proba, roc_auc, 100, 6).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn interval_brackets_mean() {
        let (labels, proba) = noisy_scores(300);
        for scorer in [roc_auc as Scorer, average_precision, brier] {
            let ci = bootstrap_ci(&labels, &proba, scorer, 200, 0).unwrap();
            assert!(ci.low <= ci.mean && ci.mean <= ci.high, "{ci:?}");
            assert!(ci.low >= 0.0 && ci.high <= 1.0);
        }
    }

    #[test]
    fn constant_statistic_collapses() {
        let labels = [0, 1, 0, 1];
        let proba = [0.2, 0.2, 0.2, 0.2];
        let ci = bootstrap_ci(&labels, &proba, |_, _| 0.5, 50, 1).unwrap();
        assert_eq!(ci, ConfidenceInterval { mean: 0.5, low: 0.5, high: 0.5 });
    }

    #[test]
    fn capturing_scorer_at_a_configured_threshold() {
        let (labels, proba) = noisy_scores(200);
        let threshold = 0.35;
        let f1_at = |y: &[u8], p: &[f64]| Confusion::at_threshold(y, p, threshold).f1();
        let ci = bootstrap_ci(&labels, &proba, f1_at, 100, 3).unwrap();
        assert!(ci.low <= ci.mean && ci.mean <= ci.high, "{ci:?}");
        let point = Confusion::at_threshold(&labels, &proba, threshold).f1();
        assert!(ci.low <= point && point <= ci.high, "{point} outside {ci:?}");
    }

    #[test]
    fn zero_resamples_rejected() {
        let err = bootstrap_ci(&[0, 1], &[0.1, 0.9], roc_auc, 0, 0).unwrap_err();
        assert!(matches!(err, EvalError::InvalidResampleCount { n_resamples: 0 }));
    }

    #[test]
    fn serializes_as_triple() {
        let ci = ConfidenceInterval { mean: 0.5, low: 0.25, high: 0.75 };
        assert_eq!(serde_json::to_string(&ci).unwrap(), "[0.5,0.25,0.75]");
    }
}
