//! Cost-sensitive decision threshold search over a fixed grid.

use tracing::{info, instrument};

use crate::error::EvalError;
use crate::metrics::check_inputs;

/// Unit costs of the two error kinds.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CostWeights {
    c_fn: f64,
    c_fp: f64,
}

impl CostWeights {
    /// Create cost weights.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::InvalidCost`] if either weight is negative or non-finite.
    pub fn new(c_fn: f64, c_fp: f64) -> Result<Self, EvalError> {
        for (name, value) in [("fn", c_fn), ("fp", c_fp)] {
            if !value.is_finite() || value < 0.0 {
                return Err(EvalError::InvalidCost { name, value });
            }
        }
        Ok(Self { c_fn, c_fp })
    }

    /// Cost of one missed positive.
    #[must_use]
    pub fn c_fn(&self) -> f64 {
        self.c_fn
    }

    /// Cost of one false alarm.
    #[must_use]
    pub fn c_fp(&self) -> f64 {
        self.c_fp
    }

    /// Total cost of the given error counts.
    #[must_use]
    pub fn cost(&self, false_negatives: usize, false_positives: usize) -> f64 {
        self.c_fn * false_negatives as f64 + self.c_fp * false_positives as f64
    }
}

/// Outcome of predicting positive at `probability >= threshold`.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ThresholdDecision {
    /// Decision threshold in [0, 1].
    pub threshold: f64,
    /// `c_fn · fn + c_fp · fp`.
    pub cost: f64,
    /// False positive count.
    pub fp: usize,
    /// False negative count.
    #[serde(rename = "fn")]
    pub fn_: usize,
}

/// Ascending, validated thresholds in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdGrid(Vec<f64>);

impl ThresholdGrid {
    /// `n_points` evenly spaced thresholds from 0 to 1 inclusive.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::InvalidThresholdGrid`] if `n_points` < 2.
    pub fn uniform(n_points: usize) -> Result<Self, EvalError> {
        if n_points < 2 {
            return Err(EvalError::InvalidThresholdGrid {
                reason: format!("need at least 2 points, got {n_points}"),
            });
        }
        let last = (n_points - 1) as f64;
        Ok(Self((0..n_points).map(|i| i as f64 / last).collect()))
    }

    /// Validate an explicit grid.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::InvalidThresholdGrid`] if the grid is empty, not
    /// strictly ascending, or leaves [0, 1].
    pub fn from_values(values: Vec<f64>) -> Result<Self, EvalError> {
        if values.is_empty() {
            return Err(EvalError::InvalidThresholdGrid {
                reason: "grid is empty".into(),
            });
        }
        if let Some(v) = values.iter().find(|v| !(0.0..=1.0).contains(*v)) {
            return Err(EvalError::InvalidThresholdGrid {
                reason: format!("threshold {v} is outside [0, 1]"),
            });
        }
        if let Some(w) = values.windows(2).find(|w| w[0] >= w[1]) {
            return Err(EvalError::InvalidThresholdGrid {
                reason: format!("thresholds not strictly ascending at {} -> {}", w[0], w[1]),
            });
        }
        Ok(Self(values))
    }

    /// Borrow the thresholds.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.0
    }
}

/// The full cost curve and its minimum.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CostCurve {
    /// The minimum-cost decision, lowest threshold among ties.
    pub optimal: ThresholdDecision,
    /// One decision per grid threshold, ascending.
    pub curve: Vec<ThresholdDecision>,
}

impl CostCurve {
    /// The curve entry at exactly `threshold`, if the grid contains it.
    #[must_use]
    pub fn at(&self, threshold: f64) -> Option<&ThresholdDecision> {
        self.curve.iter().find(|d| d.threshold == threshold)
    }
}

/// Evaluate every grid threshold and pick the cheapest.
///
/// A sample is predicted positive when its probability is at least the
/// threshold. The minimum is found by a fold over the ascending curve that
/// only replaces the incumbent on a strictly lower cost.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`EvalError::EmptyDataset`] | zero labels |
/// | [`EvalError::LengthMismatch`] | `proba.len() != labels.len()` |
/// | [`EvalError::InvalidLabel`] | a label is not 0/1 |
/// | [`EvalError::InvalidProbability`] | a probability is outside [0, 1] |
#[instrument(skip_all, fields(n_samples = labels.len(), n_thresholds = grid.values().len()))]
pub fn optimize_threshold(
    labels: &[u8],
    proba: &[f64],
    weights: CostWeights,
    grid: &ThresholdGrid,
) -> Result<CostCurve, EvalError> {
    check_inputs(labels, proba)?;

    let mut positives: Vec<f64> = Vec::new();
    let mut negatives: Vec<f64> = Vec::new();
    for (&y, &p) in labels.iter().zip(proba) {
        if y == 1 {
            positives.push(p);
        } else {
            negatives.push(p);
        }
    }
    positives.sort_by(f64::total_cmp);
    negatives.sort_by(f64::total_cmp);

    let curve: Vec<ThresholdDecision> = grid
        .values()
        .iter()
        .map(|&threshold| {
            let fn_ = positives.partition_point(|&p| p < threshold);
            let fp = negatives.len() - negatives.partition_point(|&p| p < threshold);
            ThresholdDecision {
                threshold,
                cost: weights.cost(fn_, fp),
                fp,
                fn_,
            }
        })
        .collect();

    let optimal = curve
        .iter()
        .skip(1)
        .fold(curve[0], |best, d| if d.cost < best.cost { *d } else { best });

    info!(
        threshold = optimal.threshold,
        cost = optimal.cost,
        fp = optimal.fp,
        fn_ = optimal.fn_,
        "cost-optimal threshold"
    );
    Ok(CostCurve { optimal, curve })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_grid_endpoints() {
        let grid = ThresholdGrid::uniform(1001).unwrap();
        let v = grid.values();
        assert_eq!(v.len(), 1001);
        assert_eq!(v[0], 0.0);
        assert_eq!(v[500], 0.5);
        assert_eq!(v[1000], 1.0);
        assert!(ThresholdGrid::uniform(1).is_err());
    }

    #[test]
    fn explicit_grid_validated() {
        assert!(ThresholdGrid::from_values(vec![]).is_err());
        assert!(ThresholdGrid::from_values(vec![0.2, 0.1]).is_err());
        assert!(ThresholdGrid::from_values(vec![0.2, 0.2]).is_err());
        assert!(ThresholdGrid::from_values(vec![0.0, 1.5]).is_err());
        assert!(ThresholdGrid::from_values(vec![0.0, 0.3, 1.0]).is_ok());
    }

    #[test]
    fn negative_cost_rejected() {
        assert!(matches!(
            CostWeights::new(-1.0, 1.0),
            Err(EvalError::InvalidCost { name: "fn", .. })
        ));
        assert!(CostWeights::new(1.0, f64::NAN).is_err());
    }

    #[test]
    fn counts_are_inclusive() {
        let labels = [0, 0, 1, 1];
        let proba = [0.2, 0.6, 0.6, 0.9];
        let grid = ThresholdGrid::from_values(vec![0.6]).unwrap();
        let weights = CostWeights::new(1.0, 1.0).unwrap();
        let result = optimize_threshold(&labels, &proba, weights, &grid).unwrap();
        let d = result.curve[0];
        assert_eq!((d.fp, d.fn_), (1, 0));
    }

    #[test]
    fn asymmetric_cost_prefers_low_threshold() {
        let labels = [0, 0, 0, 0, 1, 1];
        let proba = [0.05, 0.1, 0.3, 0.45, 0.35, 0.8];
        let weights = CostWeights::new(10.0, 1.0).unwrap();
        let grid = ThresholdGrid::uniform(101).unwrap();
        let result = optimize_threshold(&labels, &proba, weights, &grid).unwrap();
        // Catching the 0.35 positive costs one false alarm (0.45) at most.
        assert!(result.optimal.threshold < 0.5);
        assert_eq!(result.optimal.fn_, 0);
        let at_half = result.at(0.5).unwrap();
        assert!(result.optimal.cost <= at_half.cost);
    }

    #[test]
    fn ties_resolve_to_lowest_threshold() {
        let labels = [0, 1];
        let proba = [0.2, 0.8];
        let weights = CostWeights::new(1.0, 1.0).unwrap();
        let grid = ThresholdGrid::uniform(11).unwrap();
        let result = optimize_threshold(&labels, &proba, weights, &grid).unwrap();
        // Zero cost for every threshold in (0.2, 0.8]; 0.3 is the first.
        assert_eq!(result.optimal.cost, 0.0);
        assert!((result.optimal.threshold - 0.3).abs() < 1e-12);
    }

    #[test]
    fn curve_is_ascending_and_non_negative() {
        let labels: Vec<u8> = (0..50).map(|i| u8::from(i % 4 == 0)).collect();
        let proba: Vec<f64> = (0..50).map(|i| (i as f64 * 0.37) % 1.0).collect();
        let weights = CostWeights::new(5.0, 1.0).unwrap();
        let grid = ThresholdGrid::uniform(201).unwrap();
        let result = optimize_threshold(&labels, &proba, weights, &grid).unwrap();
        assert_eq!(result.curve.len(), 201);
        assert!(result.curve.windows(2).all(|w| w[0].threshold < w[1].threshold));
        assert!(result.curve.iter().all(|d| d.cost >= 0.0));
        assert!(result.curve.iter().all(|d| result.optimal.cost <= d.cost));
    }
}
