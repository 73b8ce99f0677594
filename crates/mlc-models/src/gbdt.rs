//! Histogram gradient boosting for binary log-loss.

use tracing::{debug, info, instrument};

use crate::error::ModelError;
use crate::histogram::FeatureBins;
use crate::logistic::{sigmoid, softplus};
use crate::node::{Arena, FeatureIndex, NodeIndex, Tree};
use crate::params::{DEFAULT_SEED, HistGbdtParams};
use crate::validate::{check_prediction_rows, check_training_set, column_major};

/// Nodes whose hessian sum falls below this are not split.
const MIN_HESSIAN_TO_SPLIT: f64 = 1e-3;

/// Gradient-boosted regression trees on the raw log-odds.
///
/// Starts from the training log-odds and adds one shrunken Newton step tree
/// per iteration. Class weights are not supported.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct HistGradientBoosting {
    params: HistGbdtParams,
    fitted: Option<FittedBoosting>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct FittedBoosting {
    baseline: f64,
    trees: Vec<Tree>,
    n_features: usize,
}

/// Per-bin gradient statistics.
#[derive(Debug, Clone, Copy, Default)]
struct BinStats {
    grad: f64,
    hess: f64,
    count: usize,
}

/// Read-only state shared by every node of one boosting tree.
struct GrowContext<'a> {
    binned: &'a [Vec<u8>],
    bins: &'a FeatureBins,
    grad: &'a [f64],
    hess: &'a [f64],
    params: &'a HistGbdtParams,
}

impl GrowContext<'_> {
    fn leaf_value(&self, g: f64, h: f64) -> f64 {
        let denom = h + self.params.l2_regularization;
        if denom <= 0.0 {
            return 0.0;
        }
        -g / denom * self.params.learning_rate
    }

    fn score(&self, g: f64, h: f64) -> f64 {
        let denom = h + self.params.l2_regularization;
        if denom <= 0.0 { 0.0 } else { g * g / denom }
    }

    fn grow(&self, indices: &[usize], depth: usize, arena: &mut Arena) -> NodeIndex {
        let n_samples = indices.len();
        let g: f64 = indices.iter().map(|&i| self.grad[i]).sum();
        let h: f64 = indices.iter().map(|&i| self.hess[i]).sum();

        let can_split = depth < self.params.max_depth
            && n_samples >= 2 * self.params.min_samples_leaf
            && h >= MIN_HESSIAN_TO_SPLIT;
        let split = if can_split { self.best_split(indices, g, h) } else { None };
        let Some((feat, bin)) = split else {
            return arena.leaf(self.leaf_value(g, h), n_samples);
        };

        let col = &self.binned[feat];
        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) =
            indices.iter().partition(|&&i| usize::from(col[i]) <= bin);

        let node = arena.reserve(n_samples);
        let left = self.grow(&left_indices, depth + 1, arena);
        let right = self.grow(&right_indices, depth + 1, arena);
        arena.set_split(
            node,
            FeatureIndex::new(feat),
            self.bins.threshold(feat, bin),
            left,
            right,
        );
        node
    }

    /// Highest-gain `(feature, bin)` boundary, scanning every feature's histogram.
    fn best_split(&self, indices: &[usize], g: f64, h: f64) -> Option<(usize, usize)> {
        let parent_score = self.score(g, h);
        let min_leaf = self.params.min_samples_leaf;
        let mut best_gain = 0.0;
        let mut best = None;

        for (feat, col) in self.binned.iter().enumerate() {
            let n_bins = self.bins.n_bins(feat);
            if n_bins < 2 {
                continue;
            }
            let mut hist = vec![BinStats::default(); n_bins];
            for &i in indices {
                let stats = &mut hist[usize::from(col[i])];
                stats.grad += self.grad[i];
                stats.hess += self.hess[i];
                stats.count += 1;
            }

            let mut left = BinStats::default();
            for (bin, stats) in hist.iter().enumerate().take(n_bins - 1) {
                left.grad += stats.grad;
                left.hess += stats.hess;
                left.count += stats.count;
                let n_right = indices.len() - left.count;
                if left.count < min_leaf || n_right < min_leaf {
                    continue;
                }
                let (gr, hr) = (g - left.grad, h - left.hess);
                if left.hess < MIN_HESSIAN_TO_SPLIT || hr < MIN_HESSIAN_TO_SPLIT {
                    continue;
                }
                let gain = self.score(left.grad, left.hess) + self.score(gr, hr) - parent_score;
                if gain > best_gain {
                    best_gain = gain;
                    best = Some((feat, bin));
                }
            }
        }
        best
    }
}

impl HistGradientBoosting {
    /// Create an unfitted booster.
    #[must_use]
    pub fn new(params: HistGbdtParams) -> Self {
        Self {
            params,
            fitted: None,
        }
    }

    /// Borrow the hyperparameters.
    #[must_use]
    pub fn params(&self) -> &HistGbdtParams {
        &self.params
    }

    /// Return the number of fitted boosting rounds.
    #[must_use]
    pub fn n_iter(&self) -> usize {
        self.fitted.as_ref().map_or(0, |f| f.trees.len())
    }

    /// Run `max_iter` boosting rounds.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidParam`] for bad hyperparameters and the
    /// input errors documented on [`check_training_set`].
    #[instrument(skip_all, fields(max_iter = self.params.max_iter, n_samples = features.len()))]
    pub fn fit(&mut self, features: &[Vec<f64>], labels: &[u8]) -> Result<(), ModelError> {
        self.params.validate()?;
        let n_features = check_training_set(features, labels)?;
        let n_samples = features.len();

        let cols = column_major(features, n_features);
        let seed = self.params.random_state.unwrap_or(DEFAULT_SEED);
        let bins = FeatureBins::build(&cols, self.params.max_bins, seed);
        let binned = bins.bin_columns(&cols);

        let n_pos = labels.iter().filter(|&&y| y == 1).count() as f64;
        let prior = n_pos / n_samples as f64;
        let baseline = (prior / (1.0 - prior)).ln();

        info!(n_samples, n_features, baseline, "training histogram gradient boosting");

        let mut raw = vec![baseline; n_samples];
        let mut grad = vec![0.0; n_samples];
        let mut hess = vec![0.0; n_samples];
        let mut trees = Vec::with_capacity(self.params.max_iter);
        let all: Vec<usize> = (0..n_samples).collect();

        for iteration in 0..self.params.max_iter {
            for i in 0..n_samples {
                let p = sigmoid(raw[i]);
                grad[i] = p - f64::from(labels[i]);
                hess[i] = p * (1.0 - p);
            }
            let ctx = GrowContext {
                binned: &binned,
                bins: &bins,
                grad: &grad,
                hess: &hess,
                params: &self.params,
            };
            let mut arena = Arena::default();
            ctx.grow(&all, 0, &mut arena);
            let tree = arena.finish();

            for (r, row) in raw.iter_mut().zip(features) {
                *r += tree.value(row);
            }
            if iteration % 20 == 0 {
                debug!(iteration, n_leaves = tree.n_leaves(), log_loss = log_loss(&raw, labels), "boosting");
            }
            trees.push(tree);
        }

        self.fitted = Some(FittedBoosting {
            baseline,
            trees,
            n_features,
        });
        Ok(())
    }

    /// Return the positive-class probability for each sample.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::NotFitted`] before [`HistGradientBoosting::fit`],
    /// or [`ModelError::PredictionFeatureMismatch`] for rows of the wrong width.
    pub fn predict_proba(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        let fitted = self
            .fitted
            .as_ref()
            .ok_or(ModelError::NotFitted { model: "hist_gbdt" })?;
        check_prediction_rows(features, fitted.n_features)?;
        Ok(features
            .iter()
            .map(|row| {
                let raw = fitted.baseline + fitted.trees.iter().map(|t| t.value(row)).sum::<f64>();
                sigmoid(raw)
            })
            .collect())
    }
}

fn log_loss(raw: &[f64], labels: &[u8]) -> f64 {
    let total: f64 = raw
        .iter()
        .zip(labels)
        .map(|(&r, &y)| softplus(r) - f64::from(y) * r)
        .sum();
    total / raw.len() as f64
}
