//! Random forest training with parallel tree construction.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::iter::{IntoParallelIterator, IntoParallelRefIterator, ParallelIterator};
use tracing::{debug, info, instrument};

use crate::error::ModelError;
use crate::node::Tree;
use crate::params::{ClassWeight, DEFAULT_SEED, RandomForestParams};
use crate::tree::{TreeGrowth, grow_classifier};
use crate::validate::{balanced_weights, check_prediction_rows, check_training_set, column_major};

/// A random forest of weighted CART trees.
///
/// The positive-class probability is the mean of the leaf positive fractions
/// reached in every tree.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RandomForest {
    params: RandomForestParams,
    fitted: Option<FittedForest>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct FittedForest {
    trees: Vec<Tree>,
    n_features: usize,
}

/// Draw `n_samples` indices with replacement.
fn bootstrap_sample(n_samples: usize, rng: &mut impl Rng) -> Vec<usize> {
    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
}

impl RandomForest {
    /// Create an unfitted forest.
    #[must_use]
    pub fn new(params: RandomForestParams) -> Self {
        Self {
            params,
            fitted: None,
        }
    }

    /// Borrow the hyperparameters.
    #[must_use]
    pub fn params(&self) -> &RandomForestParams {
        &self.params
    }

    /// Borrow the fitted trees, or an empty slice before fitting.
    #[must_use]
    pub fn trees(&self) -> &[Tree] {
        self.fitted.as_ref().map_or(&[], |f| f.trees.as_slice())
    }

    /// Train the ensemble.
    ///
    /// Per-tree seeds are drawn from the master seed before any tree is
    /// built, so the result does not depend on thread scheduling.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidParam`] for bad hyperparameters and the
    /// input errors documented on [`check_training_set`].
    #[instrument(skip_all, fields(n_trees = self.params.n_trees, n_samples = features.len()))]
    pub fn fit(&mut self, features: &[Vec<f64>], labels: &[u8]) -> Result<(), ModelError> {
        self.params.validate()?;
        let n_features = check_training_set(features, labels)?;
        let n_samples = features.len();
        let params = &self.params;

        let growth = TreeGrowth {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
            min_samples_leaf: params.min_samples_leaf,
            max_features: params.max_features.resolve(n_features),
        };
        let weights = match params.class_weight {
            Some(ClassWeight::Balanced) => balanced_weights(labels),
            None => vec![1.0; n_samples],
        };
        let cols = column_major(features, n_features);

        info!(
            n_trees = params.n_trees,
            n_samples,
            n_features,
            max_features = growth.max_features,
            bootstrap = params.bootstrap,
            "training random forest"
        );

        let mut master_rng = ChaCha8Rng::seed_from_u64(params.random_state.unwrap_or(DEFAULT_SEED));
        let tree_seeds: Vec<u64> = (0..params.n_trees).map(|_| master_rng.r#gen()).collect();
        let bootstrap = params.bootstrap;

        let trees: Vec<Tree> = tree_seeds
            .into_par_iter()
            .map(|seed| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                let indices = if bootstrap {
                    bootstrap_sample(n_samples, &mut rng)
                } else {
                    (0..n_samples).collect()
                };
                grow_classifier(&cols, labels, &weights, &indices, &growth, &mut rng)
            })
            .collect();

        debug!(
            n_trees_trained = trees.len(),
            mean_leaves = trees.iter().map(Tree::n_leaves).sum::<usize>() as f64 / trees.len() as f64,
            "tree training complete"
        );

        self.fitted = Some(FittedForest { trees, n_features });
        Ok(())
    }

    /// Return the averaged positive-class probability for each sample.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::NotFitted`] before [`RandomForest::fit`], or
    /// [`ModelError::PredictionFeatureMismatch`] for rows of the wrong width.
    pub fn predict_proba(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        let fitted = self
            .fitted
            .as_ref()
            .ok_or(ModelError::NotFitted { model: "rf" })?;
        check_prediction_rows(features, fitted.n_features)?;
        let n_trees = fitted.trees.len() as f64;
        Ok(features
            .par_iter()
            .map(|sample| fitted.trees.iter().map(|t| t.value(sample)).sum::<f64>() / n_trees)
            .collect())
    }
}
