//! Repeated stratified k-fold partitioning and the stratified holdout split.

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::error::EvalError;
use crate::pipeline::check_labels;

/// One train/validation partition of the training indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldAssignment {
    /// Zero-based repeat index.
    pub repeat: usize,
    /// Zero-based fold index within the repeat.
    pub fold: usize,
    /// Indices used for fitting, ascending.
    pub train_indices: Vec<usize>,
    /// Indices scored by the fold's model, ascending.
    pub validation_indices: Vec<usize>,
}

/// Repeated stratified k-fold cross-validation.
///
/// Construct via [`RepeatedStratifiedKFold::new`], then chain `with_seed`.
/// Each repeat shuffles every class independently with its own ChaCha
/// stream (keyed by the repeat index), then deals samples round-robin
/// across folds, continuing the rotation from one class to the next so
/// fold sizes differ by at most one.
#[derive(Debug, Clone)]
pub struct RepeatedStratifiedKFold {
    n_splits: usize,
    n_repeats: usize,
    seed: u64,
}

impl RepeatedStratifiedKFold {
    /// Create a splitter with `n_splits` folds repeated `n_repeats` times.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`EvalError::InvalidFoldCount`] | `n_splits` < 2 |
    /// | [`EvalError::InvalidRepeatCount`] | `n_repeats` == 0 |
    pub fn new(n_splits: usize, n_repeats: usize) -> Result<Self, EvalError> {
        if n_splits < 2 {
            return Err(EvalError::InvalidFoldCount { n_splits });
        }
        if n_repeats == 0 {
            return Err(EvalError::InvalidRepeatCount { n_repeats });
        }
        Ok(Self {
            n_splits,
            n_repeats,
            seed: 42,
        })
    }

    /// Set the random seed for shuffling.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Return the number of folds per repeat.
    #[must_use]
    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    /// Return the number of repeats.
    #[must_use]
    pub fn n_repeats(&self) -> usize {
        self.n_repeats
    }

    /// Return the seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Validate the labels and return a lazy sequence of `n_splits × n_repeats` folds.
    ///
    /// Folds are yielded repeat-major: all folds of repeat 0, then repeat 1, ...
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`EvalError::EmptyDataset`] | zero labels |
    /// | [`EvalError::InvalidLabel`] | a label is not 0/1 |
    /// | [`EvalError::TooFewSamplesForFolds`] | a class has fewer members than `n_splits` |
    pub fn split(&self, labels: &[u8]) -> Result<FoldIter, EvalError> {
        if labels.is_empty() {
            return Err(EvalError::EmptyDataset);
        }
        check_labels(labels, labels.len())?;

        let mut class_indices: [Vec<usize>; 2] = [Vec::new(), Vec::new()];
        for (i, &label) in labels.iter().enumerate() {
            class_indices[usize::from(label)].push(i);
        }
        for (class, indices) in class_indices.iter().enumerate() {
            if indices.len() < self.n_splits {
                return Err(EvalError::TooFewSamplesForFolds {
                    class: class as u8,
                    count: indices.len(),
                    n_splits: self.n_splits,
                });
            }
        }

        debug!(
            n_samples = labels.len(),
            n_negative = class_indices[0].len(),
            n_positive = class_indices[1].len(),
            n_splits = self.n_splits,
            n_repeats = self.n_repeats,
            "stratified folds ready"
        );

        Ok(FoldIter {
            cv: self.clone(),
            class_indices,
            n_samples: labels.len(),
            next: 0,
            assignments: Vec::new(),
        })
    }

    /// Fold index per sample for one repeat.
    fn assign(&self, class_indices: &[Vec<usize>; 2], n_samples: usize, repeat: usize) -> Vec<usize> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_stream(repeat as u64);

        let mut assignments = vec![0usize; n_samples];
        let mut offset = 0usize;
        for indices in class_indices {
            let mut shuffled = indices.clone();
            shuffled.shuffle(&mut rng);
            for (j, &idx) in shuffled.iter().enumerate() {
                assignments[idx] = (offset + j) % self.n_splits;
            }
            offset += shuffled.len();
        }
        assignments
    }
}

/// Lazy iterator over the folds of a [`RepeatedStratifiedKFold`].
///
/// Fold membership for a repeat is computed when its first fold is requested.
#[derive(Debug)]
pub struct FoldIter {
    cv: RepeatedStratifiedKFold,
    class_indices: [Vec<usize>; 2],
    n_samples: usize,
    next: usize,
    assignments: Vec<usize>,
}

impl Iterator for FoldIter {
    type Item = FoldAssignment;

    fn next(&mut self) -> Option<FoldAssignment> {
        let total = self.cv.n_splits * self.cv.n_repeats;
        if self.next >= total {
            return None;
        }
        let repeat = self.next / self.cv.n_splits;
        let fold = self.next % self.cv.n_splits;
        if fold == 0 {
            self.assignments = self.cv.assign(&self.class_indices, self.n_samples, repeat);
        }
        self.next += 1;

        let mut train_indices = Vec::with_capacity(self.n_samples);
        let mut validation_indices = Vec::with_capacity(self.n_samples / self.cv.n_splits + 1);
        for (i, &assigned) in self.assignments.iter().enumerate() {
            if assigned == fold {
                validation_indices.push(i);
            } else {
                train_indices.push(i);
            }
        }
        Some(FoldAssignment {
            repeat,
            fold,
            train_indices,
            validation_indices,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.cv.n_splits * self.cv.n_repeats - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for FoldIter {}

/// Train/holdout index partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldoutSplit {
    /// Training indices, ascending.
    pub train_indices: Vec<usize>,
    /// Holdout indices, ascending.
    pub test_indices: Vec<usize>,
}

/// Split indices into train and holdout sets, preserving class proportions.
///
/// Each class contributes `round(test_size × count)` samples to the holdout,
/// clamped so that a class with at least two members lands on both sides.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`EvalError::InvalidTestSize`] | `test_size` not in (0, 1) |
/// | [`EvalError::EmptyDataset`] | zero labels |
/// | [`EvalError::InvalidLabel`] | a label is not 0/1 |
pub fn stratified_holdout_split(
    labels: &[u8],
    test_size: f64,
    seed: u64,
) -> Result<HoldoutSplit, EvalError> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(EvalError::InvalidTestSize { test_size });
    }
    if labels.is_empty() {
        return Err(EvalError::EmptyDataset);
    }
    check_labels(labels, labels.len())?;

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train_indices = Vec::with_capacity(labels.len());
    let mut test_indices = Vec::new();
    for class in 0..=1u8 {
        let mut indices: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|&(_, &l)| l == class)
            .map(|(i, _)| i)
            .collect();
        indices.shuffle(&mut rng);
        let count = indices.len();
        let mut n_test = (test_size * count as f64).round() as usize;
        if count >= 2 {
            n_test = n_test.clamp(1, count - 1);
        } else {
            n_test = 0;
        }
        test_indices.extend_from_slice(&indices[..n_test]);
        train_indices.extend_from_slice(&indices[n_test..]);
    }
    train_indices.sort_unstable();
    test_indices.sort_unstable();

    debug!(
        n_train = train_indices.len(),
        n_test = test_indices.len(),
        "holdout split"
    );

    Ok(HoldoutSplit {
        train_indices,
        test_indices,
    })
}
