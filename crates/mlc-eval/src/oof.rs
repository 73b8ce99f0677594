//! Out-of-fold prediction: fit a fresh classifier per fold, score its
//! validation rows, and average each sample's scores across repeats.

use rayon::prelude::*;
use tracing::{Span, debug, info, instrument};

use crate::cv::{FoldAssignment, RepeatedStratifiedKFold};
use crate::error::EvalError;
use crate::pipeline::{Classifier, check_labels};
use crate::table::Table;

/// Aggregated out-of-fold probabilities for every training sample.
#[derive(Debug, Clone, PartialEq)]
pub struct OofPredictions {
    /// Mean out-of-fold probability per sample, in original sample order.
    pub probabilities: Vec<f64>,
    /// Number of out-of-fold scores each sample received (equals the repeat count).
    pub counts: Vec<usize>,
}

impl OofPredictions {
    /// Return `true` for every sample that received at least one out-of-fold score.
    #[must_use]
    pub fn covered(&self) -> Vec<bool> {
        self.counts.iter().map(|&c| c > 0).collect()
    }
}

struct FoldScores {
    validation_indices: Vec<usize>,
    probabilities: Vec<f64>,
}

/// Produce out-of-fold probabilities for `template` over `table`.
///
/// Every fold receives its own [`Classifier::fresh`] copy of the template,
/// so no fitted state crosses fold boundaries. Folds run in parallel on the
/// rayon pool; results are combined in fold order, so the output does not
/// depend on scheduling.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`EvalError::LengthMismatch`] | `labels.len() != table.n_rows()` |
/// | [`EvalError::TooFewSamplesForFolds`] | a class is smaller than the fold count |
/// | [`EvalError::FoldFailed`] | a fold's fit or predict fails |
/// | [`EvalError::MissingOofPrediction`] | a sample was never validated |
/// | [`EvalError::OofCountMismatch`] | a sample was validated other than once per repeat |
#[instrument(skip_all, fields(n_samples = table.n_rows(), n_splits = cv.n_splits(), n_repeats = cv.n_repeats()))]
pub fn oof_predict<C: Classifier>(
    template: &C,
    table: &Table,
    labels: &[u8],
    cv: &RepeatedStratifiedKFold,
) -> Result<OofPredictions, EvalError> {
    check_labels(labels, table.n_rows())?;
    let folds: Vec<FoldAssignment> = cv.split(labels)?.collect();

    let span = Span::current();
    let scored: Vec<FoldScores> = folds
        .into_par_iter()
        .map(|fold| {
            let _span = span.enter();
            let (repeat, fold_idx) = (fold.repeat, fold.fold);
            fit_and_score(template, table, labels, fold).map_err(|e| EvalError::FoldFailed {
                repeat,
                fold: fold_idx,
                source: Box::new(e),
            })
        })
        .collect::<Result<_, _>>()?;

    let n = labels.len();
    let mut sums = vec![0.0f64; n];
    let mut counts = vec![0usize; n];
    for fold in &scored {
        for (&idx, &p) in fold.validation_indices.iter().zip(&fold.probabilities) {
            sums[idx] += p;
            counts[idx] += 1;
        }
    }

    for (sample_index, &got) in counts.iter().enumerate() {
        if got == 0 {
            return Err(EvalError::MissingOofPrediction { sample_index });
        }
        if got != cv.n_repeats() {
            return Err(EvalError::OofCountMismatch {
                sample_index,
                expected: cv.n_repeats(),
                got,
            });
        }
    }

    let probabilities = sums
        .iter()
        .zip(&counts)
        .map(|(&s, &c)| s / c as f64)
        .collect();

    info!(n_folds = scored.len(), "out-of-fold predictions complete");
    Ok(OofPredictions {
        probabilities,
        counts,
    })
}

fn fit_and_score<C: Classifier>(
    template: &C,
    table: &Table,
    labels: &[u8],
    fold: FoldAssignment,
) -> Result<FoldScores, EvalError> {
    let mut model = template.fresh();
    let train_table = table.take(&fold.train_indices);
    let train_labels: Vec<u8> = fold.train_indices.iter().map(|&i| labels[i]).collect();
    model.fit(&train_table, &train_labels)?;

    let validation_table = table.take(&fold.validation_indices);
    let probabilities = model.predict_proba(&validation_table)?;
    if probabilities.len() != fold.validation_indices.len() {
        return Err(EvalError::LengthMismatch {
            what: "fold predictions",
            expected: fold.validation_indices.len(),
            got: probabilities.len(),
        });
    }
    debug!(
        repeat = fold.repeat,
        fold = fold.fold,
        n_train = fold.train_indices.len(),
        n_validation = fold.validation_indices.len(),
        "fold scored"
    );
    Ok(FoldScores {
        validation_indices: fold.validation_indices,
        probabilities,
    })
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::Mutex;

    use super::*;
    use crate::pipeline::testing::{Passthrough, clustered, stub_pipeline};
    use crate::pipeline::{Estimator, Pipeline};

    #[test]
    fn every_sample_scored_once_per_repeat() {
        let (table, labels) = clustered(120, 20);
        let cv = RepeatedStratifiedKFold::new(5, 3).unwrap().with_seed(9);
        let oof = oof_predict(&stub_pipeline(), &table, &labels, &cv).unwrap();
        assert_eq!(oof.probabilities.len(), 120);
        assert!(oof.counts.iter().all(|&c| c == 3));
        assert!(oof.covered().iter().all(|&c| c));
        assert!(oof.probabilities.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn separable_data_ranks_positives_high() {
        let (table, labels) = clustered(100, 20);
        let cv = RepeatedStratifiedKFold::new(5, 1).unwrap();
        let oof = oof_predict(&stub_pipeline(), &table, &labels, &cv).unwrap();
        for (p, &y) in oof.probabilities.iter().zip(&labels) {
            if y == 1 {
                assert!(*p > 0.5, "positive scored {p}");
            }
        }
    }

    #[test]
    fn deterministic_across_runs() {
        let (table, labels) = clustered(80, 16);
        let cv = RepeatedStratifiedKFold::new(4, 2).unwrap().with_seed(1);
        let a = oof_predict(&stub_pipeline(), &table, &labels, &cv).unwrap();
        let b = oof_predict(&stub_pipeline(), &table, &labels, &cv).unwrap();
        assert_eq!(a, b);
    }

    /// Records which row ids each fold fitted on.
    static SEEN: Mutex<Vec<(Vec<usize>, Vec<usize>)>> = Mutex::new(Vec::new());

    #[derive(Debug, Clone, Default)]
    struct Recorder {
        fit_rows: Vec<usize>,
    }

    impl Estimator for Recorder {
        type Error = Infallible;

        fn fresh(&self) -> Self {
            Self::default()
        }

        fn fit(&mut self, features: &[Vec<f64>], _labels: &[u8]) -> Result<(), Infallible> {
            self.fit_rows = features.iter().map(|r| r[1] as usize).collect();
            Ok(())
        }

        fn predict_proba(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, Infallible> {
            let scored: Vec<usize> = features.iter().map(|r| r[1] as usize).collect();
            if let Ok(mut seen) = SEEN.lock() {
                seen.push((self.fit_rows.clone(), scored));
            }
            Ok(vec![0.5; features.len()])
        }
    }

    #[test]
    fn no_sample_scored_by_a_model_that_saw_it() {
        let (table, labels) = clustered(60, 12);
        let cv = RepeatedStratifiedKFold::new(3, 2).unwrap();
        let template = Pipeline::new(Passthrough::default(), Recorder::default());
        oof_predict(&template, &table, &labels, &cv).unwrap();
        let seen = SEEN.lock().unwrap();
        assert_eq!(seen.len(), 6);
        for (fit_rows, scored) in seen.iter() {
            assert!(scored.iter().all(|s| !fit_rows.contains(s)));
        }
    }

    /// Scores every row with the mean row id it was fitted on, scaled into [0, 1].
    #[derive(Debug, Clone, Default)]
    struct TrainingRowMean {
        score: f64,
    }

    impl Estimator for TrainingRowMean {
        type Error = Infallible;

        fn fresh(&self) -> Self {
            Self::default()
        }

        fn fit(&mut self, features: &[Vec<f64>], _labels: &[u8]) -> Result<(), Infallible> {
            let total: f64 = features.iter().map(|r| r[1]).sum();
            self.score = total / features.len() as f64 / 100.0;
            Ok(())
        }

        fn predict_proba(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, Infallible> {
            Ok(vec![self.score; features.len()])
        }
    }

    #[test]
    fn repeats_are_averaged_not_overwritten() {
        let (table, labels) = clustered(90, 18);
        let cv = RepeatedStratifiedKFold::new(3, 3).unwrap().with_seed(11);
        let template = Pipeline::new(Passthrough::default(), TrainingRowMean::default());
        let oof = oof_predict(&template, &table, &labels, &cv).unwrap();

        let mut per_sample: Vec<Vec<f64>> = vec![Vec::new(); labels.len()];
        for fold in cv.split(&labels).unwrap() {
            let mean_id = fold.train_indices.iter().sum::<usize>() as f64
                / fold.train_indices.len() as f64;
            for &i in &fold.validation_indices {
                per_sample[i].push(mean_id / 100.0);
            }
        }

        let mut differs_from_last = false;
        for (i, scores) in per_sample.iter().enumerate() {
            assert_eq!(scores.len(), 3);
            let mean = scores.iter().sum::<f64>() / 3.0;
            assert!(
                (oof.probabilities[i] - mean).abs() < 1e-12,
                "sample {i}: {} vs mean {mean} of {scores:?}",
                oof.probabilities[i]
            );
            differs_from_last |= (mean - scores[2]).abs() > 1e-9;
        }
        assert!(differs_from_last);
    }

    #[derive(Debug, Clone, Default)]
    struct Failing;

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    impl Estimator for Failing {
        type Error = Boom;

        fn fresh(&self) -> Self {
            Failing
        }

        fn fit(&mut self, _features: &[Vec<f64>], _labels: &[u8]) -> Result<(), Boom> {
            Err(Boom)
        }

        fn predict_proba(&self, _features: &[Vec<f64>]) -> Result<Vec<f64>, Boom> {
            Err(Boom)
        }
    }

    #[test]
    fn fold_failure_aborts_with_context() {
        let (table, labels) = clustered(40, 10);
        let cv = RepeatedStratifiedKFold::new(2, 1).unwrap();
        let template = Pipeline::new(Passthrough::default(), Failing);
        let err = oof_predict(&template, &table, &labels, &cv).unwrap_err();
        match err {
            EvalError::FoldFailed { source, .. } => {
                assert!(matches!(*source, EvalError::Estimator { stage: "fit", .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn stratification_failure_propagates() {
        let (table, labels) = clustered(20, 2);
        let cv = RepeatedStratifiedKFold::new(5, 1).unwrap();
        let err = oof_predict(&stub_pipeline(), &table, &labels, &cv).unwrap_err();
        assert!(matches!(err, EvalError::TooFewSamplesForFolds { class: 1, .. }));
    }
}
