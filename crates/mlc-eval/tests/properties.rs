//! Property-based tests for the evaluation core.

use std::convert::Infallible;

use mlc_eval::{
    Classifier, ColumnValues, CostWeights, Estimator, Pipeline, Preprocessor,
    RepeatedStratifiedKFold, Table, ThresholdGrid, average_precision, bootstrap_ci, brier,
    compute_metrics, oof_predict, optimize_threshold, pr_auc, recall_at_k, roc_auc,
};
use proptest::prelude::*;

/// Labels with at least one of each class, paired with probabilities in [0, 1].
fn scored_labels(max_len: usize) -> impl Strategy<Value = (Vec<u8>, Vec<f64>)> {
    prop::collection::vec((any::<bool>(), 0.0..=1.0f64), 2..max_len).prop_map(|pairs| {
        let mut labels: Vec<u8> = pairs.iter().map(|&(y, _)| u8::from(y)).collect();
        labels[0] = 0;
        labels[1] = 1;
        let proba = pairs.iter().map(|&(_, p)| p).collect();
        (labels, proba)
    })
}

// ============================================================================
// Metrics engine
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn ranking_metrics_are_unit_bounded((labels, proba) in scored_labels(200)) {
        for (name, value) in [
            ("roc_auc", roc_auc(&labels, &proba)),
            ("pr_auc", pr_auc(&labels, &proba)),
            ("average_precision", average_precision(&labels, &proba)),
            ("brier", brier(&labels, &proba)),
        ] {
            prop_assert!((0.0..=1.0 + 1e-12).contains(&value), "{} = {}", name, value);
        }
    }

    #[test]
    fn report_is_unit_bounded((labels, proba) in scored_labels(200), thr in 0.0..=1.0f64) {
        let report = compute_metrics(&labels, &proba, thr, Some(10)).unwrap();
        prop_assert!((0.0..=1.0).contains(&report.accuracy));
        prop_assert!((0.0..=1.0).contains(&report.f1_at_thr));
        prop_assert_eq!(report.confusion.total(), labels.len());
    }

    #[test]
    fn recall_at_k_non_decreasing((labels, proba) in scored_labels(120)) {
        let mut prev = 0.0;
        for k in 1..=labels.len() + 2 {
            let r = recall_at_k(&labels, &proba, Some(k)).unwrap();
            prop_assert!(r >= prev, "recall@{} = {} < {}", k, r, prev);
            prev = r;
        }
        prop_assert!((prev - 1.0).abs() < 1e-12);
    }

    #[test]
    fn reversed_scores_mirror_roc((labels, proba) in scored_labels(150)) {
        let flipped: Vec<f64> = proba.iter().map(|p| 1.0 - p).collect();
        let sum = roc_auc(&labels, &proba) + roc_auc(&labels, &flipped);
        prop_assert!((sum - 1.0).abs() < 1e-9, "sum = {}", sum);
    }
}

// ============================================================================
// Cost-threshold optimizer
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn optimal_cost_never_exceeds_half_threshold(
        (labels, proba) in scored_labels(200),
        c_fn in 0.0..50.0f64,
        c_fp in 0.0..50.0f64,
    ) {
        let weights = CostWeights::new(c_fn, c_fp).unwrap();
        let grid = ThresholdGrid::uniform(1001).unwrap();
        let result = optimize_threshold(&labels, &proba, weights, &grid).unwrap();
        prop_assert!(result.curve.iter().all(|d| d.cost >= 0.0));
        let half = result.at(0.5).unwrap();
        prop_assert!(result.optimal.cost <= half.cost);
        // The chosen entry is the first one attaining the minimum.
        let first_min = result
            .curve
            .iter()
            .position(|d| d.cost == result.optimal.cost)
            .unwrap();
        prop_assert_eq!(result.curve[first_min].threshold, result.optimal.threshold);
    }
}

// ============================================================================
// Bootstrap CI estimator
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn bootstrap_interval_ordered_and_reproducible(
        (labels, proba) in scored_labels(100),
        seed in any::<u64>(),
    ) {
        let a = bootstrap_ci(&labels, &proba, roc_auc, 64, seed).unwrap();
        let b = bootstrap_ci(&labels, &proba, roc_auc, 64, seed).unwrap();
        prop_assert_eq!(a, b);
        prop_assert!(a.low <= a.high);
        prop_assert!(a.low >= 0.0 && a.high <= 1.0);
        prop_assert!(a.mean >= 0.0 && a.mean <= 1.0);
    }
}

// ============================================================================
// Out-of-fold predictor
// ============================================================================

#[derive(Debug, Clone, Default)]
struct FirstColumn;

impl Preprocessor for FirstColumn {
    type Error = Infallible;

    fn fresh(&self) -> Self {
        FirstColumn
    }

    fn fit(&mut self, _table: &Table) -> Result<(), Infallible> {
        Ok(())
    }

    fn transform(&self, table: &Table) -> Result<Vec<Vec<f64>>, Infallible> {
        let rows = match table.columns()[0].values() {
            ColumnValues::Numeric(v) => v.iter().map(|x| vec![x.unwrap_or(0.0)]).collect(),
            ColumnValues::Categorical(v) => vec![vec![0.0]; v.len()],
        };
        Ok(rows)
    }
}

/// Predicts the positive rate seen during fit, nudged by the feature.
#[derive(Debug, Clone, Default)]
struct BaseRate {
    rate: Option<f64>,
}

impl Estimator for BaseRate {
    type Error = Infallible;

    fn fresh(&self) -> Self {
        Self::default()
    }

    fn fit(&mut self, _features: &[Vec<f64>], labels: &[u8]) -> Result<(), Infallible> {
        let pos = labels.iter().filter(|&&y| y == 1).count();
        self.rate = Some(pos as f64 / labels.len() as f64);
        Ok(())
    }

    fn predict_proba(&self, features: &[Vec<f64>]) -> Result<Vec<f64>, Infallible> {
        let rate = self.rate.unwrap_or(0.5);
        Ok(features
            .iter()
            .map(|r| (rate + r[0] * 0.01).clamp(0.0, 1.0))
            .collect())
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn every_sample_gets_one_score_per_repeat(
        n_pos in 5usize..20,
        n_neg in 5usize..60,
        n_splits in 2usize..6,
        n_repeats in 1usize..4,
        seed in any::<u64>(),
    ) {
        let n = n_pos + n_neg;
        let labels: Vec<u8> = (0..n).map(|i| u8::from(i < n_pos)).collect();
        let rows: Vec<Vec<f64>> = (0..n).map(|i| vec![(i % 7) as f64]).collect();
        let table = Table::from_rows(&rows).unwrap();
        let cv = RepeatedStratifiedKFold::new(n_splits, n_repeats).unwrap().with_seed(seed);
        let template = Pipeline::new(FirstColumn, BaseRate::default());

        let oof = oof_predict(&template, &table, &labels, &cv).unwrap();
        prop_assert_eq!(oof.probabilities.len(), n);
        prop_assert!(oof.counts.iter().all(|&c| c == n_repeats));
        prop_assert!(oof.probabilities.iter().all(|p| p.is_finite()));

        // The template itself is never fitted.
        prop_assert!(template.estimator().rate.is_none());
        let mut fitted = template.fresh();
        fitted.fit(&table, &labels).unwrap();
        prop_assert!(fitted.estimator().rate.is_some());
    }

    #[test]
    fn folds_preserve_class_balance(
        n_pos in 4usize..30,
        n_neg in 4usize..90,
        n_splits in 2usize..5,
        seed in any::<u64>(),
    ) {
        prop_assume!(n_pos >= n_splits && n_neg >= n_splits);
        let labels: Vec<u8> = (0..n_pos + n_neg).map(|i| u8::from(i < n_pos)).collect();
        let cv = RepeatedStratifiedKFold::new(n_splits, 1).unwrap().with_seed(seed);
        for fold in cv.split(&labels).unwrap() {
            let pos = fold.validation_indices.iter().filter(|&&i| labels[i] == 1).count();
            let lower = n_pos / n_splits;
            prop_assert!(pos == lower || pos == lower + 1, "fold has {} positives", pos);
        }
    }
}
