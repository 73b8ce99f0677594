//! The training entry point.

use std::path::PathBuf;

use mlc_eval::{
    CandidateSummary, Classifier, MetricsReport, Pipeline, calibration_curve, evaluate_candidate,
    evaluate_holdout, optimize_threshold, pr_curve, select_best, stratified_holdout_split,
};
use mlc_io::{
    ArtifactStore, Config, CsvDatasetReader, DataSource, Dataset, Thresholds, make_classification,
};
use mlc_models::ColumnPreprocessor;
use tracing::{info, info_span};

use crate::RunContext;
use crate::error::Error;

/// Headline OOF scores of one candidate.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct CandidateScore {
    /// Candidate name.
    pub name: String,
    /// OOF PR-AUC.
    pub pr_auc: f64,
    /// OOF ROC-AUC.
    pub roc_auc: f64,
    /// OOF Brier score.
    pub brier: f64,
}

/// What a training run produced.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TrainingSummary {
    /// Directory holding the artifacts.
    pub artifacts_dir: PathBuf,
    /// Rows used for cross-validation and the final fit.
    pub n_train: usize,
    /// Holdout rows.
    pub n_test: usize,
    /// Every candidate, in configuration order.
    pub candidates: Vec<CandidateScore>,
    /// Name of the selected candidate.
    pub selected: String,
    /// Cost-optimal decision threshold.
    pub optimal_threshold: f64,
    /// Expected cost at the optimal threshold on the training rows.
    pub optimal_cost: f64,
    /// Holdout metrics at the optimal threshold.
    pub test_metrics: MetricsReport,
}

fn load_dataset(config: &Config) -> Result<Dataset, Error> {
    let dataset = match &config.data.source {
        DataSource::Synthetic(params) => make_classification(params, config.random_state)?,
        DataSource::Csv { path } => CsvDatasetReader::new(path, &config.data.target).read()?,
    };
    Ok(dataset)
}

/// Train, select, calibrate, pick a threshold, evaluate, and persist.
///
/// Steps:
/// 1. Load the dataset and split off a stratified holdout (written to `test.csv`).
/// 2. Score every candidate out-of-fold on the training rows, with bootstrap
///    intervals (`metrics_cv.json`).
/// 3. Select the candidate with the highest OOF PR-AUC and compute its PR and
///    calibration curves.
/// 4. Calibrate the winner with internal cross-validation and refit it on
///    all training rows.
/// 5. Choose the threshold minimising `fn·C_fn + fp·C_fp` on the calibrated
///    training predictions (`thresholds.json`, `cost_curve.json`).
/// 6. Evaluate once on the holdout at that threshold (`metrics_test.json`).
/// 7. Write the reports, `preprocessor.bin` and `model.bin`.
///
/// The first failure aborts the run. Apart from `test.csv`, nothing in the
/// artifact directory is touched until steps 1 to 6 have succeeded.
///
/// # Errors
///
/// Any [`Error`]: configuration-derived objects failing, dataset problems
/// (missing target, a class too small for the folds), fit or predict
/// failures, and artifact I/O.
pub fn run_training(config: &Config, ctx: &RunContext) -> Result<TrainingSummary, Error> {
    let _run = ctx.span().enter();
    let store = ArtifactStore::create(&config.artifacts_dir)?;

    // 1. Data and holdout split
    let dataset = load_dataset(config)?;
    let split = stratified_holdout_split(&dataset.labels, config.data.test_size, config.random_state)?;
    let train = dataset.take(&split.train_indices);
    let test = dataset.take(&split.test_indices);
    info!(
        n_train = train.n_rows(),
        n_test = test.n_rows(),
        train_pos = train.n_positive(),
        test_pos = test.n_positive(),
        "holdout split"
    );
    store.write_test_csv(&test, &config.data.target)?;

    // 2. Out-of-fold evaluation per candidate
    let options = config.evaluation_options();
    let mut candidates = Vec::with_capacity(config.models.len());
    for spec in &config.models {
        let span = info_span!("candidate", name = %spec.name, model_type = %spec.kind.model_type());
        let _candidate = span.enter();
        let pipeline = Pipeline::new(ColumnPreprocessor::new(), spec.kind.build()?);
        candidates.push(evaluate_candidate(
            spec.clone(),
            pipeline,
            &train.table,
            &train.labels,
            &config.cv,
            &options,
        )?);
    }
    let summaries: Vec<(String, CandidateSummary)> = candidates
        .iter()
        .map(|c| (c.spec.name.clone(), c.summary()))
        .collect();
    let scores: Vec<CandidateScore> = candidates
        .iter()
        .map(|c| CandidateScore {
            name: c.spec.name.clone(),
            pr_auc: c.metrics.pr_auc,
            roc_auc: c.metrics.roc_auc,
            brier: c.metrics.brier,
        })
        .collect();

    // 3. Selection and OOF diagnostics
    let best = candidates.swap_remove(select_best(&candidates)?);
    info!(name = %best.spec.name, pr_auc = best.metrics.pr_auc, "candidate selected");
    let oof = &best.oof.probabilities;
    let oof_pr = pr_curve(&train.labels, oof);
    let oof_calibration = calibration_curve(&train.labels, oof, config.reports.calibration_bins);

    // 4. Calibration and refit
    let model = config
        .calibrator
        .calibrate(best.pipeline, &train.table, &train.labels)?;

    // 5. Cost-optimal threshold
    let train_proba = model.predict_proba(&train.table)?;
    let costs = optimize_threshold(
        &train.labels,
        &train_proba,
        config.cost,
        &config.reports.threshold_grid,
    )?;
    let optimal = costs.optimal;
    info!(
        threshold = optimal.threshold,
        cost = optimal.cost,
        cost_at_half = costs.at(0.5).map(|d| d.cost),
        "threshold chosen"
    );

    // 6. Holdout evaluation
    let holdout = evaluate_holdout(
        &model,
        &test.table,
        &test.labels,
        optimal.threshold,
        config.reports.pr_k,
    )?;

    // 7. Persist the bundle once every step has succeeded
    store.write_metrics_cv(&summaries)?;
    if let Some(curve) = &oof_pr {
        store.write_pr_curve(curve)?;
    }
    store.write_calibration_curve(&oof_calibration)?;
    store.write_cost_curve(&costs)?;
    store.write_thresholds(&Thresholds::new(optimal.threshold))?;
    store.write_metrics_test(&holdout.metrics)?;
    store.save_preprocessor(model.base().preprocessor())?;
    store.save_model(&model)?;
    info!(dir = %store.dir().display(), "training complete");

    Ok(TrainingSummary {
        artifacts_dir: store.dir().to_path_buf(),
        n_train: train.n_rows(),
        n_test: test.n_rows(),
        candidates: scores,
        selected: best.spec.name,
        optimal_threshold: optimal.threshold,
        optimal_cost: optimal.cost,
        test_metrics: holdout.metrics,
    })
}
