//! YAML run configuration with load-time validation.
//!
//! Every section is checked for presence first, then parsed into a raw
//! serde shape, then turned into the validated core objects the training
//! run consumes (splitter, calibrator, cost weights, threshold grid,
//! candidate specs). A `null` section takes its defaults; any other invalid
//! value is an error.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use mlc_eval::{
    CalibrationMethod, Calibrator, CostWeights, EvaluationOptions, RepeatedStratifiedKFold,
    ThresholdGrid,
};
use mlc_models::{
    CandidateSpec, DEFAULT_SEED, HistGbdtParams, LogisticParams, ModelKind, ModelType,
    RandomForestParams,
};
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use tracing::{debug, info, instrument};

use crate::error::ConfigError;
use crate::synthetic::SyntheticParams;

/// Top-level sections every document must name.
pub const REQUIRED_SECTIONS: [&str; 8] = [
    "random_state",
    "data",
    "validation",
    "models",
    "calibration",
    "cost",
    "reports",
    "paths",
];

/// Where the training rows come from.
#[derive(Debug, Clone, PartialEq)]
pub enum DataSource {
    /// Generated in-process from the run seed.
    Synthetic(SyntheticParams),
    /// Read from a labelled CSV file.
    Csv {
        /// Path to the file.
        path: PathBuf,
    },
}

/// The validated `data` section.
#[derive(Debug, Clone, PartialEq)]
pub struct DataConfig {
    /// Row source.
    pub source: DataSource,
    /// Label column name.
    pub target: String,
    /// Fraction of each class held out for final evaluation.
    pub test_size: f64,
}

/// The validated `reports` section.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportsConfig {
    /// Top-k for recall@k; `None` disables it, as does any `k <= 0` in the file.
    pub pr_k: Option<usize>,
    /// Bootstrap resamples per interval.
    pub n_bootstrap: usize,
    /// Bins of the calibration curve.
    pub calibration_bins: usize,
    /// Candidate thresholds for cost optimisation.
    pub threshold_grid: ThresholdGrid,
}

/// A fully validated run configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base seed for every random choice in the run.
    pub random_state: u64,
    /// Dataset source and holdout split.
    pub data: DataConfig,
    /// Seeded cross-validation splitter.
    pub cv: RepeatedStratifiedKFold,
    /// Candidates in document order, names unique.
    pub models: Vec<CandidateSpec>,
    /// Seeded calibrator.
    pub calibrator: Calibrator,
    /// Misclassification costs.
    pub cost: CostWeights,
    /// Reporting options.
    pub reports: ReportsConfig,
    /// Directory receiving the artifacts.
    pub artifacts_dir: PathBuf,
}

#[derive(Debug, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawData {
    kind: String,
    path: Option<PathBuf>,
    target: String,
    test_size: f64,
    n_samples: usize,
    n_features: usize,
    n_informative: usize,
    n_redundant: usize,
    n_repeated: usize,
    n_classes: usize,
    weights: Vec<f64>,
    n_clusters_per_class: usize,
    class_sep: f64,
    flip_y: f64,
}

impl Default for RawData {
    fn default() -> Self {
        let synthetic = SyntheticParams::default();
        Self {
            kind: "synthetic".to_owned(),
            path: None,
            target: "target".to_owned(),
            test_size: 0.2,
            n_samples: synthetic.n_samples,
            n_features: synthetic.n_features,
            n_informative: synthetic.n_informative,
            n_redundant: synthetic.n_redundant,
            n_repeated: synthetic.n_repeated,
            n_classes: synthetic.n_classes,
            weights: synthetic.weights,
            n_clusters_per_class: synthetic.n_clusters_per_class,
            class_sep: synthetic.class_sep,
            flip_y: synthetic.flip_y,
        }
    }
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawValidation {
    cv: RawCv,
}

#[derive(Debug, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawCv {
    n_splits: usize,
    n_repeats: usize,
    shuffle: bool,
}

impl Default for RawCv {
    fn default() -> Self {
        Self {
            n_splits: 5,
            n_repeats: 1,
            shuffle: true,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawCalibration {
    method: String,
    n_folds: usize,
}

impl Default for RawCalibration {
    fn default() -> Self {
        Self {
            method: "sigmoid".to_owned(),
            n_folds: 5,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawCost {
    #[serde(rename = "fn")]
    c_fn: f64,
    #[serde(rename = "fp")]
    c_fp: f64,
}

impl Default for RawCost {
    fn default() -> Self {
        Self {
            c_fn: 10.0,
            c_fp: 1.0,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawReports {
    pr_k: Option<i64>,
    n_bootstrap: usize,
    threshold_points: usize,
    calibration_bins: usize,
}

impl Default for RawReports {
    fn default() -> Self {
        Self {
            pr_k: Some(100),
            n_bootstrap: 400,
            threshold_points: 1001,
            calibration_bins: 10,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawPaths {
    artifacts_dir: PathBuf,
}

impl Default for RawPaths {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from("artifacts"),
        }
    }
}

/// Parse `root[name]`, taking defaults when it is `null`.
fn section<T: DeserializeOwned + Default>(root: &Mapping, name: &'static str) -> Result<T, ConfigError> {
    match root.get(name) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_yaml::from_value(value.clone())
            .map_err(|source| ConfigError::InvalidSection { section: name, source }),
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

fn parse_data(raw: RawData) -> Result<DataConfig, ConfigError> {
    if !(raw.test_size > 0.0 && raw.test_size < 1.0) {
        return Err(invalid("data.test_size", format!("must be in (0, 1), got {}", raw.test_size)));
    }
    if raw.target.trim().is_empty() {
        return Err(invalid("data.target", "must not be empty"));
    }
    let source = match raw.kind.as_str() {
        "synthetic" => {
            let params = SyntheticParams {
                n_samples: raw.n_samples,
                n_features: raw.n_features,
                n_informative: raw.n_informative,
                n_redundant: raw.n_redundant,
                n_repeated: raw.n_repeated,
                n_classes: raw.n_classes,
                weights: raw.weights,
                n_clusters_per_class: raw.n_clusters_per_class,
                class_sep: raw.class_sep,
                flip_y: raw.flip_y,
            };
            params
                .validate()
                .map_err(|e| invalid("data", e.to_string()))?;
            DataSource::Synthetic(params)
        }
        "csv" => {
            let path = raw.path.ok_or_else(|| ConfigError::UnsupportedDataKind {
                reason: "data.kind csv requires data.path".to_owned(),
            })?;
            DataSource::Csv { path }
        }
        other => {
            return Err(ConfigError::UnsupportedDataKind {
                reason: format!("unknown data.kind \"{other}\" (expected synthetic or csv)"),
            });
        }
    };
    Ok(DataConfig {
        source,
        target: raw.target,
        test_size: raw.test_size,
    })
}

fn parse_cv(raw: RawValidation, seed: u64) -> Result<RepeatedStratifiedKFold, ConfigError> {
    if !raw.cv.shuffle {
        return Err(invalid(
            "validation.cv.shuffle",
            "unshuffled folds are not supported",
        ));
    }
    RepeatedStratifiedKFold::new(raw.cv.n_splits, raw.cv.n_repeats)
        .map(|cv| cv.with_seed(seed))
        .map_err(|e| invalid("validation.cv", e.to_string()))
}

fn parse_params<T: DeserializeOwned>(
    index: usize,
    model_type: ModelType,
    params: Value,
) -> Result<T, ConfigError> {
    serde_yaml::from_value(params).map_err(|source| ConfigError::InvalidModelParams {
        index,
        model_type,
        source,
    })
}

fn parse_model(index: usize, entry: &Value, seed: u64) -> Result<CandidateSpec, ConfigError> {
    let Value::Mapping(entry) = entry else {
        return Err(invalid("models", format!("models[{index}] must be a mapping")));
    };
    for key in entry.keys() {
        match key.as_str() {
            Some("name" | "type" | "params") => {}
            _ => {
                return Err(invalid(
                    "models",
                    format!("models[{index}] has unknown key {key:?}"),
                ));
            }
        }
    }

    let tag = entry
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ConfigError::MissingModelType { index })?;
    let model_type: ModelType = tag
        .parse()
        .map_err(|source| ConfigError::UnknownModelType { index, source })?;

    let params = match entry.get("params") {
        None | Some(Value::Null) => Value::Mapping(Mapping::new()),
        Some(v) => v.clone(),
    };
    let kind = match model_type {
        ModelType::Logistic => {
            ModelKind::Logistic(parse_params::<LogisticParams>(index, model_type, params)?)
        }
        ModelType::RandomForest => {
            ModelKind::RandomForest(parse_params::<RandomForestParams>(index, model_type, params)?)
        }
        ModelType::HistGbdt => {
            ModelKind::HistGbdt(parse_params::<HistGbdtParams>(index, model_type, params)?)
        }
    }
    .with_default_seed(seed);
    kind.validate()
        .map_err(|source| ConfigError::InvalidModelValue { index, source })?;

    let name = match entry.get("name") {
        None | Some(Value::Null) => model_type.tag().to_owned(),
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(other) => {
            return Err(invalid(
                "models",
                format!("models[{index}].name must be a non-empty string, got {other:?}"),
            ));
        }
    };
    Ok(CandidateSpec::new(name, kind))
}

fn parse_models(value: Option<&Value>, seed: u64) -> Result<Vec<CandidateSpec>, ConfigError> {
    let entries = match value {
        Some(Value::Sequence(entries)) if !entries.is_empty() => entries,
        _ => return Err(ConfigError::EmptyModels),
    };
    let mut seen = HashSet::new();
    let mut specs = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let spec = parse_model(index, entry, seed)?;
        if !seen.insert(spec.name.clone()) {
            return Err(ConfigError::DuplicateModelName { name: spec.name });
        }
        debug!(index, name = %spec.name, model_type = %spec.kind.model_type(), "candidate parsed");
        specs.push(spec);
    }
    Ok(specs)
}

fn parse_calibration(raw: RawCalibration, seed: u64) -> Result<Calibrator, ConfigError> {
    let method: CalibrationMethod = raw
        .method
        .parse()
        .map_err(|source| ConfigError::InvalidCalibrationMethod { source })?;
    Calibrator::new(method, raw.n_folds)
        .map(|c| c.with_seed(seed))
        .map_err(|e| invalid("calibration.n_folds", e.to_string()))
}

fn parse_reports(raw: RawReports) -> Result<ReportsConfig, ConfigError> {
    if raw.n_bootstrap == 0 {
        return Err(invalid("reports.n_bootstrap", "must be >= 1"));
    }
    if raw.calibration_bins == 0 {
        return Err(invalid("reports.calibration_bins", "must be >= 1"));
    }
    let threshold_grid = ThresholdGrid::uniform(raw.threshold_points)
        .map_err(|e| invalid("reports.threshold_points", e.to_string()))?;
    Ok(ReportsConfig {
        pr_k: raw.pr_k.and_then(|k| usize::try_from(k).ok()).filter(|&k| k > 0),
        n_bootstrap: raw.n_bootstrap,
        calibration_bins: raw.calibration_bins,
        threshold_grid,
    })
}

impl Config {
    /// Read and validate a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the file is unreadable, otherwise as
    /// [`Config::from_yaml_str`].
    #[instrument(fields(path = %path.display()))]
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    /// Parse and validate a YAML document.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ConfigError::Parse`] | Not valid YAML |
    /// | [`ConfigError::NotAMapping`] | Top level is not a mapping |
    /// | [`ConfigError::MissingSection`] | A required section is absent |
    /// | [`ConfigError::InvalidSection`] | A section has unknown keys or wrong types |
    /// | [`ConfigError::EmptyModels`] | `models` is not a non-empty list |
    /// | [`ConfigError::MissingModelType`] | A model entry has no `type` |
    /// | [`ConfigError::UnknownModelType`] | A model `type` is not recognised |
    /// | [`ConfigError::InvalidModelParams`] | Model params have unknown keys or wrong types |
    /// | [`ConfigError::InvalidModelValue`] | Model params are out of range |
    /// | [`ConfigError::DuplicateModelName`] | Two candidates share a name |
    /// | [`ConfigError::InvalidCalibrationMethod`] | Method is not `sigmoid` or `isotonic` |
    /// | [`ConfigError::UnsupportedDataKind`] | Unknown `data.kind`, or csv without a path |
    /// | [`ConfigError::InvalidValue`] | Any other out-of-range value |
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let document: Value =
            serde_yaml::from_str(text).map_err(|source| ConfigError::Parse { source })?;
        let Value::Mapping(root) = document else {
            return Err(ConfigError::NotAMapping);
        };

        let mut missing: Vec<String> = REQUIRED_SECTIONS
            .iter()
            .filter(|s| !root.contains_key(*s))
            .map(|s| (*s).to_owned())
            .collect();
        if !missing.is_empty() {
            missing.sort();
            return Err(ConfigError::MissingSection { sections: missing });
        }

        let random_state = section::<Option<u64>>(&root, "random_state")?.unwrap_or(DEFAULT_SEED);
        let data = parse_data(section(&root, "data")?)?;
        let cv = parse_cv(section(&root, "validation")?, random_state)?;
        let models = parse_models(root.get("models"), random_state)?;
        let calibrator = parse_calibration(section(&root, "calibration")?, random_state)?;
        let raw_cost: RawCost = section(&root, "cost")?;
        let cost = CostWeights::new(raw_cost.c_fn, raw_cost.c_fp)
            .map_err(|e| invalid("cost", e.to_string()))?;
        let reports = parse_reports(section(&root, "reports")?)?;
        let paths: RawPaths = section(&root, "paths")?;

        info!(
            random_state,
            n_models = models.len(),
            n_splits = cv.n_splits(),
            n_repeats = cv.n_repeats(),
            calibration = %calibrator.method(),
            "config loaded"
        );
        Ok(Self {
            random_state,
            data,
            cv,
            models,
            calibrator,
            cost,
            reports,
            artifacts_dir: paths.artifacts_dir,
        })
    }

    /// Options for per-candidate OOF evaluation.
    #[must_use]
    pub fn evaluation_options(&self) -> EvaluationOptions {
        EvaluationOptions {
            threshold: 0.5,
            k: self.reports.pr_k,
            n_bootstrap: self.reports.n_bootstrap,
            seed: self.random_state,
        }
    }
}
