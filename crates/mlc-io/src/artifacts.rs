//! The artifact directory: versioned binary models plus JSON and CSV reports.

use std::fs;
use std::path::{Path, PathBuf};

use mlc_eval::{
    CalibratedModel, CalibrationCurve, CandidateSummary, ColumnValues, CostCurve, MetricsReport,
    Pipeline, PrCurve, Table,
};
use mlc_models::{ColumnPreprocessor, Model};
use serde::de::DeserializeOwned;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tracing::{debug, info, instrument};

use crate::dataset::{Dataset, FeatureFile};
use crate::error::IoError;

/// Current binary format version.
const FORMAT_VERSION: u32 = 1;

/// Fitted preprocessor.
pub const PREPROCESSOR_FILE: &str = "preprocessor.bin";
/// Calibrated model.
pub const MODEL_FILE: &str = "model.bin";
/// Per-candidate OOF metrics and intervals.
pub const METRICS_CV_FILE: &str = "metrics_cv.json";
/// Holdout metrics of the final model.
pub const METRICS_TEST_FILE: &str = "metrics_test.json";
/// Optimal and fixed thresholds.
pub const THRESHOLDS_FILE: &str = "thresholds.json";
/// The holdout rows, target included.
pub const TEST_CSV_FILE: &str = "test.csv";
/// Precision-recall curve of the selected candidate's OOF predictions.
pub const PR_CURVE_FILE: &str = "pr_curve.json";
/// Reliability curve of the selected candidate's OOF predictions.
pub const CALIBRATION_CURVE_FILE: &str = "calibration_curve.json";
/// Expected cost at every grid threshold.
pub const COST_CURVE_FILE: &str = "cost_curve.json";

/// The persisted, calibrated classifier.
pub type TrainedModel = CalibratedModel<Pipeline<ColumnPreprocessor, Model>>;

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    format_version: u32,
    artifact: &'a str,
    payload: &'a T,
}

/// Leading fields of every envelope, decoded before the payload.
#[derive(serde::Deserialize)]
struct EnvelopeHeader {
    format_version: u32,
    artifact: String,
}

#[derive(serde::Deserialize)]
struct Envelope<T> {
    #[allow(dead_code)]
    format_version: u32,
    #[allow(dead_code)]
    artifact: String,
    payload: T,
}

/// The `thresholds.json` report.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Thresholds {
    /// Cost-optimal threshold.
    pub optimal: f64,
    /// The conventional threshold, for comparison.
    pub fixed_0_5: f64,
}

impl Thresholds {
    /// Report `optimal` next to the fixed 0.5.
    #[must_use]
    pub fn new(optimal: f64) -> Self {
        Self {
            optimal,
            fixed_0_5: 0.5,
        }
    }
}

/// Candidate summaries serialized as a JSON object in run order.
struct OrderedSummaries<'a>(&'a [(String, CandidateSummary)]);

impl Serialize for OrderedSummaries<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, summary) in self.0 {
            map.serialize_entry(name, summary)?;
        }
        map.end()
    }
}

/// Reads and writes the fixed set of files in one artifact directory.
///
/// | File | Content |
/// |---|---|
/// | `preprocessor.bin` | fitted [`ColumnPreprocessor`] (bincode envelope) |
/// | `model.bin` | [`TrainedModel`] (bincode envelope) |
/// | `metrics_cv.json` | candidate name → `{oof, ci}` |
/// | `metrics_test.json` | holdout [`MetricsReport`] |
/// | `thresholds.json` | [`Thresholds`] |
/// | `test.csv` | holdout rows with the target column |
/// | `pr_curve.json`, `calibration_curve.json`, `cost_curve.json` | curve data |
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Open `dir` for writing, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutputDirCreate`] if the directory cannot be created.
    #[instrument(fields(dir = %dir.display()))]
    pub fn create(dir: &Path) -> Result<Self, IoError> {
        fs::create_dir_all(dir).map_err(|e| IoError::OutputDirCreate {
            path: dir.to_path_buf(),
            source: e,
        })?;
        debug!("artifact directory ready");
        Ok(Self::open(dir))
    }

    /// Open an existing directory for reading.
    pub fn open(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    /// The artifact directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of `file` inside the directory.
    #[must_use]
    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    fn save_binary<T: Serialize>(
        &self,
        file: &str,
        artifact: &'static str,
        value: &T,
    ) -> Result<(), IoError> {
        let path = self.path(file);
        let envelope = EnvelopeRef {
            format_version: FORMAT_VERSION,
            artifact,
            payload: value,
        };
        let bytes = bincode::serialize(&envelope).map_err(|e| IoError::Serialize {
            what: artifact,
            source: e,
        })?;
        fs::write(&path, &bytes).map_err(|e| IoError::WriteFile {
            path: path.clone(),
            source: e,
        })?;
        info!(path = %path.display(), size_bytes = bytes.len(), artifact, "artifact saved");
        Ok(())
    }

    fn load_binary<T: DeserializeOwned>(
        &self,
        file: &str,
        artifact: &'static str,
    ) -> Result<T, IoError> {
        let path = self.path(file);
        let bytes = fs::read(&path).map_err(|e| IoError::FileNotFound {
            path: path.clone(),
            source: e,
        })?;

        let header: EnvelopeHeader =
            bincode::deserialize(&bytes).map_err(|e| IoError::Deserialize {
                path: path.clone(),
                source: e,
            })?;
        if header.format_version != FORMAT_VERSION {
            return Err(IoError::IncompatibleVersion {
                expected: FORMAT_VERSION,
                found: header.format_version,
                path,
            });
        }
        if header.artifact != artifact {
            return Err(IoError::WrongArtifact {
                path,
                expected: artifact,
                found: header.artifact,
            });
        }

        let envelope: Envelope<T> =
            bincode::deserialize(&bytes).map_err(|e| IoError::Deserialize {
                path: path.clone(),
                source: e,
            })?;
        debug!(path = %path.display(), artifact, "artifact loaded");
        Ok(envelope.payload)
    }

    /// Write the fitted preprocessor to `preprocessor.bin`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Serialize`] or [`IoError::WriteFile`].
    pub fn save_preprocessor(&self, preprocessor: &ColumnPreprocessor) -> Result<(), IoError> {
        self.save_binary(PREPROCESSOR_FILE, "preprocessor", preprocessor)
    }

    /// Read `preprocessor.bin`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::FileNotFound`] | file read failed |
    /// | [`IoError::Deserialize`] | bincode decoding failed |
    /// | [`IoError::IncompatibleVersion`] | format version mismatch |
    /// | [`IoError::WrongArtifact`] | file holds another artifact |
    pub fn load_preprocessor(&self) -> Result<ColumnPreprocessor, IoError> {
        self.load_binary(PREPROCESSOR_FILE, "preprocessor")
    }

    /// Write the calibrated model to `model.bin`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Serialize`] or [`IoError::WriteFile`].
    pub fn save_model(&self, model: &TrainedModel) -> Result<(), IoError> {
        self.save_binary(MODEL_FILE, "calibrated_model", model)
    }

    /// Read `model.bin`.
    ///
    /// # Errors
    ///
    /// As for [`ArtifactStore::load_preprocessor`].
    pub fn load_model(&self) -> Result<TrainedModel, IoError> {
        self.load_binary(MODEL_FILE, "calibrated_model")
    }

    fn write_json<T: Serialize + ?Sized>(&self, file: &str, value: &T) -> Result<(), IoError> {
        let path = self.path(file);
        let json = serde_json::to_string_pretty(value).map_err(|e| IoError::Json {
            path: path.clone(),
            source: e,
        })?;
        fs::write(&path, json).map_err(|e| IoError::WriteFile {
            path: path.clone(),
            source: e,
        })?;
        info!(path = %path.display(), "report written");
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, file: &str) -> Result<T, IoError> {
        let path = self.path(file);
        let text = fs::read_to_string(&path).map_err(|e| IoError::FileNotFound {
            path: path.clone(),
            source: e,
        })?;
        serde_json::from_str(&text).map_err(|e| IoError::Json { path, source: e })
    }

    /// Write `metrics_cv.json`, keeping candidate order.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Json`] or [`IoError::WriteFile`].
    pub fn write_metrics_cv(&self, summaries: &[(String, CandidateSummary)]) -> Result<(), IoError> {
        self.write_json(METRICS_CV_FILE, &OrderedSummaries(summaries))
    }

    /// Write `metrics_test.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Json`] or [`IoError::WriteFile`].
    pub fn write_metrics_test(&self, report: &MetricsReport) -> Result<(), IoError> {
        self.write_json(METRICS_TEST_FILE, report)
    }

    /// Read `metrics_test.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::FileNotFound`] or [`IoError::Json`].
    pub fn read_metrics_test(&self) -> Result<MetricsReport, IoError> {
        self.read_json(METRICS_TEST_FILE)
    }

    /// Write `thresholds.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Json`] or [`IoError::WriteFile`].
    pub fn write_thresholds(&self, thresholds: &Thresholds) -> Result<(), IoError> {
        self.write_json(THRESHOLDS_FILE, thresholds)
    }

    /// Read `thresholds.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::FileNotFound`] or [`IoError::Json`].
    pub fn read_thresholds(&self) -> Result<Thresholds, IoError> {
        self.read_json(THRESHOLDS_FILE)
    }

    /// Write `pr_curve.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Json`] or [`IoError::WriteFile`].
    pub fn write_pr_curve(&self, curve: &PrCurve) -> Result<(), IoError> {
        self.write_json(PR_CURVE_FILE, curve)
    }

    /// Write `calibration_curve.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Json`] or [`IoError::WriteFile`].
    pub fn write_calibration_curve(&self, curve: &CalibrationCurve) -> Result<(), IoError> {
        self.write_json(CALIBRATION_CURVE_FILE, curve)
    }

    /// Write `cost_curve.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Json`] or [`IoError::WriteFile`].
    pub fn write_cost_curve(&self, curve: &CostCurve) -> Result<(), IoError> {
        self.write_json(COST_CURVE_FILE, curve)
    }

    /// Write the holdout rows to `test.csv`, with `target` as the last column.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::WriteCsv`].
    #[instrument(skip_all, fields(n_rows = dataset.n_rows()))]
    pub fn write_test_csv(&self, dataset: &Dataset, target: &str) -> Result<(), IoError> {
        let path = self.path(TEST_CSV_FILE);
        let labels: Vec<String> = dataset.labels.iter().map(u8::to_string).collect();
        write_table_csv(&path, &dataset.table, &[(target, labels.as_slice())])?;
        info!(path = %path.display(), "holdout rows written");
        Ok(())
    }
}

fn cell(values: &ColumnValues, row: usize) -> String {
    match values {
        ColumnValues::Numeric(v) => v[row].map_or_else(String::new, |x| x.to_string()),
        ColumnValues::Categorical(v) => v[row].clone().unwrap_or_default(),
    }
}

/// Write `table` followed by extra string columns.
fn write_table_csv(path: &Path, table: &Table, extra: &[(&str, &[String])]) -> Result<(), IoError> {
    let csv_err = |e| IoError::WriteCsv {
        path: path.to_path_buf(),
        source: e,
    };
    let mut wtr = csv::Writer::from_path(path).map_err(csv_err)?;
    let mut header: Vec<&str> = table.names();
    header.extend(extra.iter().map(|(name, _)| *name));
    wtr.write_record(&header).map_err(csv_err)?;
    for row in 0..table.n_rows() {
        let mut record: Vec<String> = table
            .columns()
            .iter()
            .map(|c| cell(c.values(), row))
            .collect();
        record.extend(extra.iter().map(|(_, values)| values[row].clone()));
        wtr.write_record(&record).map_err(csv_err)?;
    }
    wtr.flush().map_err(|e| IoError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Write the scored rows: every input column as read, then `proba` and `label`.
///
/// # Errors
///
/// Returns [`IoError::WriteCsv`] or [`IoError::WriteFile`].
#[instrument(skip_all, fields(path = %path.display(), n_rows = input.records.len()))]
pub fn write_predictions(
    path: &Path,
    input: &FeatureFile,
    probabilities: &[f64],
    labels: &[u8],
) -> Result<(), IoError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| IoError::OutputDirCreate {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    let csv_err = |e| IoError::WriteCsv {
        path: path.to_path_buf(),
        source: e,
    };
    let mut wtr = csv::Writer::from_path(path).map_err(csv_err)?;
    let mut header = input.headers.clone();
    header.extend(["proba".to_owned(), "label".to_owned()]);
    wtr.write_record(&header).map_err(csv_err)?;
    for ((record, p), label) in input.records.iter().zip(probabilities).zip(labels) {
        let mut row = record.clone();
        row.push(p.to_string());
        row.push(label.to_string());
        wtr.write_record(&row).map_err(csv_err)?;
    }
    wtr.flush().map_err(|e| IoError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    info!("predictions written");
    Ok(())
}
