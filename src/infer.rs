//! The inference entry point.

use std::path::Path;

use mlc_eval::{Classifier, ColumnKind, Table};
use mlc_io::{ArtifactStore, FeatureCsvReader, TrainedModel, write_predictions};
use mlc_models::ColumnPreprocessor;
use tracing::{info, instrument};

use crate::RunContext;
use crate::error::Error;

/// Score and decision for one row.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct Prediction {
    /// Calibrated positive-class probability.
    pub probability: f64,
    /// `1` when `probability >= threshold`.
    pub label: u8,
}

/// A trained model loaded from an artifact directory.
#[derive(Debug, Clone)]
pub struct InferenceModel {
    preprocessor: ColumnPreprocessor,
    model: TrainedModel,
    threshold: f64,
}

impl InferenceModel {
    /// Load `preprocessor.bin`, `model.bin` and `thresholds.json` from `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when an artifact is missing, corrupt, or from
    /// an incompatible format version.
    #[instrument(fields(dir = %dir.display()))]
    pub fn load(dir: &Path) -> Result<Self, Error> {
        let store = ArtifactStore::open(dir);
        let preprocessor = store.load_preprocessor()?;
        let model = store.load_model()?;
        let threshold = store.read_thresholds()?.optimal;
        info!(threshold, method = %model.method(), "inference model loaded");
        Ok(Self {
            preprocessor,
            model,
            threshold,
        })
    }

    /// The decision threshold.
    #[must_use]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Column names and kinds the model expects.
    #[must_use]
    pub fn input_schema(&self) -> Vec<(&str, ColumnKind)> {
        self.preprocessor.input_schema()
    }

    /// Score every row of `table`.
    ///
    /// Columns are matched by name; extra columns are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Model`] when a training column is absent or has
    /// changed kind, and [`Error::Eval`] when prediction fails.
    pub fn predict(&self, table: &Table) -> Result<Vec<Prediction>, Error> {
        self.preprocessor.check_schema(table)?;
        let proba = self.model.predict_proba(table)?;
        Ok(proba
            .into_iter()
            .map(|probability| Prediction {
                probability,
                label: u8::from(probability >= self.threshold),
            })
            .collect())
    }

    /// Score the rows of a CSV file and write them to `out` with `proba`
    /// and `label` columns appended.
    ///
    /// # Errors
    ///
    /// As for [`InferenceModel::predict`], plus CSV read and write failures.
    pub fn predict_file(
        &self,
        input: &Path,
        out: &Path,
        ctx: &RunContext,
    ) -> Result<Vec<Prediction>, Error> {
        let _run = ctx.span().enter();
        let file = FeatureCsvReader::new(input, self.input_schema()).read()?;
        let predictions = self.predict(&file.table)?;
        let proba: Vec<f64> = predictions.iter().map(|p| p.probability).collect();
        let labels: Vec<u8> = predictions.iter().map(|p| p.label).collect();
        write_predictions(out, &file, &proba, &labels)?;
        info!(
            n_rows = predictions.len(),
            n_positive = labels.iter().filter(|&&l| l == 1).count(),
            "rows scored"
        );
        Ok(predictions)
    }
}
