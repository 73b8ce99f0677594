//! CSV dataset readers for training and inference.

use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use mlc_eval::{Column, ColumnKind, Table};
use tracing::{debug, info, instrument};

use crate::error::IoError;

/// Cell contents treated as missing.
const MISSING_TOKENS: [&str; 5] = ["", "NA", "NaN", "nan", "null"];

/// A feature table with aligned binary labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    /// Feature columns; the target column is never included.
    pub table: Table,
    /// One label in `{0, 1}` per row.
    pub labels: Vec<u8>,
}

impl Dataset {
    /// Number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.labels.len()
    }

    /// Number of positive labels.
    #[must_use]
    pub fn n_positive(&self) -> usize {
        self.labels.iter().filter(|&&l| l == 1).count()
    }

    /// Rows at `indices`, in that order.
    #[must_use]
    pub fn take(&self, indices: &[usize]) -> Self {
        Self {
            table: self.table.take(indices),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }
}

/// A feature file read for scoring: the parsed table plus the raw rows so
/// they can be echoed next to the predictions.
#[derive(Debug, Clone)]
pub struct FeatureFile {
    /// Header names in file order.
    pub headers: Vec<String>,
    /// Raw cells per row, in file order.
    pub records: Vec<Vec<String>>,
    /// Parsed columns.
    pub table: Table,
}

fn is_missing(raw: &str) -> bool {
    MISSING_TOKENS.contains(&raw.trim())
}

fn parse_finite(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

struct RawCsv {
    headers: Vec<String>,
    records: Vec<Vec<String>>,
}

fn csv_error(path: &Path, e: csv::Error) -> IoError {
    IoError::CsvParse {
        path: path.to_path_buf(),
        offset: e.position().map_or(0, |p| p.byte()),
        source: e,
    }
}

/// Read every record, checking row lengths against the header.
fn read_raw(path: &Path) -> Result<RawCsv, IoError> {
    let file = File::open(path).map_err(|e| IoError::FileNotFound {
        path: path.to_path_buf(),
        source: e,
    })?;

    // flexible(true) so short or long rows surface as InconsistentRowLength.
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file);

    let headers: Vec<String> = rdr
        .headers()
        .map_err(|e| csv_error(path, e))?
        .iter()
        .map(|h| h.trim().to_owned())
        .collect();
    debug!(n_columns = headers.len(), "read CSV header");

    let mut records = Vec::new();
    for (row_index, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| csv_error(path, e))?;
        if record.len() != headers.len() {
            return Err(IoError::InconsistentRowLength {
                path: path.to_path_buf(),
                row_index,
                expected: headers.len(),
                got: record.len(),
            });
        }
        records.push(record.iter().map(str::to_owned).collect());
    }

    if records.is_empty() {
        return Err(IoError::EmptyDataset {
            path: path.to_path_buf(),
        });
    }
    Ok(RawCsv { headers, records })
}

/// Build one column from raw cells.
///
/// With a numeric `hint` every present cell must parse; without a hint the
/// column is numeric exactly when every present cell parses as a finite number.
fn build_column(
    path: &Path,
    name: &str,
    cells: &[&str],
    hint: Option<ColumnKind>,
) -> Result<Column, IoError> {
    let kind = hint.unwrap_or_else(|| {
        if cells.iter().all(|c| is_missing(c) || parse_finite(c).is_some()) {
            ColumnKind::Numeric
        } else {
            ColumnKind::Categorical
        }
    });
    match kind {
        ColumnKind::Numeric => {
            let values = cells
                .iter()
                .enumerate()
                .map(|(row_index, raw)| {
                    if is_missing(raw) {
                        return Ok(None);
                    }
                    parse_finite(raw).map(Some).ok_or_else(|| IoError::NonNumericValue {
                        path: path.to_path_buf(),
                        row_index,
                        column: name.to_owned(),
                        raw: (*raw).to_owned(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Column::numeric(name, values))
        }
        ColumnKind::Categorical => Ok(Column::categorical(
            name,
            cells
                .iter()
                .map(|raw| (!is_missing(raw)).then(|| raw.trim().to_owned()))
                .collect(),
        )),
    }
}

fn parse_label(path: &Path, row_index: usize, raw: &str) -> Result<u8, IoError> {
    match parse_finite(raw) {
        Some(v) if v == 0.0 => Ok(0),
        Some(v) if v == 1.0 => Ok(1),
        _ => Err(IoError::InvalidLabel {
            path: path.to_path_buf(),
            row_index,
            raw: raw.to_owned(),
        }),
    }
}

/// Reads a labelled training CSV.
///
/// Expected format: a header row, one row per example, and a `target`
/// column holding `0` or `1`. Every other column becomes a feature; its
/// kind is inferred (numeric when every present cell is a finite number,
/// categorical otherwise). Empty, `NA`, `NaN`, `nan` and `null` cells are
/// missing values.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed CSV record |
/// | [`IoError::EmptyDataset`] | Zero data rows after header |
/// | [`IoError::InconsistentRowLength`] | Row has different column count than header |
/// | [`IoError::MissingTargetColumn`] | Target column absent from header |
/// | [`IoError::InvalidLabel`] | Target cell is not 0 or 1 |
pub struct CsvDatasetReader {
    path: PathBuf,
    target: String,
}

impl CsvDatasetReader {
    /// Create a reader for `path` using `target` as the label column.
    pub fn new(path: &Path, target: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            target: target.into(),
        }
    }

    /// Read and validate the file.
    #[instrument(skip(self), fields(path = %self.path.display(), target = %self.target))]
    pub fn read(&self) -> Result<Dataset, IoError> {
        let raw = read_raw(&self.path)?;
        let target_idx = raw
            .headers
            .iter()
            .position(|h| *h == self.target)
            .ok_or_else(|| IoError::MissingTargetColumn {
                path: self.path.clone(),
                target: self.target.clone(),
            })?;

        let labels = raw
            .records
            .iter()
            .enumerate()
            .map(|(row_index, row)| parse_label(&self.path, row_index, &row[target_idx]))
            .collect::<Result<Vec<_>, _>>()?;

        let mut columns = Vec::with_capacity(raw.headers.len() - 1);
        for (j, name) in raw.headers.iter().enumerate() {
            if j == target_idx {
                continue;
            }
            let cells: Vec<&str> = raw.records.iter().map(|r| r[j].as_str()).collect();
            columns.push(build_column(&self.path, name, &cells, None)?);
        }
        let table = Table::new(columns)?;

        info!(
            n_rows = table.n_rows(),
            n_columns = table.n_columns(),
            n_pos = labels.iter().filter(|&&l| l == 1).count(),
            "dataset loaded"
        );
        Ok(Dataset { table, labels })
    }
}

/// Reads an unlabelled CSV of rows to score.
///
/// Column kinds named in the schema hint are enforced, so a column that was
/// numeric at training time fails loudly on a non-numeric cell instead of
/// silently turning categorical. Columns not in the hint are inferred.
///
/// # Errors
///
/// As for [`CsvDatasetReader`], except labels are not read, plus
/// [`IoError::NonNumericValue`] for a bad cell in a hinted numeric column.
pub struct FeatureCsvReader {
    path: PathBuf,
    kinds: HashMap<String, ColumnKind>,
}

impl FeatureCsvReader {
    /// Create a reader for `path` with `(name, kind)` hints.
    pub fn new<'a>(path: &Path, schema: impl IntoIterator<Item = (&'a str, ColumnKind)>) -> Self {
        Self {
            path: path.to_path_buf(),
            kinds: schema
                .into_iter()
                .map(|(name, kind)| (name.to_owned(), kind))
                .collect(),
        }
    }

    /// Read the file.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self) -> Result<FeatureFile, IoError> {
        let raw = read_raw(&self.path)?;
        let mut columns = Vec::with_capacity(raw.headers.len());
        for (j, name) in raw.headers.iter().enumerate() {
            let cells: Vec<&str> = raw.records.iter().map(|r| r[j].as_str()).collect();
            let hint = self.kinds.get(name).copied();
            columns.push(build_column(&self.path, name, &cells, hint)?);
        }
        let table = Table::new(columns)?;
        info!(n_rows = table.n_rows(), "feature file loaded");
        Ok(FeatureFile {
            headers: raw.headers,
            records: raw.records,
            table,
        })
    }
}
