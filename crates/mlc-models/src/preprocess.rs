//! Column-wise imputation, scaling and one-hot encoding.

use std::collections::BTreeMap;

use mlc_eval::{Column, ColumnKind, ColumnValues, Preprocessor, Table};
use tracing::{debug, instrument};

use crate::error::ModelError;

/// Learned transform for one input column.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
enum ColumnTransform {
    /// Median imputation then standard scaling.
    Numeric {
        name: String,
        median: f64,
        mean: f64,
        scale: f64,
    },
    /// Most-frequent imputation then one-hot encoding over sorted categories.
    Categorical {
        name: String,
        mode: Option<String>,
        categories: Vec<String>,
    },
}

impl ColumnTransform {
    fn name(&self) -> &str {
        match self {
            ColumnTransform::Numeric { name, .. } | ColumnTransform::Categorical { name, .. } => name,
        }
    }

    fn kind(&self) -> ColumnKind {
        match self {
            ColumnTransform::Numeric { .. } => ColumnKind::Numeric,
            ColumnTransform::Categorical { .. } => ColumnKind::Categorical,
        }
    }

    fn width(&self) -> usize {
        match self {
            ColumnTransform::Numeric { .. } => 1,
            ColumnTransform::Categorical { categories, .. } => categories.len(),
        }
    }
}

/// Turns a mixed [`Table`] into a dense matrix.
///
/// Numeric columns: missing values become the training median, then
/// `(v - mean) / std` (a zero-variance column scales by 1; an all-missing
/// column becomes zeros). Categorical columns: missing values become the
/// most frequent training category, then one indicator per sorted training
/// category. A category not seen during fit encodes as all zeros.
///
/// Columns are matched by name at transform time; columns the fit never saw
/// are ignored and a missing fitted column is an error.
///
/// Fitting never looks at labels.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ColumnPreprocessor {
    fitted: Option<Vec<ColumnTransform>>,
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

fn fit_numeric(name: &str, cells: &[Option<f64>]) -> ColumnTransform {
    let mut observed: Vec<f64> = cells.iter().flatten().copied().filter(|v| v.is_finite()).collect();
    let median = median(&mut observed).unwrap_or(0.0);
    let imputed: Vec<f64> = cells
        .iter()
        .map(|c| c.filter(|v| v.is_finite()).unwrap_or(median))
        .collect();
    let n = imputed.len() as f64;
    let mean = imputed.iter().sum::<f64>() / n;
    let var = imputed.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = var.sqrt();
    ColumnTransform::Numeric {
        name: name.to_owned(),
        median,
        mean,
        scale: if std > 0.0 { std } else { 1.0 },
    }
}

fn fit_categorical(name: &str, cells: &[Option<String>]) -> ColumnTransform {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for cell in cells.iter().flatten() {
        *counts.entry(cell.as_str()).or_default() += 1;
    }
    // Ties go to the smallest category: iteration is sorted and only a
    // strictly larger count replaces the current mode.
    let mode = counts
        .iter()
        .fold(None::<(&str, usize)>, |best, (&cat, &n)| match best {
            Some((_, m)) if m >= n => best,
            _ => Some((cat, n)),
        })
        .map(|(cat, _)| cat.to_owned());
    let categories = counts.keys().map(|&c| c.to_owned()).collect();
    ColumnTransform::Categorical {
        name: name.to_owned(),
        mode,
        categories,
    }
}

impl ColumnPreprocessor {
    /// Create an unfitted preprocessor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `true` once fitted.
    #[must_use]
    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Input column names and kinds seen during fit.
    #[must_use]
    pub fn input_schema(&self) -> Vec<(&str, ColumnKind)> {
        self.fitted
            .iter()
            .flatten()
            .map(|t| (t.name(), t.kind()))
            .collect()
    }

    /// Output feature names: numeric columns keep their name, categorical
    /// columns expand to `name_category`.
    #[must_use]
    pub fn feature_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for t in self.fitted.iter().flatten() {
            match t {
                ColumnTransform::Numeric { name, .. } => names.push(name.clone()),
                ColumnTransform::Categorical {
                    name, categories, ..
                } => names.extend(categories.iter().map(|c| format!("{name}_{c}"))),
            }
        }
        names
    }

    /// Check that `table` carries every fitted column with its fitted kind.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ModelError::NotFitted`] | not fitted yet |
    /// | [`ModelError::SchemaMismatch`] | a fitted column is absent |
    /// | [`ModelError::ColumnKindMismatch`] | a column changed kind |
    pub fn check_schema(&self, table: &Table) -> Result<(), ModelError> {
        let fitted = self
            .fitted
            .as_deref()
            .ok_or(ModelError::NotFitted { model: "preprocessor" })?;
        for (t, column) in fitted.iter().zip(Self::select_columns(fitted, table)?) {
            if t.kind() != column.kind() {
                return Err(ModelError::ColumnKindMismatch {
                    column: column.name().to_owned(),
                    expected: t.kind(),
                    got: column.kind(),
                });
            }
        }
        Ok(())
    }

    /// Look up every fitted column by name; extra table columns are ignored.
    fn select_columns<'t>(
        fitted: &[ColumnTransform],
        table: &'t Table,
    ) -> Result<Vec<&'t Column>, ModelError> {
        fitted
            .iter()
            .map(|t| {
                table.column(t.name()).ok_or_else(|| ModelError::SchemaMismatch {
                    expected: fitted.iter().map(|t| t.name().to_owned()).collect(),
                    got: table.names().into_iter().map(str::to_owned).collect(),
                })
            })
            .collect()
    }
}

impl Preprocessor for ColumnPreprocessor {
    type Error = ModelError;

    fn fresh(&self) -> Self {
        Self::default()
    }

    #[instrument(skip_all, fields(n_rows = table.n_rows(), n_columns = table.n_columns()))]
    fn fit(&mut self, table: &Table) -> Result<(), ModelError> {
        if table.n_rows() == 0 {
            return Err(ModelError::EmptyDataset);
        }
        let transforms: Vec<ColumnTransform> = table
            .columns()
            .iter()
            .map(|column| match column.values() {
                ColumnValues::Numeric(cells) => fit_numeric(column.name(), cells),
                ColumnValues::Categorical(cells) => fit_categorical(column.name(), cells),
            })
            .collect();
        debug!(
            n_outputs = transforms.iter().map(ColumnTransform::width).sum::<usize>(),
            "preprocessor fitted"
        );
        self.fitted = Some(transforms);
        Ok(())
    }

    fn transform(&self, table: &Table) -> Result<Vec<Vec<f64>>, ModelError> {
        let fitted = self
            .fitted
            .as_deref()
            .ok_or(ModelError::NotFitted { model: "preprocessor" })?;
        let columns = Self::select_columns(fitted, table)?;

        let width = fitted.iter().map(ColumnTransform::width).sum();
        let mut rows = vec![Vec::with_capacity(width); table.n_rows()];
        for (t, column) in fitted.iter().zip(columns) {
            match (t, column.values()) {
                (
                    ColumnTransform::Numeric {
                        median,
                        mean,
                        scale,
                        ..
                    },
                    ColumnValues::Numeric(cells),
                ) => {
                    for (row, cell) in rows.iter_mut().zip(cells) {
                        let v = cell.filter(|v| v.is_finite()).unwrap_or(*median);
                        row.push((v - mean) / scale);
                    }
                }
                (
                    ColumnTransform::Categorical {
                        mode, categories, ..
                    },
                    ColumnValues::Categorical(cells),
                ) => {
                    for (row, cell) in rows.iter_mut().zip(cells) {
                        let value = cell.as_deref().or(mode.as_deref());
                        let hot = value.and_then(|v| categories.binary_search_by(|c| c.as_str().cmp(v)).ok());
                        row.extend((0..categories.len()).map(|i| if Some(i) == hot { 1.0 } else { 0.0 }));
                    }
                }
                _ => {
                    return Err(ModelError::ColumnKindMismatch {
                        column: column.name().to_owned(),
                        expected: t.kind(),
                        got: column.kind(),
                    });
                }
            }
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cats(values: &[Option<&str>]) -> Vec<Option<String>> {
        values.iter().map(|v| v.map(str::to_owned)).collect()
    }

    fn training_table() -> Table {
        Table::new(vec![
            Column::numeric("num", vec![Some(1.0), None, Some(3.0), Some(5.0)]),
            Column::categorical("cat", cats(&[Some("b"), Some("a"), None, Some("b")])),
        ])
        .unwrap()
    }

    #[test]
    fn numeric_median_impute_and_scale() {
        let mut pre = ColumnPreprocessor::new();
        pre.fit(&training_table()).unwrap();
        let out = pre.transform(&training_table()).unwrap();
        // Imputed column is [1, 3, 3, 5]: mean 3, std sqrt(2).
        let col: Vec<f64> = out.iter().map(|r| r[0]).collect();
        let s = 2f64.sqrt();
        let expected = [-2.0 / s, 0.0, 0.0, 2.0 / s];
        for (a, b) in col.iter().zip(expected) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn categorical_mode_impute_and_one_hot() {
        let mut pre = ColumnPreprocessor::new();
        pre.fit(&training_table()).unwrap();
        assert_eq!(pre.feature_names(), vec!["num", "cat_a", "cat_b"]);
        let out = pre.transform(&training_table()).unwrap();
        let one_hot: Vec<&[f64]> = out.iter().map(|r| &r[1..]).collect();
        assert_eq!(
            one_hot,
            vec![&[0.0, 1.0][..], &[1.0, 0.0][..], &[0.0, 1.0][..], &[0.0, 1.0][..]]
        );
    }

    #[test]
    fn unseen_category_encodes_as_zeros() {
        let train = Table::new(vec![Column::categorical("c", cats(&[Some("a"), Some("b")]))]).unwrap();
        let test = Table::new(vec![Column::categorical("c", cats(&[Some("z"), Some("a")]))]).unwrap();
        let mut pre = ColumnPreprocessor::new();
        pre.fit(&train).unwrap();
        let out = pre.transform(&test).unwrap();
        assert_eq!(out, vec![vec![0.0, 0.0], vec![1.0, 0.0]]);
    }

    #[test]
    fn constant_and_all_missing_columns() {
        let table = Table::new(vec![
            Column::numeric("const", vec![Some(4.0); 3]),
            Column::numeric("empty", vec![None; 3]),
        ])
        .unwrap();
        let mut pre = ColumnPreprocessor::new();
        pre.fit(&table).unwrap();
        let out = pre.transform(&table).unwrap();
        assert!(out.iter().flatten().all(|&v| v == 0.0));
    }

    #[test]
    fn mode_tie_picks_smallest_category() {
        let cells = cats(&[Some("b"), Some("a"), Some("b"), Some("a")]);
        let ColumnTransform::Categorical { mode, .. } = fit_categorical("c", &cells) else {
            panic!("expected categorical transform");
        };
        assert_eq!(mode.as_deref(), Some("a"));
    }

    #[test]
    fn schema_checked() {
        let mut pre = ColumnPreprocessor::new();
        pre.fit(&training_table()).unwrap();

        let renamed = Table::new(vec![
            Column::numeric("other", vec![Some(1.0)]),
            Column::categorical("cat", cats(&[Some("a")])),
        ])
        .unwrap();
        assert!(matches!(pre.transform(&renamed), Err(ModelError::SchemaMismatch { .. })));

        let retyped = Table::new(vec![
            Column::categorical("num", cats(&[Some("1")])),
            Column::categorical("cat", cats(&[Some("a")])),
        ])
        .unwrap();
        assert!(matches!(
            pre.transform(&retyped),
            Err(ModelError::ColumnKindMismatch { .. })
        ));
    }

    #[test]
    fn columns_matched_by_name() {
        let mut pre = ColumnPreprocessor::new();
        pre.fit(&training_table()).unwrap();
        let reordered = Table::new(vec![
            Column::categorical("cat", cats(&[Some("a")])),
            Column::numeric("target", vec![Some(1.0)]),
            Column::numeric("num", vec![Some(3.0)]),
        ])
        .unwrap();
        assert_eq!(pre.transform(&reordered).unwrap(), vec![vec![0.0, 1.0, 0.0]]);
    }

    #[test]
    fn schema_check_names_the_problem() {
        let mut pre = ColumnPreprocessor::new();
        assert!(matches!(
            pre.check_schema(&training_table()),
            Err(ModelError::NotFitted { .. })
        ));
        pre.fit(&training_table()).unwrap();
        assert!(pre.check_schema(&training_table()).is_ok());

        let missing = Table::new(vec![Column::numeric("num", vec![Some(1.0)])]).unwrap();
        assert!(matches!(
            pre.check_schema(&missing),
            Err(ModelError::SchemaMismatch { .. })
        ));
        let retyped = Table::new(vec![
            Column::numeric("num", vec![Some(1.0)]),
            Column::numeric("cat", vec![Some(2.0)]),
        ])
        .unwrap();
        assert!(matches!(
            pre.check_schema(&retyped),
            Err(ModelError::ColumnKindMismatch { column, .. }) if column == "cat"
        ));
    }

    #[test]
    fn transform_before_fit_errors() {
        let pre = ColumnPreprocessor::new();
        assert!(matches!(
            pre.transform(&training_table()),
            Err(ModelError::NotFitted { model: "preprocessor" })
        ));
    }

    #[test]
    fn fresh_is_unfitted() {
        let mut pre = ColumnPreprocessor::new();
        pre.fit(&training_table()).unwrap();
        assert!(pre.is_fitted());
        assert!(!pre.fresh().is_fitted());
    }
}
