//! Column-oriented tabular feature data with mixed numeric/categorical columns.

use std::fmt;

use crate::error::EvalError;

/// Whether a column holds numbers or category strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ColumnKind {
    /// Floating-point values.
    Numeric,
    /// String category labels.
    Categorical,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKind::Numeric => f.write_str("numeric"),
            ColumnKind::Categorical => f.write_str("categorical"),
        }
    }
}

/// Cell values of one column. `None` marks a missing value.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    /// Numeric cells.
    Numeric(Vec<Option<f64>>),
    /// Categorical cells.
    Categorical(Vec<Option<String>>),
}

impl ColumnValues {
    fn len(&self) -> usize {
        match self {
            ColumnValues::Numeric(v) => v.len(),
            ColumnValues::Categorical(v) => v.len(),
        }
    }

    fn take(&self, indices: &[usize]) -> Self {
        match self {
            ColumnValues::Numeric(v) => {
                ColumnValues::Numeric(indices.iter().map(|&i| v[i]).collect())
            }
            ColumnValues::Categorical(v) => {
                ColumnValues::Categorical(indices.iter().map(|&i| v[i].clone()).collect())
            }
        }
    }
}

/// A named column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    name: String,
    values: ColumnValues,
}

impl Column {
    /// Create a numeric column.
    pub fn numeric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Numeric(values),
        }
    }

    /// Create a categorical column.
    pub fn categorical(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Categorical(values),
        }
    }

    /// Return the column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the column kind.
    #[must_use]
    pub fn kind(&self) -> ColumnKind {
        match self.values {
            ColumnValues::Numeric(_) => ColumnKind::Numeric,
            ColumnValues::Categorical(_) => ColumnKind::Categorical,
        }
    }

    /// Return the cell values.
    #[must_use]
    pub fn values(&self) -> &ColumnValues {
        &self.values
    }

    /// Return the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Return `true` if the column has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A feature table: N rows by M named columns.
///
/// All columns share the same row count, checked at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    n_rows: usize,
}

impl Table {
    /// Build a table from columns.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::RaggedTable`] if the columns differ in length.
    pub fn new(columns: Vec<Column>) -> Result<Self, EvalError> {
        let n_rows = columns.first().map_or(0, Column::len);
        for column in &columns {
            if column.len() != n_rows {
                return Err(EvalError::RaggedTable {
                    column: column.name.clone(),
                    expected: n_rows,
                    got: column.len(),
                });
            }
        }
        Ok(Self { columns, n_rows })
    }

    /// Build an all-numeric table from row-major values with generated names `x00`, `x01`, ...
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, EvalError> {
        let n_cols = rows.first().map_or(0, Vec::len);
        let columns = (0..n_cols)
            .map(|j| {
                Column::numeric(
                    format!("x{j:02}"),
                    rows.iter().map(|r| r.get(j).copied()).collect(),
                )
            })
            .collect();
        Self::new(columns)
    }

    /// Return the number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Return the number of columns.
    #[must_use]
    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    /// Return all columns in order.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Look up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Return column names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    /// Return a new table containing the given rows, in the given order.
    ///
    /// # Panics
    ///
    /// Panics if any index is out of bounds.
    #[must_use]
    pub fn take(&self, indices: &[usize]) -> Self {
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                name: c.name.clone(),
                values: c.values.take(indices),
            })
            .collect();
        Self {
            columns,
            n_rows: indices.len(),
        }
    }

    /// Add a column at the end.
    ///
    /// # Errors
    ///
    /// Returns [`EvalError::RaggedTable`] if the column length differs from the table's.
    pub fn push_column(&mut self, column: Column) -> Result<(), EvalError> {
        let got = column.len();
        if !self.columns.is_empty() && got != self.n_rows {
            return Err(EvalError::RaggedTable {
                column: column.name,
                expected: self.n_rows,
                got,
            });
        }
        self.n_rows = got;
        self.columns.push(column);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::new(vec![
            Column::numeric("a", vec![Some(1.0), None, Some(3.0)]),
            Column::categorical(
                "b",
                vec![Some("x".into()), Some("y".into()), None],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn shape() {
        let t = sample();
        assert_eq!(t.n_rows(), 3);
        assert_eq!(t.n_columns(), 2);
        assert_eq!(t.names(), vec!["a", "b"]);
    }

    #[test]
    fn ragged_columns_rejected() {
        let err = Table::new(vec![
            Column::numeric("a", vec![Some(1.0)]),
            Column::numeric("b", vec![Some(1.0), Some(2.0)]),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            EvalError::RaggedTable { expected: 1, got: 2, .. }
        ));
    }

    #[test]
    fn take_reorders_rows() {
        let t = sample().take(&[2, 0]);
        assert_eq!(t.n_rows(), 2);
        assert_eq!(
            t.column("a").unwrap().values(),
            &ColumnValues::Numeric(vec![Some(3.0), Some(1.0)])
        );
        assert_eq!(
            t.column("b").unwrap().values(),
            &ColumnValues::Categorical(vec![None, Some("x".into())])
        );
    }

    #[test]
    fn from_rows_names_columns() {
        let t = Table::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(t.names(), vec!["x00", "x01"]);
        assert_eq!(t.column("x01").unwrap().kind(), ColumnKind::Numeric);
    }

    #[test]
    fn push_column_checks_length() {
        let mut t = sample();
        let err = t.push_column(Column::numeric("c", vec![Some(0.0)])).unwrap_err();
        assert!(matches!(
            err,
            EvalError::RaggedTable { ref column, expected: 3, got: 1 } if column == "c"
        ));
        t.push_column(Column::numeric("c", vec![Some(0.0); 3])).unwrap();
        assert_eq!(t.n_columns(), 3);
    }
}
