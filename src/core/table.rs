//! Typed in-memory table used by the spreadsheet pipeline.
//!
//! A [`Table`] is an ordered list of equal-length [`Column`]s. Each column
//! is numeric, text, or mixed (numbers and text kept apart), and every cell
//! may be missing. Column order
//! and row order are preserved exactly as loaded.

use std::fmt;

use thiserror::Error;

/// Errors raised when assembling a table.
#[derive(Error, Debug, PartialEq)]
pub enum TableError {
    #[error("column '{name}' has {actual} rows, table has {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("duplicate column name: {0}")]
    DuplicateColumn(String),

    #[error("column not found: {0}")]
    ColumnNotFound(String),
}

/// Result type for table operations.
pub type Result<T> = std::result::Result<T, TableError>;

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
    Missing,
}

impl Value {
    /// Returns true for [`Value::Missing`].
    #[inline]
    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Missing => Ok(()),
        }
    }
}

/// Storage for one column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
    /// Numbers and text in one column; a number never equals its text form.
    Mixed(Vec<Value>),
}

impl ColumnData {
    fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Text(v) => v.len(),
            ColumnData::Mixed(v) => v.len(),
        }
    }
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    /// Creates a numeric column.
    pub fn numeric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Numeric(values),
        }
    }

    /// Creates a text column.
    pub fn text(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Text(values),
        }
    }

    /// Creates a column of mixed numbers and text.
    pub fn mixed(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            data: ColumnData::Mixed(values),
        }
    }

    /// Number of cells in the column.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when at least one cell is missing.
    pub fn is_nullable(&self) -> bool {
        match &self.data {
            ColumnData::Numeric(v) => v.iter().any(Option::is_none),
            ColumnData::Text(v) => v.iter().any(Option::is_none),
            ColumnData::Mixed(v) => v.iter().any(Value::is_missing),
        }
    }

    /// True when the column has no non-missing cell (an empty column counts).
    pub fn is_all_missing(&self) -> bool {
        match &self.data {
            ColumnData::Numeric(v) => v.iter().all(Option::is_none),
            ColumnData::Text(v) => v.iter().all(Option::is_none),
            ColumnData::Mixed(v) => v.iter().all(Value::is_missing),
        }
    }

    /// Cell at `row` as a [`Value`]. Out-of-range rows read as missing.
    pub fn value(&self, row: usize) -> Value {
        match &self.data {
            ColumnData::Numeric(v) => match v.get(row) {
                Some(Some(n)) => Value::Number(*n),
                _ => Value::Missing,
            },
            ColumnData::Text(v) => match v.get(row) {
                Some(Some(s)) => Value::Text(s.clone()),
                _ => Value::Missing,
            },
            ColumnData::Mixed(v) => v.get(row).cloned().unwrap_or(Value::Missing),
        }
    }

    /// All cells as [`Value`]s, in row order.
    pub fn values(&self) -> Vec<Value> {
        (0..self.len()).map(|i| self.value(i)).collect()
    }

    /// Numeric cells, or `None` for a text or mixed column.
    pub fn numeric_values(&self) -> Option<&[Option<f64>]> {
        match &self.data {
            ColumnData::Numeric(v) => Some(v),
            ColumnData::Text(_) | ColumnData::Mixed(_) => None,
        }
    }
}

/// Ordered collection of equal-length columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from columns, validating lengths and names.
    pub fn from_columns(columns: Vec<Column>) -> Result<Self> {
        let mut table = Self::new();
        for column in columns {
            table.push_column(column)?;
        }
        Ok(table)
    }

    /// Appends a column at the end of the table.
    pub fn push_column(&mut self, column: Column) -> Result<()> {
        if self.has_column(&column.name) {
            return Err(TableError::DuplicateColumn(column.name));
        }
        if let Some(first) = self.columns.first() {
            let actual = column.len();
            if first.len() != actual {
                return Err(TableError::LengthMismatch {
                    name: column.name,
                    expected: first.len(),
                    actual,
                });
            }
        }
        self.columns.push(column);
        Ok(())
    }

    /// Removes and returns a column.
    pub fn remove_column(&mut self, name: &str) -> Result<Column> {
        let idx = self
            .columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| TableError::ColumnNotFound(name.to_string()))?;
        Ok(self.columns.remove(idx))
    }

    /// Looks up a column by exact name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    #[inline]
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Column names in table order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// All columns in table order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[inline]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Number of rows (zero for a table without columns).
    #[inline]
    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    /// Cells of a named column as [`Value`]s.
    pub fn values(&self, name: &str) -> Result<Vec<Value>> {
        self.column(name)
            .map(Column::values)
            .ok_or_else(|| TableError::ColumnNotFound(name.to_string()))
    }
}
