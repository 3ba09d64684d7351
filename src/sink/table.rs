//! Named, typed metric tables handed to sinks

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::records::value::format_timestamp;

/// Logical type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Text,
    Float,
    Bool,
    Timestamp,
}

/// Column definition; every column is nullable
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }

    pub fn text(name: &str) -> Self {
        Self::new(name, ColumnType::Text)
    }

    pub fn float(name: &str) -> Self {
        Self::new(name, ColumnType::Float)
    }

    pub fn bool(name: &str) -> Self {
        Self::new(name, ColumnType::Bool)
    }

    pub fn timestamp(name: &str) -> Self {
        Self::new(name, ColumnType::Timestamp)
    }
}

/// One value in a table
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Text(String),
    Float(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl Cell {
    /// Text rendering used by delimited sinks; null is the empty string
    pub fn render(&self) -> String {
        match self {
            Cell::Null => String::new(),
            Cell::Text(s) => s.clone(),
            Cell::Float(f) => f.to_string(),
            Cell::Bool(b) => b.to_string(),
            Cell::Timestamp(ts) => format_timestamp(ts),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Float(value)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Cell::Bool(value)
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<DateTime<Utc>> for Cell {
    fn from(value: DateTime<Utc>) -> Self {
        Cell::Timestamp(value)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Cell::Null)
    }
}

/// A metric row type that knows its table layout
pub trait TableRow {
    fn columns() -> Vec<Column>;
    fn cells(&self) -> Vec<Cell>;
}

/// A complete metric table
#[derive(Debug, Clone, PartialEq)]
pub struct MetricTable {
    name: String,
    columns: Vec<Column>,
    rows: Vec<Vec<Cell>>,
}

impl MetricTable {
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from typed rows
    pub fn from_rows<R: TableRow>(name: impl Into<String>, rows: &[R]) -> Self {
        Self {
            name: name.into(),
            columns: R::columns(),
            rows: rows.iter().map(TableRow::cells).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Value at `row` in the named column
    pub fn cell(&self, row: usize, column: &str) -> Option<&Cell> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Append a row; missing trailing cells are padded with nulls
    pub fn push_row(&mut self, mut cells: Vec<Cell>) {
        cells.resize(self.columns.len(), Cell::Null);
        self.rows.push(cells);
    }

    /// Drop the named columns
    pub fn without_columns(mut self, names: &[&str]) -> Self {
        let keep: Vec<bool> = self
            .columns
            .iter()
            .map(|c| !names.contains(&c.name.as_str()))
            .collect();
        let filter = |items: Vec<Cell>| -> Vec<Cell> {
            items
                .into_iter()
                .zip(&keep)
                .filter_map(|(cell, keep)| keep.then_some(cell))
                .collect()
        };
        self.rows = self.rows.into_iter().map(filter).collect();
        self.columns = self
            .columns
            .into_iter()
            .zip(&keep)
            .filter_map(|(column, keep)| keep.then_some(column))
            .collect();
        self
    }
}
