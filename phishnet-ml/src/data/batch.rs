//! In-memory tabular batch shared by the sources and the stages.

use crate::error::MlError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// A batch of data rows. Cells are JSON values so every source shape
/// (CSV text, document export, API payload) lands in the same container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl DataBatch {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Build a batch from JSON objects. Column order follows the first object;
    /// keys missing from later objects become nulls.
    pub fn from_json_items(items: &[Value]) -> Self {
        let columns: Vec<String> = match items.first() {
            Some(Value::Object(map)) => map.keys().cloned().collect(),
            Some(_) => vec!["value".to_string()],
            None => return Self::empty(),
        };

        let rows = items
            .iter()
            .map(|item| match item {
                Value::Object(_) => columns
                    .iter()
                    .map(|col| item.get(col).cloned().unwrap_or(Value::Null))
                    .collect(),
                other => vec![other.clone()],
            })
            .collect();

        Self { columns, rows }
    }

    /// Read a CSV file with a header row. Numeric-looking cells become JSON
    /// numbers, everything else stays a string.
    pub fn read_csv(path: &Path) -> Result<Self, MlError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)?;
        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if columns.is_empty() {
            return Err(MlError::dataset(format!(
                "{} has no header row",
                path.display()
            )));
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            if record.len() != columns.len() {
                return Err(MlError::dataset(format!(
                    "{}: row {} has {} fields, expected {}",
                    path.display(),
                    rows.len() + 1,
                    record.len(),
                    columns.len()
                )));
            }
            rows.push(record.iter().map(parse_cell).collect());
        }

        Ok(Self { columns, rows })
    }

    /// Write the batch as CSV with a header row, creating parent directories.
    pub fn write_csv(&self, path: &Path) -> Result<(), MlError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(render_cell))?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Remove a column if present. Returns whether anything was dropped.
    pub fn drop_column(&mut self, name: &str) -> bool {
        let Some(idx) = self.column_index(name) else {
            return false;
        };
        self.columns.remove(idx);
        for row in &mut self.rows {
            if idx < row.len() {
                row.remove(idx);
            }
        }
        true
    }

    /// Turn empty strings into nulls and drop every row containing a null.
    /// Returns the number of rows removed.
    pub fn drop_incomplete_rows(&mut self) -> usize {
        let before = self.rows.len();
        for row in &mut self.rows {
            for cell in row.iter_mut() {
                if matches!(cell, Value::String(s) if s.trim().is_empty()) {
                    *cell = Value::Null;
                }
            }
        }
        self.rows.retain(|row| !row.iter().any(Value::is_null));
        before - self.rows.len()
    }

    /// A new batch holding the given rows, in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: indices
                .iter()
                .filter_map(|&i| self.rows.get(i).cloned())
                .collect(),
        }
    }

    /// All values of one column as numbers. Nulls and non-numeric text are errors.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>, MlError> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| MlError::dataset(format!("column '{name}' not found")))?;
        self.rows
            .iter()
            .enumerate()
            .map(|(row_no, row)| {
                row.get(idx).and_then(value_as_f64).ok_or_else(|| {
                    MlError::invalid_input(format!(
                        "column '{name}' row {row_no} is not numeric: {}",
                        row.get(idx).map(render_cell).unwrap_or_default()
                    ))
                })
            })
            .collect()
    }

    /// Numeric matrix of the named columns, row-major. Nulls and empty cells
    /// become NaN so they can be imputed; non-numeric text is an error.
    pub fn numeric_matrix(&self, columns: &[String]) -> Result<Vec<Vec<f64>>, MlError> {
        let indices = columns
            .iter()
            .map(|name| {
                self.column_index(name)
                    .ok_or_else(|| MlError::dataset(format!("column '{name}' not found")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.rows
            .iter()
            .enumerate()
            .map(|(row_no, row)| {
                indices
                    .iter()
                    .zip(columns)
                    .map(|(&idx, name)| match row.get(idx) {
                        None | Some(Value::Null) => Ok(f64::NAN),
                        Some(Value::String(s)) if s.trim().is_empty() => Ok(f64::NAN),
                        Some(v) => value_as_f64(v).ok_or_else(|| {
                            MlError::invalid_input(format!(
                                "column '{name}' row {row_no} is not numeric: {}",
                                render_cell(v)
                            ))
                        }),
                    })
                    .collect()
            })
            .collect()
    }

    /// Append a column; `values` must have one entry per row.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<Value>) -> Result<(), MlError> {
        if values.len() != self.rows.len() {
            return Err(MlError::invalid_input(format!(
                "column has {} values for {} rows",
                values.len(),
                self.rows.len()
            )));
        }
        self.columns.push(name.into());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }
}

/// Numeric view of a cell. Strings are parsed; booleans map to 0/1.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn parse_cell(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::String(String::new());
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = raw.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(raw.to_string())
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
