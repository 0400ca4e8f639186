use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

/// Typed cell values. Source data mostly arrives as text but column types are
/// inferred by the parsers and preserved here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
}

impl FieldValue {
    /// Extract as string, returning None for non-text values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Numeric view of the value. Booleans map to 0/1; text and null have none.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Integer(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            FieldValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            FieldValue::Text(_) | FieldValue::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Convert a JSON value to a cell. Arrays and objects are kept as JSON text.
    pub fn from_json(v: &Value) -> Self {
        match v {
            Value::String(s) => FieldValue::Text(s.clone()),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    FieldValue::Float(f)
                } else {
                    FieldValue::Text(n.to_string())
                }
            }
            Value::Bool(b) => FieldValue::Boolean(*b),
            Value::Null => FieldValue::Null,
            other => FieldValue::Text(other.to_string()),
        }
    }

    /// Render the cell as a label (used for class targets).
    pub fn to_label(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Float(f) => f.to_string(),
            FieldValue::Boolean(b) => b.to_string(),
            FieldValue::Null => String::new(),
        }
    }
}

/// Processed data payload: named columns plus rows of typed cells.
///
/// Every row has exactly `columns.len()` cells. Row order is significant: a
/// dataset's table lists its chunks' rows in chunk insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<FieldValue>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table, checking that every row matches the column count.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<FieldValue>>) -> Result<Self, CoreError> {
        let mut table = Self::new(columns);
        for row in rows {
            table.push_row(row)?;
        }
        Ok(table)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<FieldValue>] {
        &self.rows
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_row(&mut self, row: Vec<FieldValue>) -> Result<(), CoreError> {
        if row.len() != self.columns.len() {
            return Err(CoreError::RowWidth {
                row: self.rows.len(),
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cells of a single column, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<&FieldValue>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| &r[idx]).collect())
    }

    /// Remove the named columns. Names are compared case-sensitively and
    /// names that are not present are ignored.
    pub fn drop_columns(&mut self, names: &[String]) {
        if names.is_empty() {
            return;
        }
        let keep: Vec<bool> = self.columns.iter().map(|c| !names.contains(c)).collect();
        if keep.iter().all(|k| *k) {
            return;
        }

        self.columns = retain_by_mask(std::mem::take(&mut self.columns), &keep);
        for row in &mut self.rows {
            *row = retain_by_mask(std::mem::take(row), &keep);
        }
    }

    /// Lowercase every text cell using Unicode default case mapping.
    pub fn lowercase_text(&mut self) {
        for cell in self.rows.iter_mut().flatten() {
            if let FieldValue::Text(s) = cell {
                *s = s.to_lowercase();
            }
        }
    }

    /// True when both tables have the same column names, in any order.
    pub fn same_column_set(&self, other: &Table) -> bool {
        self.columns.len() == other.columns.len()
            && other.columns.iter().all(|c| self.columns.contains(c))
    }

    /// Append `other`'s rows below this table's rows.
    ///
    /// Columns are matched by name, so `other` may list them in a different
    /// order. An empty-column table adopts `other`'s columns.
    pub fn append(&mut self, other: Table) -> Result<(), CoreError> {
        if self.columns.is_empty() && self.rows.is_empty() {
            *self = other;
            return Ok(());
        }
        if !self.same_column_set(&other) {
            return Err(CoreError::ColumnMismatch {
                expected: self.columns.join(", "),
                found: other.columns.join(", "),
            });
        }

        if self.columns == other.columns {
            self.rows.extend(other.rows);
            return Ok(());
        }

        let order: Vec<usize> = self
            .columns
            .iter()
            .filter_map(|c| other.column_index(c))
            .collect();
        for row in other.rows {
            self.rows.push(order.iter().map(|&i| row[i].clone()).collect());
        }
        Ok(())
    }
}

fn retain_by_mask<T>(items: Vec<T>, keep: &[bool]) -> Vec<T> {
    items
        .into_iter()
        .zip(keep)
        .filter_map(|(item, k)| k.then_some(item))
        .collect()
}
