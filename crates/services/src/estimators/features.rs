//! Numeric views over a [`Table`] shared by the reference estimators.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use mlswarm_core::Table;

use crate::error::EstimatorError;

/// File name of a persisted model inside a training report directory.
pub const MODEL_FILE: &str = "model.json";

/// Resolve the feature columns: the requested ones, or every column except
/// the target when none are requested.
pub fn feature_columns(
    table: &Table,
    target: Option<&str>,
    requested: &[String],
    operation: &'static str,
) -> Result<Vec<String>, EstimatorError> {
    let columns: Vec<String> = if requested.is_empty() {
        table
            .columns()
            .iter()
            .filter(|c| Some(c.as_str()) != target)
            .cloned()
            .collect()
    } else {
        requested.to_vec()
    };

    if columns.is_empty() {
        return Err(EstimatorError::execution(operation, "no feature columns"));
    }
    if let Some(missing) = columns.iter().find(|c| table.column_index(c).is_none()) {
        return Err(EstimatorError::execution(
            operation,
            format!("feature column '{}' not found", missing),
        ));
    }
    Ok(columns)
}

/// Row-major feature matrix. Every cell must be numeric (booleans count as 0/1).
pub fn numeric_matrix(
    table: &Table,
    columns: &[String],
    operation: &'static str,
) -> Result<Vec<Vec<f64>>, EstimatorError> {
    let indices = column_indices(table, columns, operation)?;
    table
        .rows()
        .iter()
        .enumerate()
        .map(|(r, row)| {
            indices
                .iter()
                .zip(columns)
                .map(|(&i, name)| {
                    row[i].as_f64().ok_or_else(|| {
                        EstimatorError::execution(
                            operation,
                            format!("column '{}' row {} is not numeric", name, r),
                        )
                    })
                })
                .collect()
        })
        .collect()
}

/// Numeric target vector.
pub fn numeric_target(
    table: &Table,
    target: &str,
    operation: &'static str,
) -> Result<Vec<f64>, EstimatorError> {
    let column = [target.to_string()];
    Ok(numeric_matrix(table, &column, operation)?
        .into_iter()
        .map(|row| row[0])
        .collect())
}

/// Class labels of the target column. Null targets are rejected.
pub fn labels(
    table: &Table,
    target: &str,
    operation: &'static str,
) -> Result<Vec<String>, EstimatorError> {
    let cells = table.column(target).ok_or_else(|| {
        EstimatorError::execution(operation, format!("target column '{}' not found", target))
    })?;
    cells
        .into_iter()
        .enumerate()
        .map(|(r, cell)| {
            if cell.is_null() {
                Err(EstimatorError::execution(
                    operation,
                    format!("target column '{}' row {} is empty", target, r),
                ))
            } else {
                Ok(cell.to_label())
            }
        })
        .collect()
}

fn column_indices(
    table: &Table,
    columns: &[String],
    operation: &'static str,
) -> Result<Vec<usize>, EstimatorError> {
    columns
        .iter()
        .map(|c| {
            table.column_index(c).ok_or_else(|| {
                EstimatorError::execution(operation, format!("column '{}' not found", c))
            })
        })
        .collect()
}

/// Per-feature mean/scale standardisation. Constant features keep scale 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
}

impl Standardizer {
    /// Identity transform of the given width.
    pub fn identity(dim: usize) -> Self {
        Self {
            means: vec![0.0; dim],
            scales: vec![1.0; dim],
        }
    }

    pub fn fit(points: &[Vec<f64>]) -> Self {
        let dim = points.first().map(Vec::len).unwrap_or(0);
        if points.is_empty() {
            return Self::identity(dim);
        }
        let n = points.len() as f64;

        let mut means = vec![0.0; dim];
        for p in points {
            for (m, v) in means.iter_mut().zip(p) {
                *m += v;
            }
        }
        for m in means.iter_mut() {
            *m /= n;
        }

        let mut scales = vec![0.0; dim];
        for p in points {
            for ((s, v), m) in scales.iter_mut().zip(p).zip(&means) {
                let d = v - m;
                *s += d * d;
            }
        }
        for s in scales.iter_mut() {
            let std = (*s / n).sqrt();
            *s = if std > f64::EPSILON { std } else { 1.0 };
        }

        Self { means, scales }
    }

    pub fn transform(&self, point: &[f64]) -> Vec<f64> {
        point
            .iter()
            .zip(&self.means)
            .zip(&self.scales)
            .map(|((v, m), s)| (v - m) / s)
            .collect()
    }
}

/// Squared Euclidean distance.
#[inline]
pub fn squared_euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Persist a model into `dir/model.json`. Returns the written path.
pub fn save_model<T: Serialize>(dir: &Path, model: &T) -> Result<PathBuf, EstimatorError> {
    let path = dir.join(MODEL_FILE);
    fs::write(&path, serde_json::to_vec_pretty(model)?)?;
    Ok(path)
}

/// Read a model written by [`save_model`].
pub fn load_model<T: DeserializeOwned>(dir: &Path) -> Result<T, EstimatorError> {
    let path = dir.join(MODEL_FILE);
    if !path.is_file() {
        return Err(EstimatorError::NotFitted(path));
    }
    let bytes = fs::read(&path)?;
    Ok(serde_json::from_slice(&bytes)?)
}
