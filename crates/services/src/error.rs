//! Service error types.

use std::fmt;
use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use mlswarm_core::CoreError;

/// Key used for violations that do not belong to a single field.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("unknown {family} service '{id}'. Available options are: {}", .registered.join(", "))]
    UnknownService {
        family: &'static str,
        id: String,
        registered: Vec<String>,
    },

    #[error("{family} service '{id}' is already registered")]
    DuplicateService { family: &'static str, id: String },

    #[error("properties must be valid JSON: {0}")]
    MalformedProperties(String),

    #[error("invalid properties: {0}")]
    InvalidProperties(FieldErrors),

    #[error("cannot build service '{service}': {reason}")]
    Construction { service: String, reason: String },
}

/// Field-keyed validation failures, in the order the fields were checked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(IndexMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn into_result<T>(self, ok: T) -> Result<T, FieldErrors> {
        if self.is_empty() { Ok(ok) } else { Err(self) }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (field, messages)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", field, messages.join(" "))?;
        }
        Ok(())
    }
}

/// Failures while reading or parsing a chunk's content.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("cannot read content from {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot fetch content from {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("unsupported content location '{0}': only inline data, local paths and http(s) URLs are readable")]
    UnsupportedSource(String),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("no columns found in content")]
    NoColumns,

    #[error("invalid table: {0}")]
    Table(#[from] CoreError),
}

impl From<csv::Error> for ParseError {
    fn from(e: csv::Error) -> Self {
        ParseError::Csv(e.to_string())
    }
}

/// Failures raised by an estimator operation.
///
/// [`EstimatorError::Cancelled`] is the cooperative cancellation signal, not a
/// failure: the task engine records it as an interruption.
#[derive(Debug, Error)]
pub enum EstimatorError {
    #[error("{operation} failed: {reason}")]
    Execution {
        operation: &'static str,
        reason: String,
    },

    #[error("interrupted")]
    Cancelled,

    #[error("no trained model found at {}; was the estimator trained?", .0.display())]
    NotFitted(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("model serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl EstimatorError {
    pub fn execution(operation: &'static str, reason: impl Into<String>) -> Self {
        EstimatorError::Execution {
            operation,
            reason: reason.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, EstimatorError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_service_lists_registered() {
        let err = ServiceError::UnknownService {
            family: "parser",
            id: "xml".into(),
            registered: vec!["csv".into(), "json".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("'xml'"));
        assert!(msg.contains("csv, json"));
    }

    #[test]
    fn field_errors_group_by_field() {
        let mut errors = FieldErrors::new();
        errors.add("epochs", "A valid integer is required.");
        errors.add("target", "This field is required.");
        errors.add("epochs", "Ensure this value is greater than or equal to 1.");
        assert_eq!(errors.len(), 2);
        assert_eq!(errors.get("epochs").unwrap().len(), 2);
        assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["epochs", "target"]);

        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json["target"][0], "This field is required.");
    }
}
