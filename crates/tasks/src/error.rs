use std::path::PathBuf;

use thiserror::Error;
use uuid::Uuid;

use mlswarm_core::{CoreError, TaskId, TaskStatus};
use mlswarm_services::{EstimatorError, FieldErrors, ServiceError};

/// Record store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: Uuid },

    #[error("{kind} {id} is still referenced: {reason}")]
    Protected {
        kind: &'static str,
        id: Uuid,
        reason: String,
    },

    #[error("{kind} {id} already exists")]
    Conflict { kind: &'static str, id: Uuid },

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    #[error(transparent)]
    Transition(#[from] CoreError),
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("invalid request: {0}")]
    Validation(FieldErrors),

    #[error("data aggregation failed: {0}")]
    DataAggregation(String),

    #[error("estimator error: {0}")]
    EstimatorExecution(#[from] EstimatorError),

    #[error("task {id} cannot be started: status is {status}")]
    NotStartable { id: TaskId, status: TaskStatus },

    #[error("algorithm panicked: {0}")]
    Panicked(String),

    /// The path is logged where the failure happens; the message stays
    /// free of it since it ends up in the task's `errors`.
    #[error("report directory unavailable: {source}")]
    ReportDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("worker pool error: {0}")]
    WorkerPool(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TaskError {
    /// Whether this is the cooperative cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::EstimatorExecution(e) if e.is_cancelled())
    }

    pub(crate) fn validation(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.add(field, message);
        TaskError::Validation(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_recognised() {
        assert!(TaskError::from(EstimatorError::Cancelled).is_cancelled());
        assert!(!TaskError::DataAggregation("no input data".into()).is_cancelled());
    }

    #[test]
    fn messages_are_human_readable() {
        let e = TaskError::validation("chunks", "This list may not be empty.");
        assert_eq!(e.to_string(), "invalid request: chunks: This list may not be empty.");

        let e = TaskError::DataAggregation("no input data".into());
        assert_eq!(e.to_string(), "data aggregation failed: no input data");
    }

    #[test]
    fn report_dir_message_hides_the_path() {
        let e = TaskError::ReportDir {
            path: PathBuf::from("/srv/reports/trainings/5f0c"),
            source: std::io::Error::new(std::io::ErrorKind::AlreadyExists, "File exists"),
        };
        let msg = e.to_string();
        assert_eq!(msg, "report directory unavailable: File exists");
        assert!(!msg.contains("/srv/reports"));
    }
}
