use serde_json::Value;

use mlswarm_core::TaskStatus;

use crate::error::TaskError;

/// How a task's run ended.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(Value),
    Failed(TaskError),
    Interrupted,
}

impl RunOutcome {
    /// Classify a run result. Cancellation is an interruption, not a failure.
    pub fn from_result(result: Result<Value, TaskError>) -> Self {
        match result {
            Ok(report) => RunOutcome::Completed(report),
            Err(e) if e.is_cancelled() => RunOutcome::Interrupted,
            Err(e) => RunOutcome::Failed(e),
        }
    }

    /// Terminal status this outcome is recorded as.
    pub fn status(&self) -> TaskStatus {
        match self {
            RunOutcome::Completed(_) => TaskStatus::Completed,
            RunOutcome::Failed(_) => TaskStatus::Failed,
            RunOutcome::Interrupted => TaskStatus::Interrupted,
        }
    }
}
