use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{error, info, warn};

use mlswarm_core::{CoreError, TaskId, TaskKind, TaskRecord, TaskStatus};
use mlswarm_services::{CancelFlag, Registries};

use crate::aggregate::aggregate;
use crate::binding::BoundEstimator;
use crate::error::{StoreError, TaskError};
use crate::store::Store;

use super::hooks::{self, KindHooks, Step};
use super::outcome::RunOutcome;

/// Drives tasks from `created` to a terminal status.
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn Store>,
    registries: Arc<Registries>,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>, registries: Arc<Registries>) -> Self {
        Self { store, registries }
    }

    /// Run a task to completion on the calling thread.
    ///
    /// Execution failures are recorded on the task, not returned: the result
    /// is the final record whatever the outcome. `Err` means the task could
    /// not be started (unknown, not in `created`) or the store failed.
    pub fn start(&self, task_id: TaskId, cancel: &CancelFlag) -> Result<TaskRecord, TaskError> {
        self.start_with(task_id, cancel, hooks::for_kind)
    }

    /// `start` with the hooks for each kind chosen by `select`.
    pub(crate) fn start_with(
        &self,
        task_id: TaskId,
        cancel: &CancelFlag,
        select: fn(TaskKind) -> &'static dyn KindHooks,
    ) -> Result<TaskRecord, TaskError> {
        let task = self
            .store
            .claim_task(task_id, Utc::now())
            .map_err(|e| not_startable(task_id, e))?;
        info!(task_id = %task.id, kind = %task.kind, "task started");

        let hooks = select(task.kind);

        // Rollback only undoes a setup that succeeded.
        let (mut outcome, set_up) = match hooks.setup(&task) {
            Ok(()) => (self.guarded_run(hooks, &task, cancel), true),
            Err(e) => (RunOutcome::Failed(e), false),
        };

        if let Err(e) = hooks.teardown(&task) {
            match outcome {
                RunOutcome::Failed(_) => {
                    warn!(task_id = %task.id, error = %e, "teardown failed after failed run");
                }
                _ => outcome = RunOutcome::Failed(e),
            }
        }

        let status = outcome.status();
        let (output, errors) = match outcome {
            RunOutcome::Completed(report) => (Some(report), None),
            RunOutcome::Interrupted => (None, None),
            RunOutcome::Failed(e) => {
                if set_up {
                    if let Err(rollback) = hooks.rollback(&task) {
                        warn!(task_id = %task.id, error = %rollback, "rollback failed");
                    }
                }
                (None, Some(e.to_string()))
            }
        };

        let finished = self
            .store
            .finish_task(task.id, status, output, errors, Utc::now())?;

        match status {
            TaskStatus::Failed => error!(
                task_id = %finished.id,
                errors = finished.errors.as_deref().unwrap_or_default(),
                "task failed"
            ),
            _ => info!(task_id = %finished.id, status = %status, "task finished"),
        }
        Ok(finished)
    }

    /// `run` with panics inside parsers or algorithms converted to failures.
    fn guarded_run(
        &self,
        hooks: &dyn KindHooks,
        task: &TaskRecord,
        cancel: &CancelFlag,
    ) -> RunOutcome {
        match catch_unwind(AssertUnwindSafe(|| self.run(hooks, task, cancel))) {
            Ok(result) => RunOutcome::from_result(result),
            Err(payload) => RunOutcome::Failed(TaskError::Panicked(panic_message(payload))),
        }
    }

    fn run(
        &self,
        hooks: &dyn KindHooks,
        task: &TaskRecord,
        cancel: &CancelFlag,
    ) -> Result<Value, TaskError> {
        cancel.check()?;

        let chunks = task
            .chunk_ids
            .iter()
            .map(|id| {
                self.store.get_chunk(*id).map_err(|e| match e {
                    StoreError::NotFound { .. } => TaskError::DataAggregation(e.to_string()),
                    other => TaskError::Store(other),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let data = aggregate(&self.registries.parsers, &chunks)?;

        let estimator = self.store.get_estimator(task.estimator_id)?;
        let prior_report_dir = match task.training_id {
            Some(training_id) => self.store.get_task(training_id)?.report_dir,
            None => None,
        };

        let mut bound = BoundEstimator::bind(&self.registries.estimators, &estimator)?;
        let step = Step {
            task,
            prior_report_dir: prior_report_dir.as_deref(),
            cancel,
        };
        let result = hooks.execute(&mut bound, &data, &step);
        bound.dispose();
        Ok(result?)
    }
}

fn not_startable(id: TaskId, e: StoreError) -> TaskError {
    match e {
        StoreError::Transition(CoreError::InvalidTransition { from, .. }) => {
            TaskError::NotStartable { id, status: from }
        }
        other => TaskError::Store(other),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
