use std::path::Path;

use serde_json::Value;

use mlswarm_core::{Table, TaskKind, TaskRecord};
use mlswarm_services::{CancelFlag, EstimatorError, RunContext};

use crate::binding::BoundEstimator;
use crate::error::TaskError;
use crate::report_dir;

/// Inputs available to a kind's run step.
pub(crate) struct Step<'a> {
    pub task: &'a TaskRecord,
    /// Report directory of the referenced training task.
    pub prior_report_dir: Option<&'a Path>,
    pub cancel: &'a CancelFlag,
}

impl<'a> Step<'a> {
    fn context(&self, report_dir: Option<&'a Path>) -> RunContext<'a> {
        RunContext {
            report_dir,
            properties: &self.task.properties,
            cancel: self.cancel,
        }
    }

    fn prior(&self) -> Result<&'a Path, EstimatorError> {
        self.prior_report_dir.ok_or_else(|| {
            EstimatorError::execution("load", "referenced training task has no report directory")
        })
    }
}

/// Kind-specific steps of the lifecycle. Setup, teardown and rollback default
/// to no-ops.
pub(crate) trait KindHooks: Sync {
    fn setup(&self, _task: &TaskRecord) -> Result<(), TaskError> {
        Ok(())
    }

    fn execute(
        &self,
        estimator: &mut BoundEstimator,
        data: &Table,
        step: &Step<'_>,
    ) -> Result<Value, EstimatorError>;

    fn teardown(&self, _task: &TaskRecord) -> Result<(), TaskError> {
        Ok(())
    }

    fn rollback(&self, _task: &TaskRecord) -> Result<(), TaskError> {
        Ok(())
    }
}

/// Fits the estimator and owns the task's report directory.
struct Training;

impl KindHooks for Training {
    fn setup(&self, task: &TaskRecord) -> Result<(), TaskError> {
        match task.report_dir.as_deref() {
            Some(dir) => report_dir::create(dir),
            None => Err(TaskError::validation(
                "report_dir",
                "Training tasks require a report directory.",
            )),
        }
    }

    fn execute(
        &self,
        estimator: &mut BoundEstimator,
        data: &Table,
        step: &Step<'_>,
    ) -> Result<Value, EstimatorError> {
        let ctx = step.context(step.task.report_dir.as_deref());
        estimator.train(data, &ctx)
    }

    fn rollback(&self, task: &TaskRecord) -> Result<(), TaskError> {
        match task.report_dir.as_deref() {
            Some(dir) => report_dir::remove(dir),
            None => Ok(()),
        }
    }
}

struct Evaluation;

impl KindHooks for Evaluation {
    fn execute(
        &self,
        estimator: &mut BoundEstimator,
        data: &Table,
        step: &Step<'_>,
    ) -> Result<Value, EstimatorError> {
        estimator.load(step.prior()?)?;
        estimator.test(data, &step.context(None))
    }
}

struct Prediction;

impl KindHooks for Prediction {
    fn execute(
        &self,
        estimator: &mut BoundEstimator,
        data: &Table,
        step: &Step<'_>,
    ) -> Result<Value, EstimatorError> {
        estimator.load(step.prior()?)?;
        estimator.predict(data, &step.context(None))
    }
}

pub(crate) fn for_kind(kind: TaskKind) -> &'static dyn KindHooks {
    match kind {
        TaskKind::Training => &Training,
        TaskKind::Test => &Evaluation,
        TaskKind::Predict => &Prediction,
    }
}
