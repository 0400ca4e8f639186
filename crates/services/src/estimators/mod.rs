//! Estimator services: opaque learning algorithms bound to an estimator record.

mod centroid;
pub mod features;
mod regressor;

pub use centroid::NearestCentroidService;
pub use regressor::SimpleRegressorService;

use std::path::Path;

use serde_json::Value;

use mlswarm_core::{Properties, Table};

use crate::cancel::CancelFlag;
use crate::error::EstimatorError;
use crate::registry::ServiceRegistry;

/// Construction arguments: the estimator record's validated properties.
#[derive(Debug, Clone, Default)]
pub struct EstimatorArgs {
    pub properties: Properties,
}

/// Per-run context handed to estimator operations.
#[derive(Debug, Clone, Copy)]
pub struct RunContext<'a> {
    /// Report directory owned by the running task. Only set for training.
    pub report_dir: Option<&'a Path>,
    /// Task properties, validated against the service's schema for the task kind.
    pub properties: &'a Properties,
    pub cancel: &'a CancelFlag,
}

/// A constructed learning algorithm.
///
/// Operations check `ctx.cancel` between units of work and return
/// [`EstimatorError::Cancelled`] once it is raised.
pub trait Estimator: Send {
    /// Fit on `data`, persisting the model into `ctx.report_dir` when set.
    fn train(&mut self, data: &Table, ctx: &RunContext<'_>) -> Result<Value, EstimatorError>;

    /// Restore a model saved by a prior training run.
    fn load(&mut self, report_dir: &Path) -> Result<(), EstimatorError>;

    fn test(&mut self, data: &Table, ctx: &RunContext<'_>) -> Result<Value, EstimatorError>;

    fn predict(&mut self, data: &Table, ctx: &RunContext<'_>) -> Result<Value, EstimatorError>;

    /// Release held resources.
    fn dispose(&mut self) {}
}

pub type EstimatorRegistry = ServiceRegistry<EstimatorArgs, Box<dyn Estimator>>;

/// Deserialize a typed options struct from validated properties.
pub(crate) fn options<T: serde::de::DeserializeOwned>(
    properties: &Properties,
    operation: &'static str,
) -> Result<T, EstimatorError> {
    serde_json::from_value(Value::Object(properties.clone()))
        .map_err(|e| EstimatorError::execution(operation, format!("invalid options: {}", e)))
}
