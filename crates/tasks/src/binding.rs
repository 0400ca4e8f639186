use std::path::Path;

use serde_json::Value;
use tracing::debug;

use mlswarm_core::{Estimator as EstimatorRecord, EstimatorId, Table};
use mlswarm_services::{
    Estimator, EstimatorArgs, EstimatorError, EstimatorRegistry, RunContext, ServiceError,
};

/// An estimator record resolved to a live algorithm instance.
///
/// `dispose` runs exactly once per instance: explicitly, or on drop when the
/// caller never got there (early return, panic unwinding).
pub struct BoundEstimator {
    estimator_id: EstimatorId,
    inner: Box<dyn Estimator>,
    disposed: bool,
}

impl BoundEstimator {
    /// Resolve the record's service and construct it with the stored properties.
    pub fn bind(
        registry: &EstimatorRegistry,
        record: &EstimatorRecord,
    ) -> Result<Self, ServiceError> {
        let inner = registry.build(
            &record.service,
            EstimatorArgs {
                properties: record.properties.clone(),
            },
        )?;
        debug!(estimator_id = %record.id, service = %record.service, "bound estimator");
        Ok(Self {
            estimator_id: record.id,
            inner,
            disposed: false,
        })
    }

    pub fn train(&mut self, data: &Table, ctx: &RunContext<'_>) -> Result<Value, EstimatorError> {
        self.inner.train(data, ctx)
    }

    pub fn load(&mut self, report_dir: &Path) -> Result<(), EstimatorError> {
        self.inner.load(report_dir)
    }

    pub fn test(&mut self, data: &Table, ctx: &RunContext<'_>) -> Result<Value, EstimatorError> {
        self.inner.test(data, ctx)
    }

    pub fn predict(&mut self, data: &Table, ctx: &RunContext<'_>) -> Result<Value, EstimatorError> {
        self.inner.predict(data, ctx)
    }

    /// Release the algorithm's resources. Later calls are no-ops.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.inner.dispose();
        debug!(estimator_id = %self.estimator_id, "disposed estimator");
    }
}

impl Drop for BoundEstimator {
    fn drop(&mut self) {
        self.dispose();
    }
}
