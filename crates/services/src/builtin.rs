use tracing::{info, warn};

use crate::error::ServiceError;
use crate::estimators::{
    Estimator, EstimatorArgs, EstimatorRegistry, NearestCentroidService, SimpleRegressorService,
};
use crate::parsers::{CsvParserService, DatasetParser, JsonParserService, ParserArgs, ParserRegistry};
use crate::registry::Service;

/// Both service registries, built once at startup and shared read-only.
pub struct Registries {
    pub parsers: ParserRegistry,
    pub estimators: EstimatorRegistry,
}

impl Registries {
    /// Empty registries, for callers wiring their own services.
    pub fn empty() -> Self {
        Self {
            parsers: ParserRegistry::new("parser"),
            estimators: EstimatorRegistry::new("estimator"),
        }
    }

    /// Registries holding every built-in service.
    pub fn builtin() -> Self {
        let mut registries = Self::empty();
        let results = [
            registries.parsers.register("csv", CsvParserService::new()),
            registries.parsers.register("json", JsonParserService::new()),
            registries
                .estimators
                .register("simple-regressor", SimpleRegressorService::new()),
            registries
                .estimators
                .register("nearest-centroid-classifier", NearestCentroidService::new()),
        ];
        for result in results {
            if let Err(e) = result {
                warn!(error = %e, "skipping built-in service");
            }
        }
        info!(
            parsers = registries.parsers.len(),
            estimators = registries.estimators.len(),
            "service registries ready"
        );
        registries
    }

    /// Register an additional parser after the built-ins.
    pub fn with_parser<S>(mut self, id: &str, service: S) -> Result<Self, ServiceError>
    where
        S: Service<Args = ParserArgs, Instance = Box<dyn DatasetParser>> + 'static,
    {
        self.parsers.register(id, service)?;
        Ok(self)
    }

    /// Register an additional estimator after the built-ins.
    pub fn with_estimator<S>(mut self, id: &str, service: S) -> Result<Self, ServiceError>
    where
        S: Service<Args = EstimatorArgs, Instance = Box<dyn Estimator>> + 'static,
    {
        self.estimators.register(id, service)?;
        Ok(self)
    }
}

impl Default for Registries {
    fn default() -> Self {
        Self::builtin()
    }
}
