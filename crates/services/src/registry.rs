use std::sync::Arc;

use indexmap::IndexMap;
use tracing::debug;

use mlswarm_core::TaskKind;

use crate::error::ServiceError;
use crate::schema::PropertySchema;

/// A pluggable service: declares the schema of its properties and builds
/// ready-to-use instances from validated arguments.
pub trait Service: Send + Sync {
    type Args;
    type Instance;

    /// Schema validating the properties stored on the owning record.
    fn schema(&self) -> &PropertySchema;

    /// Schema validating a task's properties for the given task kind.
    /// `None` means the kind takes no properties.
    fn task_schema(&self, _kind: TaskKind) -> Option<&PropertySchema> {
        None
    }

    fn build(&self, args: Self::Args) -> Result<Self::Instance, ServiceError>;
}

/// Shared handle to a registered service.
pub type ServiceHandle<A, I> = Arc<dyn Service<Args = A, Instance = I>>;

/// Identifier → service map for one capability family (parsers, estimators).
///
/// Populated once during initialization and read-only afterwards, so it can
/// be shared across task executions behind an `Arc` without locking.
pub struct ServiceRegistry<A, I> {
    family: &'static str,
    services: IndexMap<String, ServiceHandle<A, I>>,
}

impl<A: 'static, I: 'static> ServiceRegistry<A, I> {
    pub fn new(family: &'static str) -> Self {
        Self {
            family,
            services: IndexMap::new(),
        }
    }

    /// Register a service. Returns error if the identifier is already taken.
    pub fn register<S>(&mut self, id: impl Into<String>, service: S) -> Result<(), ServiceError>
    where
        S: Service<Args = A, Instance = I> + 'static,
    {
        let id = id.into();
        if self.services.contains_key(&id) {
            return Err(ServiceError::DuplicateService {
                family: self.family,
                id,
            });
        }
        debug!(family = self.family, service = %id, "registered service");
        self.services.insert(id, Arc::new(service));
        Ok(())
    }

    /// Look up a service by identifier.
    pub fn get(&self, id: &str) -> Result<ServiceHandle<A, I>, ServiceError> {
        self.services
            .get(id)
            .cloned()
            .ok_or_else(|| ServiceError::UnknownService {
                family: self.family,
                id: id.to_string(),
                registered: self.registered_identifiers(),
            })
    }

    /// Look up a service and build an instance. Construction errors propagate unchanged.
    pub fn build(&self, id: &str, args: A) -> Result<I, ServiceError> {
        self.get(id)?.build(args)
    }

    /// Registered identifiers, in registration order.
    pub fn registered_identifiers(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
