//! Use-case facade: the operations an API layer calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use mlswarm_core::{
    split_features, Chunk, ChunkId, Config, Dataset, DatasetId, Estimator, EstimatorId, OwnerId,
    Table, TaskId, TaskKind, TaskRecord, TaskStatus,
};
use mlswarm_services::{
    CancelFlag, FieldErrors, PropertySchema, RawProperties, Registries, ServiceRegistry,
};

use crate::aggregate::aggregate;
use crate::error::{StoreError, TaskError};
use crate::lifecycle::Engine;
use crate::report_dir::ReportDirs;
use crate::store::{MemoryStore, Store};

/// Columns to drop from a chunk: a delimiter-joined string or a list.
#[derive(Debug, Clone, PartialEq)]
pub enum IgnoreFeatures {
    Joined(String),
    List(Vec<String>),
}

impl IgnoreFeatures {
    fn resolve(self, delimiter: char) -> Vec<String> {
        match self {
            IgnoreFeatures::Joined(raw) => split_features(&raw, delimiter),
            IgnoreFeatures::List(list) => list
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }
}

impl Default for IgnoreFeatures {
    fn default() -> Self {
        IgnoreFeatures::List(Vec::new())
    }
}

#[derive(Debug, Clone)]
pub struct NewChunk {
    pub content: String,
    pub delimiter: char,
    pub service: String,
    pub ignore_features: IgnoreFeatures,
    pub to_lowercase: bool,
    pub properties: RawProperties,
    pub tags: Vec<String>,
}

impl NewChunk {
    /// A `csv` chunk with default settings.
    pub fn csv(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            delimiter: ',',
            service: "csv".to_string(),
            ignore_features: IgnoreFeatures::default(),
            to_lowercase: false,
            properties: RawProperties::default(),
            tags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewEstimator {
    pub name: Option<String>,
    pub service: String,
    pub properties: RawProperties,
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub kind: TaskKind,
    pub owner_id: OwnerId,
    pub estimator_id: EstimatorId,
    pub chunk_ids: Vec<ChunkId>,
    pub training_id: Option<TaskId>,
    pub properties: RawProperties,
}

/// Identifier and property schema of a registered service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceDescription {
    pub id: String,
    pub properties: PropertySchema,
}

/// Entry point wiring the store, the service registries and the engine.
pub struct Swarm {
    store: Arc<dyn Store>,
    registries: Arc<Registries>,
    reports: ReportDirs,
    engine: Engine,
    cancel_flags: Mutex<HashMap<TaskId, CancelFlag>>,
}

impl Swarm {
    pub fn new(store: Arc<dyn Store>, registries: Arc<Registries>, reports: ReportDirs) -> Self {
        let engine = Engine::new(Arc::clone(&store), Arc::clone(&registries));
        Self {
            store,
            registries,
            reports,
            engine,
            cancel_flags: Mutex::new(HashMap::new()),
        }
    }

    /// In-memory store with the built-in services.
    pub fn in_memory(reports: ReportDirs) -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            Arc::new(Registries::builtin()),
            reports,
        )
    }

    pub fn from_config(config: &Config) -> Self {
        Self::in_memory(ReportDirs::new(config.storage.reports_dir.clone()))
    }

    pub fn reports(&self) -> &ReportDirs {
        &self.reports
    }

    // ── Datasets and chunks ──────────────────────────────────

    pub fn create_dataset(&self, name: impl Into<String>) -> Result<Dataset, TaskError> {
        let dataset = Dataset::new(name);
        self.store.insert_dataset(dataset.clone())?;
        info!(dataset_id = %dataset.id, name = %dataset.name, "created dataset");
        Ok(dataset)
    }

    pub fn get_dataset(&self, id: DatasetId) -> Result<Dataset, TaskError> {
        Ok(self.store.get_dataset(id)?)
    }

    pub fn list_datasets(&self) -> Result<Vec<Dataset>, TaskError> {
        Ok(self.store.list_datasets()?)
    }

    /// Blocked with [`StoreError::Protected`] while the dataset has chunks.
    pub fn delete_dataset(&self, id: DatasetId) -> Result<(), TaskError> {
        self.store.delete_dataset(id)?;
        info!(dataset_id = %id, "deleted dataset");
        Ok(())
    }

    /// Validate the chunk's parser and properties, then store it.
    pub fn add_chunk(&self, dataset_id: DatasetId, new: NewChunk) -> Result<Chunk, TaskError> {
        self.store.get_dataset(dataset_id)?;
        let properties = self
            .registries
            .parsers
            .validate_properties(&new.service, new.properties)?;

        let now = Utc::now();
        let chunk = Chunk {
            id: Uuid::new_v4(),
            dataset_id,
            content: new.content,
            delimiter: new.delimiter,
            service: new.service,
            ignore_features: new.ignore_features.resolve(new.delimiter),
            to_lowercase: new.to_lowercase,
            properties,
            tags: new.tags,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_chunk(chunk.clone())?;
        debug!(chunk_id = %chunk.id, dataset_id = %dataset_id, service = %chunk.service, "added chunk");
        Ok(chunk)
    }

    pub fn list_chunks(&self, dataset_id: DatasetId) -> Result<Vec<Chunk>, TaskError> {
        self.store.get_dataset(dataset_id)?;
        Ok(self.store.list_chunks(dataset_id)?)
    }

    /// The dataset's chunks processed and concatenated in insertion order.
    pub fn process_dataset(&self, dataset_id: DatasetId) -> Result<Table, TaskError> {
        let chunks = self.list_chunks(dataset_id)?;
        aggregate(&self.registries.parsers, &chunks)
    }

    // ── Estimators ───────────────────────────────────────────

    pub fn create_estimator(&self, new: NewEstimator) -> Result<Estimator, TaskError> {
        let properties = self
            .registries
            .estimators
            .validate_properties(&new.service, new.properties)?;
        let now = Utc::now();
        let estimator = Estimator {
            id: Uuid::new_v4(),
            name: new.name,
            service: new.service,
            properties,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_estimator(estimator.clone())?;
        info!(estimator_id = %estimator.id, service = %estimator.service, "created estimator");
        Ok(estimator)
    }

    pub fn get_estimator(&self, id: EstimatorId) -> Result<Estimator, TaskError> {
        Ok(self.store.get_estimator(id)?)
    }

    // ── Tasks ────────────────────────────────────────────────

    /// Validate and store a new task in `created` status. Nothing is stored
    /// when validation fails.
    pub fn create_task(&self, new: NewTask) -> Result<TaskId, TaskError> {
        let mut errors = FieldErrors::new();

        let mut chunk_ids: Vec<ChunkId> = Vec::with_capacity(new.chunk_ids.len());
        for id in new.chunk_ids {
            if !chunk_ids.contains(&id) {
                chunk_ids.push(id);
            }
        }
        if chunk_ids.is_empty() {
            errors.add("chunks", "This list may not be empty.");
        }
        for id in &chunk_ids {
            if let Err(e) = self.store.get_chunk(*id) {
                errors.add("chunks", missing_reference(*id, e)?);
            }
        }

        let estimator = match self.store.get_estimator(new.estimator_id) {
            Ok(e) => Some(e),
            Err(e) => {
                errors.add("estimator", missing_reference(new.estimator_id, e)?);
                None
            }
        };

        match (new.kind.requires_training(), new.training_id) {
            (true, None) => errors.add("training", "This field is required."),
            (false, Some(_)) => errors.add(
                "training",
                "Only test and predict tasks reference a training.",
            ),
            (true, Some(training_id)) => match self.store.get_task(training_id) {
                Ok(training) if training.kind != TaskKind::Training => {
                    errors.add("training", "Referenced task is not a training task.")
                }
                Ok(training) if training.estimator_id != new.estimator_id => errors.add(
                    "training",
                    "Referenced training belongs to a different estimator.",
                ),
                Ok(_) => {}
                Err(e) => errors.add("training", missing_reference(training_id, e)?),
            },
            (false, None) => {}
        }

        let Some(estimator) = estimator else {
            return Err(TaskError::Validation(errors));
        };
        if !errors.is_empty() {
            return Err(TaskError::Validation(errors));
        }

        let properties = self.registries.estimators.validate_task_properties(
            &estimator.service,
            new.kind,
            new.properties,
        )?;

        let id = Uuid::new_v4();
        let now = Utc::now();
        let record = TaskRecord {
            id,
            kind: new.kind,
            status: TaskStatus::Created,
            owner_id: new.owner_id,
            estimator_id: estimator.id,
            chunk_ids,
            training_id: new.training_id,
            properties,
            output: None,
            errors: None,
            report_dir: (new.kind == TaskKind::Training).then(|| self.reports.for_task(id)),
            started_at: None,
            finished_at: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_task(record)?;
        info!(task_id = %id, kind = %new.kind, estimator_id = %estimator.id, "created task");
        Ok(id)
    }

    pub fn get_task(&self, id: TaskId) -> Result<TaskRecord, TaskError> {
        Ok(self.store.get_task(id)?)
    }

    pub fn list_tasks(&self) -> Result<Vec<TaskRecord>, TaskError> {
        Ok(self.store.list_tasks()?)
    }

    /// The task's output once it is terminal and non-null.
    pub fn get_report(&self, id: TaskId) -> Result<Option<Value>, TaskError> {
        Ok(self.store.get_task(id)?.report().cloned())
    }

    /// Run a task on the calling thread and return its final record.
    pub fn start(&self, id: TaskId) -> Result<TaskRecord, TaskError> {
        let cancel = self.cancel_flag(id)?;
        let result = self.engine.start(id, &cancel);
        // Only the execution that claimed the task clears the flag.
        if !matches!(result, Err(TaskError::NotStartable { .. })) {
            self.flags()?.remove(&id);
        }
        result
    }

    /// Ask a created or running task to stop. Returns whether a signal was
    /// raised; terminal tasks are left untouched.
    ///
    /// The status check and the flag insert happen under the flags lock, and
    /// `start` clears the flag under the same lock once the task is terminal,
    /// so no flag outlives its task's execution.
    pub fn interrupt(&self, id: TaskId) -> Result<bool, TaskError> {
        let mut flags = self.flags()?;
        let task = self.store.get_task(id)?;
        if task.is_terminal() {
            flags.remove(&id);
            return Ok(false);
        }
        flags.entry(id).or_default().cancel();
        info!(task_id = %id, status = %task.status, "interrupt requested");
        Ok(true)
    }

    pub fn list_parser_services(&self) -> Vec<ServiceDescription> {
        describe(&self.registries.parsers)
    }

    pub fn list_estimator_services(&self) -> Vec<ServiceDescription> {
        describe(&self.registries.estimators)
    }

    /// Cancellation flag for a task, created on first use.
    pub(crate) fn cancel_flag(&self, id: TaskId) -> Result<CancelFlag, TaskError> {
        Ok(self.flags()?.entry(id).or_default().clone())
    }

    fn flags(&self) -> Result<MutexGuard<'_, HashMap<TaskId, CancelFlag>>, TaskError> {
        self.cancel_flags
            .lock()
            .map_err(|e| StoreError::LockPoisoned(format!("cancel flags: {}", e)).into())
    }
}

/// Message for a dangling reference. Store failures other than "not found" abort.
fn missing_reference(id: Uuid, e: StoreError) -> Result<String, TaskError> {
    match e {
        StoreError::NotFound { .. } => {
            Ok(format!("Invalid pk \"{}\" - object does not exist.", id))
        }
        other => Err(other.into()),
    }
}

fn describe<A: 'static, I: 'static>(registry: &ServiceRegistry<A, I>) -> Vec<ServiceDescription> {
    registry
        .registered_identifiers()
        .into_iter()
        .filter_map(|id| {
            let service = registry.get(&id).ok()?;
            Some(ServiceDescription {
                properties: service.schema().clone(),
                id,
            })
        })
        .collect()
}
