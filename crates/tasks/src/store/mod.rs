//! Persistence seam for datasets, chunks, estimators and tasks.

mod memory;

pub use memory::MemoryStore;

use chrono::{DateTime, Utc};
use serde_json::Value;

use mlswarm_core::{
    Chunk, ChunkId, Dataset, DatasetId, Estimator, EstimatorId, TaskId, TaskRecord, TaskStatus,
};

use crate::error::StoreError;

/// Record storage used by the facade and the lifecycle engine.
///
/// Task status changes go through [`Store::claim_task`] and
/// [`Store::finish_task`], which check and apply the transition under a single
/// write so concurrent callers cannot both succeed.
pub trait Store: Send + Sync {
    fn insert_dataset(&self, dataset: Dataset) -> Result<(), StoreError>;
    fn get_dataset(&self, id: DatasetId) -> Result<Dataset, StoreError>;
    fn list_datasets(&self) -> Result<Vec<Dataset>, StoreError>;
    /// Fails with [`StoreError::Protected`] while the dataset still has chunks.
    fn delete_dataset(&self, id: DatasetId) -> Result<(), StoreError>;

    /// Fails with [`StoreError::NotFound`] when the owning dataset is missing.
    fn insert_chunk(&self, chunk: Chunk) -> Result<(), StoreError>;
    fn get_chunk(&self, id: ChunkId) -> Result<Chunk, StoreError>;
    /// Chunks of a dataset in insertion order.
    fn list_chunks(&self, dataset_id: DatasetId) -> Result<Vec<Chunk>, StoreError>;

    fn insert_estimator(&self, estimator: Estimator) -> Result<(), StoreError>;
    fn get_estimator(&self, id: EstimatorId) -> Result<Estimator, StoreError>;

    fn insert_task(&self, task: TaskRecord) -> Result<(), StoreError>;
    fn get_task(&self, id: TaskId) -> Result<TaskRecord, StoreError>;
    fn list_tasks(&self) -> Result<Vec<TaskRecord>, StoreError>;

    /// Atomically move a task `created -> running`. Any other status is a
    /// [`StoreError::Transition`].
    fn claim_task(&self, id: TaskId, now: DateTime<Utc>) -> Result<TaskRecord, StoreError>;

    /// Atomically move a running task to a terminal status.
    fn finish_task(
        &self,
        id: TaskId,
        status: TaskStatus,
        output: Option<Value>,
        errors: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<TaskRecord, StoreError>;
}
