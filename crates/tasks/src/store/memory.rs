use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;

use mlswarm_core::{
    Chunk, ChunkId, Dataset, DatasetId, Estimator, EstimatorId, TaskId, TaskRecord, TaskStatus,
};

use crate::error::StoreError;

use super::Store;

/// In-process store. Each table sits behind its own `RwLock`; when two are
/// needed they are always taken datasets before chunks.
#[derive(Debug, Default)]
pub struct MemoryStore {
    datasets: RwLock<IndexMap<DatasetId, Dataset>>,
    chunks: RwLock<IndexMap<ChunkId, Chunk>>,
    estimators: RwLock<IndexMap<EstimatorId, Estimator>>,
    tasks: RwLock<IndexMap<TaskId, TaskRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn read<'a, T>(lock: &'a RwLock<T>, table: &str) -> Result<RwLockReadGuard<'a, T>, StoreError> {
    lock.read()
        .map_err(|e| StoreError::LockPoisoned(format!("{} read lock: {}", table, e)))
}

fn write<'a, T>(lock: &'a RwLock<T>, table: &str) -> Result<RwLockWriteGuard<'a, T>, StoreError> {
    lock.write()
        .map_err(|e| StoreError::LockPoisoned(format!("{} write lock: {}", table, e)))
}

fn insert_new<T>(
    map: &mut IndexMap<uuid::Uuid, T>,
    kind: &'static str,
    id: uuid::Uuid,
    value: T,
) -> Result<(), StoreError> {
    if map.contains_key(&id) {
        return Err(StoreError::Conflict { kind, id });
    }
    map.insert(id, value);
    Ok(())
}

fn found<T: Clone>(
    map: &IndexMap<uuid::Uuid, T>,
    kind: &'static str,
    id: uuid::Uuid,
) -> Result<T, StoreError> {
    map.get(&id).cloned().ok_or(StoreError::NotFound { kind, id })
}

impl Store for MemoryStore {
    fn insert_dataset(&self, dataset: Dataset) -> Result<(), StoreError> {
        let mut datasets = write(&self.datasets, "datasets")?;
        insert_new(&mut datasets, "dataset", dataset.id, dataset)
    }

    fn get_dataset(&self, id: DatasetId) -> Result<Dataset, StoreError> {
        found(&*read(&self.datasets, "datasets")?, "dataset", id)
    }

    fn list_datasets(&self) -> Result<Vec<Dataset>, StoreError> {
        Ok(read(&self.datasets, "datasets")?.values().cloned().collect())
    }

    fn delete_dataset(&self, id: DatasetId) -> Result<(), StoreError> {
        let mut datasets = write(&self.datasets, "datasets")?;
        if !datasets.contains_key(&id) {
            return Err(StoreError::NotFound { kind: "dataset", id });
        }
        let chunks = read(&self.chunks, "chunks")?;
        let count = chunks.values().filter(|c| c.dataset_id == id).count();
        if count > 0 {
            return Err(StoreError::Protected {
                kind: "dataset",
                id,
                reason: format!("{} chunk(s) belong to it", count),
            });
        }
        datasets.shift_remove(&id);
        debug!(dataset_id = %id, "deleted dataset");
        Ok(())
    }

    fn insert_chunk(&self, chunk: Chunk) -> Result<(), StoreError> {
        let datasets = read(&self.datasets, "datasets")?;
        if !datasets.contains_key(&chunk.dataset_id) {
            return Err(StoreError::NotFound {
                kind: "dataset",
                id: chunk.dataset_id,
            });
        }
        let mut chunks = write(&self.chunks, "chunks")?;
        insert_new(&mut chunks, "chunk", chunk.id, chunk)
    }

    fn get_chunk(&self, id: ChunkId) -> Result<Chunk, StoreError> {
        found(&*read(&self.chunks, "chunks")?, "chunk", id)
    }

    fn list_chunks(&self, dataset_id: DatasetId) -> Result<Vec<Chunk>, StoreError> {
        Ok(read(&self.chunks, "chunks")?
            .values()
            .filter(|c| c.dataset_id == dataset_id)
            .cloned()
            .collect())
    }

    fn insert_estimator(&self, estimator: Estimator) -> Result<(), StoreError> {
        let mut estimators = write(&self.estimators, "estimators")?;
        insert_new(&mut estimators, "estimator", estimator.id, estimator)
    }

    fn get_estimator(&self, id: EstimatorId) -> Result<Estimator, StoreError> {
        found(&*read(&self.estimators, "estimators")?, "estimator", id)
    }

    fn insert_task(&self, task: TaskRecord) -> Result<(), StoreError> {
        let mut tasks = write(&self.tasks, "tasks")?;
        insert_new(&mut tasks, "task", task.id, task)
    }

    fn get_task(&self, id: TaskId) -> Result<TaskRecord, StoreError> {
        found(&*read(&self.tasks, "tasks")?, "task", id)
    }

    fn list_tasks(&self) -> Result<Vec<TaskRecord>, StoreError> {
        Ok(read(&self.tasks, "tasks")?.values().cloned().collect())
    }

    fn claim_task(&self, id: TaskId, now: DateTime<Utc>) -> Result<TaskRecord, StoreError> {
        let mut tasks = write(&self.tasks, "tasks")?;
        let task = tasks
            .get_mut(&id)
            .ok_or(StoreError::NotFound { kind: "task", id })?;
        task.mark_running(now)?;
        Ok(task.clone())
    }

    fn finish_task(
        &self,
        id: TaskId,
        status: TaskStatus,
        output: Option<Value>,
        errors: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<TaskRecord, StoreError> {
        let mut tasks = write(&self.tasks, "tasks")?;
        let task = tasks
            .get_mut(&id)
            .ok_or(StoreError::NotFound { kind: "task", id })?;
        task.mark_finished(status, output, errors, now)?;
        Ok(task.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlswarm_core::{CoreError, Properties, TaskKind};
    use uuid::Uuid;

    fn chunk(dataset_id: DatasetId) -> Chunk {
        let now = Utc::now();
        Chunk {
            id: Uuid::new_v4(),
            dataset_id,
            content: "x\n1".into(),
            delimiter: ',',
            service: "csv".into(),
            ignore_features: Vec::new(),
            to_lowercase: false,
            properties: Properties::new(),
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn task() -> TaskRecord {
        let now = Utc::now();
        TaskRecord {
            id: Uuid::new_v4(),
            kind: TaskKind::Training,
            status: TaskStatus::Created,
            owner_id: "owner".into(),
            estimator_id: Uuid::new_v4(),
            chunk_ids: vec![Uuid::new_v4()],
            training_id: None,
            properties: Properties::new(),
            output: None,
            errors: None,
            report_dir: None,
            started_at: None,
            finished_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn lookups_return_copies_or_not_found() {
        let store = MemoryStore::new();
        let ds = Dataset::new("d");
        let ds_id = ds.id;
        store.insert_dataset(ds).unwrap();
        let c = chunk(ds_id);
        let c_id = c.id;
        store.insert_chunk(c).unwrap();
        let now = Utc::now();
        let est = Estimator {
            id: Uuid::new_v4(),
            name: None,
            service: "simple-regressor".into(),
            properties: Properties::new(),
            created_at: now,
            updated_at: now,
        };
        let est_id = est.id;
        store.insert_estimator(est).unwrap();
        let t = task();
        let t_id = t.id;
        store.insert_task(t).unwrap();

        assert_eq!(store.get_dataset(ds_id).unwrap().id, ds_id);
        assert_eq!(store.get_chunk(c_id).unwrap().dataset_id, ds_id);
        assert_eq!(store.get_estimator(est_id).unwrap().service, "simple-regressor");
        assert_eq!(store.get_task(t_id).unwrap().status, TaskStatus::Created);

        let missing = Uuid::new_v4();
        assert!(matches!(store.get_dataset(missing), Err(StoreError::NotFound { kind: "dataset", .. })));
        assert!(matches!(store.get_chunk(missing), Err(StoreError::NotFound { kind: "chunk", .. })));
        assert!(matches!(store.get_estimator(missing), Err(StoreError::NotFound { kind: "estimator", .. })));
        assert!(matches!(store.get_task(missing), Err(StoreError::NotFound { kind: "task", .. })));
    }

    #[test]
    fn dataset_with_chunks_is_protected() {
        let store = MemoryStore::new();
        let ds = Dataset::new("d");
        let id = ds.id;
        store.insert_dataset(ds).unwrap();
        store.insert_chunk(chunk(id)).unwrap();

        assert!(matches!(store.delete_dataset(id), Err(StoreError::Protected { .. })));
        assert!(store.get_dataset(id).is_ok());
    }

    #[test]
    fn chunks_listed_in_insertion_order() {
        let store = MemoryStore::new();
        let ds = Dataset::new("d");
        let id = ds.id;
        store.insert_dataset(ds).unwrap();
        let ids: Vec<ChunkId> = (0..5)
            .map(|_| {
                let c = chunk(id);
                let cid = c.id;
                store.insert_chunk(c).unwrap();
                cid
            })
            .collect();
        let listed: Vec<ChunkId> = store.list_chunks(id).unwrap().iter().map(|c| c.id).collect();
        assert_eq!(listed, ids);
    }

    #[test]
    fn chunk_requires_dataset() {
        let store = MemoryStore::new();
        let err = store.insert_chunk(chunk(Uuid::new_v4())).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: "dataset", .. }));
    }

    #[test]
    fn claim_is_exclusive() {
        let store = MemoryStore::new();
        let t = task();
        let id = t.id;
        store.insert_task(t).unwrap();

        let claimed = store.claim_task(id, Utc::now()).unwrap();
        assert_eq!(claimed.status, TaskStatus::Running);
        assert!(claimed.started_at.is_some());

        let err = store.claim_task(id, Utc::now()).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Transition(CoreError::InvalidTransition { from: TaskStatus::Running, .. })
        ));
    }

    #[test]
    fn finished_task_cannot_regress() {
        let store = MemoryStore::new();
        let t = task();
        let id = t.id;
        store.insert_task(t).unwrap();
        store.claim_task(id, Utc::now()).unwrap();
        store
            .finish_task(id, TaskStatus::Completed, Some(serde_json::json!({})), None, Utc::now())
            .unwrap();

        assert!(store.claim_task(id, Utc::now()).is_err());
        assert!(store
            .finish_task(id, TaskStatus::Failed, None, Some("x".into()), Utc::now())
            .is_err());
        assert_eq!(store.get_task(id).unwrap().status, TaskStatus::Completed);
    }
}
