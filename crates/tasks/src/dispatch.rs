use std::sync::mpsc::{self, Receiver, RecvError};
use std::sync::Arc;

use tracing::{debug, info, warn};

use mlswarm_core::{TaskId, TaskRecord};

use crate::error::TaskError;
use crate::swarm::Swarm;

/// Runs task starts on a rayon worker pool so callers return immediately.
pub struct Dispatcher {
    pool: rayon::ThreadPool,
}

/// Receiver for the result of a dispatched start. Dropping it is fine: the
/// task still runs to completion.
pub struct TaskHandle {
    task_id: TaskId,
    rx: Receiver<Result<TaskRecord, TaskError>>,
}

impl TaskHandle {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Block until the dispatched start returns.
    pub fn wait(self) -> Result<Result<TaskRecord, TaskError>, RecvError> {
        self.rx.recv()
    }
}

impl Dispatcher {
    pub fn new(threads: usize) -> Result<Self, TaskError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("mlswarm-worker-{}", i))
            .build()
            .map_err(|e| TaskError::WorkerPool(e.to_string()))?;
        info!(threads = pool.current_num_threads(), "task dispatcher ready");
        Ok(Self { pool })
    }

    /// Start a task in the background.
    pub fn dispatch(&self, swarm: Arc<Swarm>, task_id: TaskId) -> TaskHandle {
        let (tx, rx) = mpsc::channel();
        debug!(task_id = %task_id, "dispatching task");

        self.pool.spawn(move || {
            let result = swarm.start(task_id);
            if let Err(e) = &result {
                warn!(task_id = %task_id, error = %e, "dispatched task did not run");
            }
            // The caller may have dropped the handle.
            let _ = tx.send(result);
        });

        TaskHandle { task_id, rx }
    }
}
