//! Task execution for mlswarm.
//!
//! This crate provides:
//! - [`Store`] and the in-process [`MemoryStore`]
//! - [`aggregate`]: chunk processing and concatenation
//! - [`BoundEstimator`]: an estimator record bound to its algorithm
//! - [`Engine`]: the task lifecycle (claim, setup, run, teardown, rollback)
//! - [`Swarm`]: the use-case facade
//! - [`Dispatcher`]: background execution on a worker pool

pub mod aggregate;
pub mod binding;
pub mod dispatch;
pub mod error;
pub mod lifecycle;
pub mod report_dir;
pub mod store;
pub mod swarm;

pub use aggregate::aggregate;
pub use binding::BoundEstimator;
pub use dispatch::{Dispatcher, TaskHandle};
pub use error::{StoreError, TaskError};
pub use lifecycle::{Engine, RunOutcome};
pub use report_dir::ReportDirs;
pub use store::{MemoryStore, Store};
pub use swarm::{IgnoreFeatures, NewChunk, NewEstimator, NewTask, ServiceDescription, Swarm};
