use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::CoreError;

pub type DatasetId = Uuid;
pub type ChunkId = Uuid;
pub type EstimatorId = Uuid;
pub type TaskId = Uuid;

/// Identifier of the user owning a task. Users live outside this system.
pub type OwnerId = String;

/// Free-form, service-validated properties stored alongside a record.
pub type Properties = serde_json::Map<String, Value>;

// ── Dataset / Chunk ───────────────────────────────────────────

/// Logical grouping of chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: DatasetId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Dataset {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// One unit of raw content plus the recipe to parse it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub dataset_id: DatasetId,
    /// Inline data, a filesystem path or a `file://` URL.
    pub content: String,
    pub delimiter: char,
    /// Parser service identifier.
    pub service: String,
    pub ignore_features: Vec<String>,
    pub to_lowercase: bool,
    pub properties: Properties,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Split a delimiter-separated feature list, dropping empty entries.
pub fn split_features(raw: &str, delimiter: char) -> Vec<String> {
    raw.split(delimiter)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ── Estimator ─────────────────────────────────────────────────

/// A named, reusable algorithm configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimator {
    pub id: EstimatorId,
    pub name: Option<String>,
    /// Estimator service identifier.
    pub service: String,
    pub properties: Properties,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Display for Estimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.service),
            None => write!(f, "{} #{}", self.service, self.id),
        }
    }
}

// ── Task ──────────────────────────────────────────────────────

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Created,
    Running,
    Interrupted,
    Failed,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Created => "created",
            TaskStatus::Running => "running",
            TaskStatus::Interrupted => "interrupted",
            TaskStatus::Failed => "failed",
            TaskStatus::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Interrupted | TaskStatus::Failed | TaskStatus::Completed
        )
    }

    /// Allowed moves: `created -> running -> {interrupted, failed, completed}`.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        match (self, next) {
            (TaskStatus::Created, TaskStatus::Running) => true,
            (TaskStatus::Running, n) => n.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(TaskStatus::Created),
            "running" => Ok(TaskStatus::Running),
            "interrupted" => Ok(TaskStatus::Interrupted),
            "failed" => Ok(TaskStatus::Failed),
            "completed" => Ok(TaskStatus::Completed),
            other => Err(format!("unknown task status: '{}'", other)),
        }
    }
}

/// Concrete task variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Training,
    Test,
    Predict,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Training => "training",
            TaskKind::Test => "test",
            TaskKind::Predict => "predict",
        }
    }

    /// Test and predict tasks run against the state left by a prior training.
    pub fn requires_training(&self) -> bool {
        !matches!(self, TaskKind::Training)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "training" | "train" => Ok(TaskKind::Training),
            "test" => Ok(TaskKind::Test),
            "predict" | "prediction" => Ok(TaskKind::Predict),
            other => Err(format!("unknown task kind: '{}'", other)),
        }
    }
}

/// Persisted task state. This is also the wire representation handed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub owner_id: OwnerId,
    pub estimator_id: EstimatorId,
    /// Input chunks, in aggregation order.
    pub chunk_ids: Vec<ChunkId>,
    /// Prior training task, for test and predict tasks.
    pub training_id: Option<TaskId>,
    pub properties: Properties,
    pub output: Option<Value>,
    pub errors: Option<String>,
    /// Report directory owned by this task (training tasks only).
    pub report_dir: Option<PathBuf>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The task's report: only present once terminal and with a non-null output.
    pub fn report(&self) -> Option<&Value> {
        if !self.is_terminal() {
            return None;
        }
        self.output.as_ref().filter(|v| !v.is_null())
    }

    /// `created -> running`, stamping `started_at`.
    pub fn mark_running(&mut self, now: DateTime<Utc>) -> Result<(), CoreError> {
        self.transition(TaskStatus::Running)?;
        self.started_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// `running -> terminal`, stamping `finished_at` no earlier than `started_at`.
    pub fn mark_finished(
        &mut self,
        status: TaskStatus,
        output: Option<Value>,
        errors: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        if !status.is_terminal() {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: status,
            });
        }
        self.transition(status)?;
        let finished = match self.started_at {
            Some(started) if started > now => started,
            _ => now,
        };
        self.output = output;
        self.errors = errors;
        self.finished_at = Some(finished);
        self.updated_at = finished;
        Ok(())
    }

    fn transition(&mut self, next: TaskStatus) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record() -> TaskRecord {
        let now = Utc::now();
        TaskRecord {
            id: Uuid::new_v4(),
            kind: TaskKind::Training,
            status: TaskStatus::Created,
            owner_id: "alice".into(),
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
    fn status_transitions_are_monotonic() {
        use TaskStatus::*;
        assert!(Created.can_transition_to(Running));
        assert!(Running.can_transition_to(Completed));
        assert!(Running.can_transition_to(Failed));
        assert!(Running.can_transition_to(Interrupted));
        assert!(!Created.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Running));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Running.can_transition_to(Created));
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in ["created", "running", "interrupted", "failed", "completed"] {
            assert_eq!(s.parse::<TaskStatus>().unwrap().as_str(), s);
        }
        assert!("done".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn finished_at_never_precedes_started_at() {
        let mut r = record();
        let start = Utc::now();
        r.mark_running(start).unwrap();
        r.mark_finished(TaskStatus::Completed, None, None, start - Duration::seconds(5))
            .unwrap();
        assert_eq!(r.finished_at, Some(start));
    }

    #[test]
    fn terminal_task_cannot_restart() {
        let mut r = record();
        r.mark_running(Utc::now()).unwrap();
        r.mark_finished(TaskStatus::Failed, None, Some("boom".into()), Utc::now())
            .unwrap();
        assert!(r.mark_running(Utc::now()).is_err());
        assert_eq!(r.status, TaskStatus::Failed);
    }

    #[test]
    fn report_requires_terminal_and_output() {
        let mut r = record();
        r.output = Some(serde_json::json!({"loss": 0.1}));
        assert!(r.report().is_none());
        r.mark_running(Utc::now()).unwrap();
        r.mark_finished(TaskStatus::Completed, Some(Value::Null), None, Utc::now())
            .unwrap();
        assert!(r.report().is_none());
    }

    #[test]
    fn split_features_trims_and_drops_empty() {
        assert_eq!(split_features("a, b,,c", ','), vec!["a", "b", "c"]);
        assert!(split_features("", ';').is_empty());
    }

    #[test]
    fn wire_shape_uses_snake_case() {
        let json = serde_json::to_value(record()).unwrap();
        assert_eq!(json["status"], "created");
        assert_eq!(json["kind"], "training");
        assert!(json["finished_at"].is_null());
    }
}
