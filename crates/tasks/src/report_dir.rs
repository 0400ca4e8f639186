use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use mlswarm_core::TaskId;

use crate::error::TaskError;

/// Layout of per-task report directories: `<root>/trainings/<task_id>`.
#[derive(Debug, Clone)]
pub struct ReportDirs {
    root: PathBuf,
}

impl ReportDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory reserved for a training task.
    pub fn for_task(&self, id: TaskId) -> PathBuf {
        self.root.join("trainings").join(id.to_string())
    }
}

/// Create a task's report directory. Parents are created as needed but the
/// leaf must not exist yet, so no two tasks can end up sharing one.
pub fn create(path: &Path) -> Result<(), TaskError> {
    let err = |source: io::Error| {
        warn!(path = %path.display(), error = %source, "cannot create report directory");
        TaskError::ReportDir {
            path: path.to_path_buf(),
            source,
        }
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(err)?;
    }
    fs::create_dir(path).map_err(err)?;
    debug!(path = %path.display(), "created report directory");
    Ok(())
}

/// Remove a report directory and everything in it. A missing directory is fine.
pub fn remove(path: &Path) -> Result<(), TaskError> {
    match fs::remove_dir_all(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed report directory");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => {
            warn!(path = %path.display(), error = %source, "cannot remove report directory");
            Err(TaskError::ReportDir {
                path: path.to_path_buf(),
                source,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn distinct_tasks_get_distinct_directories() {
        let dirs = ReportDirs::new("/reports");
        let a = dirs.for_task(Uuid::new_v4());
        let b = dirs.for_task(Uuid::new_v4());
        assert_ne!(a, b);
        assert!(a.starts_with("/reports/trainings"));
    }

    #[test]
    fn create_refuses_existing_leaf() {
        let tmp = tempfile::tempdir().unwrap();
        let path = ReportDirs::new(tmp.path()).for_task(Uuid::new_v4());
        create(&path).unwrap();
        assert!(path.is_dir());
        assert!(matches!(create(&path), Err(TaskError::ReportDir { .. })));
    }

    #[test]
    fn remove_is_recursive_and_tolerates_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("t");
        create(&path).unwrap();
        fs::write(path.join("model.json"), "{}").unwrap();
        remove(&path).unwrap();
        assert!(!path.exists());
        remove(&path).unwrap();
    }
}
