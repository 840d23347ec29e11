//! Task store accessor over the persisted PRD ledger.
//!
//! Every mutation of the task list goes through the [`TaskStore`] trait; the
//! file-backed implementation persists after each mutation with an atomic
//! temp-file + rename under an advisory lock, so a crash between dispatch
//! and commit never leaves two tasks simultaneously in progress.

use crate::error::{PrdError, Result};
use crate::prd::{Prd, Task, TaskStatus};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Why the loop may or may not proceed with another iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    /// An eligible task exists and the ceiling has not been reached
    Ready,
    /// Every task is done
    AllPassed,
    /// No pending or in-progress tasks remain (some may have failed)
    NoEligibleTasks,
    /// The iteration ceiling has been reached
    CeilingReached { max: u32 },
}

/// Abstraction over the persisted task ledger.
///
/// The file-backed [`FileLedger`] is used in production; tests inject an
/// in-memory mock (see [`crate::testing`]).
pub trait TaskStore: Send {
    /// Get the next eligible task, or `None` when no pending or in-progress
    /// task exists. `None` is normal loop termination, not an error.
    fn fetch_next(&self) -> Option<Task>;

    /// Transition a task to a new status and persist the ledger.
    ///
    /// The note is interpreted per target status: completion notes for
    /// `Done`, the error for `Failed`, the retry reason for `Pending`.
    ///
    /// # Errors
    ///
    /// Returns `TaskNotFound` for an unknown id, or a ledger error if
    /// persistence fails.
    fn transition(&mut self, id: u64, status: TaskStatus, note: Option<&str>) -> Result<()>;

    /// Increment and persist the iteration counter, returning the new value.
    fn begin_iteration(&mut self) -> Result<u32>;

    /// Classify whether (and why not) the loop should proceed.
    fn continuation(&self) -> Continuation;

    /// Whether the loop should proceed with another iteration.
    fn should_continue(&self) -> bool {
        self.continuation() == Continuation::Ready
    }

    /// Append a timestamped learning to the ledger and persist.
    fn record_learning(&mut self, learning: &str) -> Result<()>;

    /// Clone the current PRD for read-only consumers (prompts, status).
    fn snapshot(&self) -> Prd;
}

fn classify(prd: &Prd) -> Continuation {
    if prd.passes {
        Continuation::AllPassed
    } else if prd.ceiling_reached() {
        Continuation::CeilingReached {
            max: prd.max_iterations,
        }
    } else if prd.next_task().is_none() {
        Continuation::NoEligibleTasks
    } else {
        Continuation::Ready
    }
}

/// JSON-file-backed task store.
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    prd: Prd,
}

impl FileLedger {
    /// Load an existing ledger.
    ///
    /// # Errors
    ///
    /// `MissingFile` when the ledger does not exist; a ledger error when it
    /// cannot be read or parsed.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Err(PrdError::MissingFile { path });
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| PrdError::ledger_with_path(format!("read failed: {e}"), path.clone()))?;
        let prd: Prd = serde_json::from_str(&content)
            .map_err(|e| PrdError::ledger_with_path(format!("parse failed: {e}"), path.clone()))?;
        Ok(Self { path, prd })
    }

    /// Create a new ledger file from a PRD, overwriting any existing one.
    pub fn create(path: impl Into<PathBuf>, prd: Prd) -> Result<Self> {
        let mut ledger = Self {
            path: path.into(),
            prd,
        };
        ledger.save()?;
        Ok(ledger)
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Override the iteration ceiling and persist.
    pub fn set_max_iterations(&mut self, max: u32) -> Result<()> {
        self.prd.max_iterations = max;
        self.save()
    }

    /// Persist the PRD atomically.
    ///
    /// Writes to a sibling temp file and renames over the ledger, holding an
    /// advisory exclusive lock on a sidecar lockfile for the duration so
    /// concurrent writers cannot interleave partial states.
    fn save(&mut self) -> Result<()> {
        self.prd.updated_at = chrono::Utc::now().to_rfc3339();

        let lock_path = self.path.with_extension("json.lock");
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| {
                PrdError::ledger_with_path(format!("lock open failed: {e}"), lock_path.clone())
            })?;
        lock.lock_exclusive().map_err(|e| {
            PrdError::ledger_with_path(format!("lock failed: {e}"), lock_path.clone())
        })?;

        let result = self.write_locked();
        let _ = fs2::FileExt::unlock(&lock);
        result
    }

    fn write_locked(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.prd)?;
        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut tmp = File::create(&tmp_path).map_err(|e| {
                PrdError::ledger_with_path(format!("write failed: {e}"), tmp_path.clone())
            })?;
            tmp.write_all(json.as_bytes())?;
            tmp.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            PrdError::ledger_with_path(format!("rename failed: {e}"), self.path.clone())
        })
    }
}

impl TaskStore for FileLedger {
    fn fetch_next(&self) -> Option<Task> {
        self.prd.next_task().cloned()
    }

    fn transition(&mut self, id: u64, status: TaskStatus, note: Option<&str>) -> Result<()> {
        let note = note.unwrap_or("");
        let found = match status {
            TaskStatus::InProgress => self.prd.mark_in_progress(id),
            TaskStatus::Done => self.prd.mark_done(id, note),
            TaskStatus::Failed | TaskStatus::Blocked => self.prd.mark_failed(id, note),
            TaskStatus::Pending => self.prd.reset_task(id, note),
        };
        if !found {
            return Err(PrdError::TaskNotFound { id });
        }
        self.save()
    }

    fn begin_iteration(&mut self) -> Result<u32> {
        self.prd.iteration += 1;
        self.save()?;
        Ok(self.prd.iteration)
    }

    fn continuation(&self) -> Continuation {
        classify(&self.prd)
    }

    fn record_learning(&mut self, learning: &str) -> Result<()> {
        self.prd.add_learning(learning);
        self.save()
    }

    fn snapshot(&self) -> Prd {
        self.prd.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_prd() -> Prd {
        Prd::new(
            "demo",
            "demo project",
            vec![Task::new(1, "first"), Task::new(2, "second")],
        )
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let err = FileLedger::load(dir.path().join("prd.json")).unwrap_err();
        assert!(matches!(err, PrdError::MissingFile { .. }));
        assert_eq!(err.exit_code(), 6);
    }

    #[test]
    fn test_load_corrupt_ledger() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prd.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = FileLedger::load(&path).unwrap_err();
        assert!(matches!(err, PrdError::Ledger { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_create_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prd.json");
        FileLedger::create(&path, sample_prd()).unwrap();

        let ledger = FileLedger::load(&path).unwrap();
        assert_eq!(ledger.snapshot().tasks.len(), 2);
        assert_eq!(ledger.fetch_next().unwrap().id, 1);
    }

    #[test]
    fn test_transition_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prd.json");
        let mut ledger = FileLedger::create(&path, sample_prd()).unwrap();

        ledger
            .transition(1, TaskStatus::InProgress, None)
            .unwrap();

        // A fresh load observes the transition.
        let reloaded = FileLedger::load(&path).unwrap();
        let task = reloaded.snapshot().task_by_id(1).cloned().unwrap();
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(task.attempts, 1);
    }

    #[test]
    fn test_transition_unknown_task() {
        let dir = tempdir().unwrap();
        let mut ledger =
            FileLedger::create(dir.path().join("prd.json"), sample_prd()).unwrap();
        let err = ledger.transition(42, TaskStatus::Done, None).unwrap_err();
        assert!(matches!(err, PrdError::TaskNotFound { id: 42 }));
    }

    #[test]
    fn test_begin_iteration_persists_counter() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prd.json");
        let mut ledger = FileLedger::create(&path, sample_prd()).unwrap();
        assert_eq!(ledger.begin_iteration().unwrap(), 1);
        assert_eq!(ledger.begin_iteration().unwrap(), 2);

        let reloaded = FileLedger::load(&path).unwrap();
        assert_eq!(reloaded.snapshot().iteration, 2);
    }

    #[test]
    fn test_continuation_classification() {
        let dir = tempdir().unwrap();
        let mut ledger =
            FileLedger::create(dir.path().join("prd.json"), sample_prd()).unwrap();
        assert_eq!(ledger.continuation(), Continuation::Ready);
        assert!(ledger.should_continue());

        ledger.transition(1, TaskStatus::Failed, Some("boom")).unwrap();
        ledger.transition(2, TaskStatus::Failed, Some("boom")).unwrap();
        assert_eq!(ledger.continuation(), Continuation::NoEligibleTasks);

        ledger.transition(1, TaskStatus::Done, None).unwrap();
        ledger.transition(2, TaskStatus::Done, None).unwrap();
        assert_eq!(ledger.continuation(), Continuation::AllPassed);
    }

    #[test]
    fn test_continuation_ceiling() {
        let dir = tempdir().unwrap();
        let mut prd = sample_prd();
        prd.max_iterations = 1;
        let mut ledger = FileLedger::create(dir.path().join("prd.json"), prd).unwrap();
        ledger.begin_iteration().unwrap();
        assert_eq!(
            ledger.continuation(),
            Continuation::CeilingReached { max: 1 }
        );
        assert!(!ledger.should_continue());
    }

    #[test]
    fn test_no_stray_temp_file_after_save() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("prd.json");
        let mut ledger = FileLedger::create(&path, sample_prd()).unwrap();
        ledger.record_learning("keep prompts short").unwrap();
        assert!(!path.with_extension("json.tmp").exists());
        assert!(path.exists());
    }
}
