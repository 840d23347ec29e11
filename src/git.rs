//! Best-effort git bookkeeping after a task is admitted.
//!
//! Commit failures are logged and swallowed: they must never affect task
//! status or loop continuation.

use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, warn};

/// Side-effecting commit hook invoked after a task passes the gate.
pub trait Committer: Send + Sync {
    /// Attempt to commit the working tree for a completed task.
    ///
    /// Best effort: the result is ignored by the caller.
    fn try_commit(&self, task_id: u64, description: &str);
}

/// Commits via the `git` CLI in the project directory.
pub struct GitCommitter {
    project_dir: PathBuf,
}

impl GitCommitter {
    #[must_use]
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
        }
    }

    fn git(&self, args: &[&str]) -> std::io::Result<std::process::Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.project_dir)
            .output()
    }
}

impl Committer for GitCommitter {
    fn try_commit(&self, task_id: u64, description: &str) {
        if let Err(e) = self.git(&["add", "-A"]) {
            warn!("git add failed for task #{}: {}", task_id, e);
            return;
        }

        let message = format!("task #{task_id}: {description}");
        match self.git(&["commit", "-m", &message]) {
            Ok(output) if output.status.success() => {
                debug!("Committed task #{}", task_id);
            }
            Ok(output) => {
                // Nothing staged, or not a repository. Either way: carry on.
                warn!(
                    "git commit skipped for task #{}: {}",
                    task_id,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            Err(e) => {
                warn!("git commit failed for task #{}: {}", task_id, e);
            }
        }
    }
}

/// No-op committer for projects that opt out of git bookkeeping.
pub struct NullCommitter;

impl Committer for NullCommitter {
    fn try_commit(&self, _task_id: u64, _description: &str) {}
}
