//! PRD (Product Requirements Document) data model.
//!
//! The PRD is the persisted task list driven by the loop: an ordered
//! collection of tasks plus loop metadata (iteration counter, ceiling,
//! completion flag, learnings). Tasks are never deleted, only transitioned.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Status of a single task.
///
/// A task transitions `pending -> in_progress -> {done | pending | failed}`.
/// `done` and `failed` are absorbing within a run; a gate-rejected task is
/// reset to `pending` for retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Done,
    Failed,
    Blocked,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::InProgress => write!(f, "in_progress"),
            TaskStatus::Done => write!(f, "done"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Blocked => write!(f, "blocked"),
        }
    }
}

impl TaskStatus {
    /// Icon used by the `status` command output.
    #[must_use]
    pub fn icon(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "[ ]",
            TaskStatus::InProgress => "[>]",
            TaskStatus::Done => "[x]",
            TaskStatus::Failed => "[!]",
            TaskStatus::Blocked => "[-]",
        }
    }
}

/// A single task in the PRD.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique, stable identifier
    pub id: u64,
    /// What the task should accomplish
    pub description: String,
    /// Current status
    #[serde(default = "default_status")]
    pub status: TaskStatus,
    /// Free-text acceptance criteria
    #[serde(default)]
    pub success_criteria: String,
    /// File-path hints for the agent
    #[serde(default)]
    pub files_to_modify: Vec<String>,
    /// Completion notes, set when the task is marked done
    #[serde(default)]
    pub notes: String,
    /// Number of times the task has been started
    #[serde(default)]
    pub attempts: u32,
    /// Reason for the most recent failure or gate rejection
    #[serde(default)]
    pub last_error: String,
    /// ISO-8601 timestamp set when the task is marked done
    #[serde(default)]
    pub completed_at: String,
}

fn default_status() -> TaskStatus {
    TaskStatus::Pending
}

impl Task {
    /// Create a pending task with the given id and description.
    #[must_use]
    pub fn new(id: u64, description: impl Into<String>) -> Self {
        Self {
            id,
            description: description.into(),
            status: TaskStatus::Pending,
            success_criteria: String::new(),
            files_to_modify: Vec::new(),
            notes: String::new(),
            attempts: 0,
            last_error: String::new(),
            completed_at: String::new(),
        }
    }

    /// Set the success criteria (builder style).
    #[must_use]
    pub fn with_success_criteria(mut self, criteria: impl Into<String>) -> Self {
        self.success_criteria = criteria.into();
        self
    }

    /// Set the file hints (builder style).
    #[must_use]
    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files_to_modify = files;
        self
    }
}

/// Counts per status, for the `status` command and prompt context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub total: usize,
    pub done: usize,
    pub in_progress: usize,
    pub failed: usize,
    pub pending: usize,
    pub progress_percent: f64,
    pub iteration: u32,
    pub passes: bool,
}

/// The PRD: project metadata, ordered tasks, and loop state.
///
/// Owned exclusively by the iteration controller through the task store;
/// persisted after every mutation so the loop is resumable across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prd {
    pub project_name: String,
    pub description: String,
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// True once every task is done
    #[serde(default)]
    pub passes: bool,
    /// Monotonic iteration counter, starts at 0
    #[serde(default)]
    pub iteration: u32,
    /// Iteration ceiling - the loop's safety valve
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
    /// Human-readable learnings accumulated across iterations
    #[serde(default)]
    pub learnings: Vec<String>,
}

fn default_max_iterations() -> u32 {
    100
}

impl Prd {
    /// Create a new PRD with the given tasks.
    #[must_use]
    pub fn new(
        project_name: impl Into<String>,
        description: impl Into<String>,
        tasks: Vec<Task>,
    ) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            project_name: project_name.into(),
            description: description.into(),
            tasks,
            passes: false,
            iteration: 0,
            max_iterations: default_max_iterations(),
            created_at: now.clone(),
            updated_at: now,
            learnings: Vec::new(),
        }
    }

    /// Get the next eligible task.
    ///
    /// An `in_progress` task is returned first so a crashed run resumes the
    /// same task. Otherwise the first `pending` task in insertion order wins,
    /// regardless of id.
    #[must_use]
    pub fn next_task(&self) -> Option<&Task> {
        if let Some(task) = self
            .tasks
            .iter()
            .find(|t| t.status == TaskStatus::InProgress)
        {
            return Some(task);
        }
        self.tasks.iter().find(|t| t.status == TaskStatus::Pending)
    }

    /// Look up a task by id.
    #[must_use]
    pub fn task_by_id(&self, id: u64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    fn task_by_id_mut(&mut self, id: u64) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Mark a task in progress, incrementing its attempt counter.
    ///
    /// Returns false if the task does not exist.
    pub fn mark_in_progress(&mut self, id: u64) -> bool {
        let Some(task) = self.task_by_id_mut(id) else {
            return false;
        };
        task.status = TaskStatus::InProgress;
        task.attempts += 1;
        self.touch();
        true
    }

    /// Mark a task done, recording completion notes and timestamp.
    pub fn mark_done(&mut self, id: u64, notes: &str) -> bool {
        let completed_at = Utc::now().to_rfc3339();
        let Some(task) = self.task_by_id_mut(id) else {
            return false;
        };
        task.status = TaskStatus::Done;
        task.completed_at = completed_at;
        task.last_error = String::new();
        if !notes.is_empty() {
            task.notes = notes.to_string();
        }
        self.touch();
        self.check_completion();
        true
    }

    /// Mark a task failed, recording the error.
    pub fn mark_failed(&mut self, id: u64, error: &str) -> bool {
        let Some(task) = self.task_by_id_mut(id) else {
            return false;
        };
        task.status = TaskStatus::Failed;
        task.last_error = error.to_string();
        self.touch();
        true
    }

    /// Reset a task to pending for retry.
    ///
    /// The rejection reason (if any) is carried in `last_error` so the next
    /// prompt includes the failure context.
    pub fn reset_task(&mut self, id: u64, reason: &str) -> bool {
        let Some(task) = self.task_by_id_mut(id) else {
            return false;
        };
        task.status = TaskStatus::Pending;
        task.last_error = reason.to_string();
        self.touch();
        true
    }

    /// Append a timestamped learning.
    pub fn add_learning(&mut self, learning: &str) {
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M");
        self.learnings.push(format!("[{timestamp}] {learning}"));
        self.touch();
    }

    /// Check whether the iteration ceiling has been reached.
    #[must_use]
    pub fn ceiling_reached(&self) -> bool {
        self.iteration >= self.max_iterations
    }

    /// Whether the loop should keep going: not passed, below the ceiling,
    /// and at least one eligible task remains.
    #[must_use]
    pub fn should_continue(&self) -> bool {
        !self.passes && !self.ceiling_reached() && self.next_task().is_some()
    }

    /// Compute the per-status summary.
    #[must_use]
    pub fn progress_summary(&self) -> ProgressSummary {
        let total = self.tasks.len();
        let count = |s: TaskStatus| self.tasks.iter().filter(|t| t.status == s).count();
        let done = count(TaskStatus::Done);
        ProgressSummary {
            total,
            done,
            in_progress: count(TaskStatus::InProgress),
            failed: count(TaskStatus::Failed),
            pending: count(TaskStatus::Pending),
            progress_percent: if total > 0 {
                (done as f64 / total as f64 * 1000.0).round() / 10.0
            } else {
                0.0
            },
            iteration: self.iteration,
            passes: self.passes,
        }
    }

    fn check_completion(&mut self) {
        if self.tasks.is_empty() {
            return;
        }
        self.passes = self.tasks.iter().all(|t| t.status == TaskStatus::Done);
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now().to_rfc3339();
    }
}
