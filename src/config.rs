//! Project configuration for prdloop.
//!
//! Loaded from `.prdloop/settings.json` in the project directory; every
//! field has a sensible default so the file is optional.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Gate-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Command run as the quality check (relative paths resolve against the
    /// project directory)
    #[serde(default = "default_check_command")]
    pub command: String,

    /// Verdict when the check command is absent. Fail-open keeps the loop
    /// usable before verification tooling exists.
    #[serde(default = "default_true")]
    pub fail_open: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            command: default_check_command(),
            fail_open: true,
        }
    }
}

/// Top-level project configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Ledger filename within the project directory
    #[serde(default = "default_prd_path")]
    pub prd_path: String,

    /// Progress log filename within the project directory
    #[serde(default = "default_progress_path")]
    pub progress_path: String,

    /// Quality gate settings
    #[serde(default)]
    pub gate: GateConfig,

    /// Seconds to sleep between iterations (backpressure pacing)
    #[serde(default = "default_sleep_secs")]
    pub sleep_secs: u64,

    /// Optional per-task attempt ceiling. When set, a task whose attempts
    /// reach this value on a gate rejection is marked failed instead of
    /// being reset for retry.
    #[serde(default)]
    pub max_task_attempts: Option<u32>,

    /// Skip git commits after admitted tasks
    #[serde(default)]
    pub no_commit: bool,
}

fn default_prd_path() -> String {
    "prd.json".to_string()
}

fn default_progress_path() -> String {
    "progress.txt".to_string()
}

fn default_check_command() -> String {
    "./check.sh".to_string()
}

fn default_sleep_secs() -> u64 {
    2
}

fn default_true() -> bool {
    true
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            prd_path: default_prd_path(),
            progress_path: default_progress_path(),
            gate: GateConfig::default(),
            sleep_secs: default_sleep_secs(),
            max_task_attempts: None,
            no_commit: false,
        }
    }
}

impl ProjectConfig {
    /// Load configuration from a project directory, falling back to
    /// defaults when no settings file exists.
    ///
    /// # Errors
    ///
    /// Returns an error when the settings file exists but cannot be parsed.
    pub fn load(project_dir: &Path) -> anyhow::Result<Self> {
        let settings_path = Self::settings_path(project_dir);
        if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)?;
            let config: ProjectConfig = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Get the settings.json path for a project.
    #[must_use]
    pub fn settings_path(project_dir: &Path) -> PathBuf {
        project_dir.join(".prdloop/settings.json")
    }

    /// Resolve the ledger path against the project directory.
    #[must_use]
    pub fn prd_file(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.prd_path)
    }

    /// Resolve the progress log path against the project directory.
    #[must_use]
    pub fn progress_file(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.progress_path)
    }
}
