//! Quality gate: the external verification step that must pass before a
//! task is accepted as complete.
//!
//! The gate runs a configured check command (build/lint/test suite) as a
//! subprocess with no arguments and reduces its outcome to a boolean: zero
//! exit admits, non-zero rejects. When the command is absent the configured
//! fail-open default applies, keeping the loop usable before verification
//! tooling exists.

use crate::error::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Binary admit/reject verdict source.
#[async_trait]
pub trait Gate: Send + Sync {
    /// Run the verification procedure.
    ///
    /// # Errors
    ///
    /// Returns an error only on infrastructure failure (the verdict itself
    /// is the boolean).
    async fn check(&self) -> Result<bool>;
}

/// Subprocess-backed gate running the configured check command.
pub struct CommandGate {
    command: String,
    project_dir: PathBuf,
    fail_open: bool,
}

impl CommandGate {
    #[must_use]
    pub fn new(command: impl Into<String>, project_dir: impl Into<PathBuf>, fail_open: bool) -> Self {
        Self {
            command: command.into(),
            project_dir: project_dir.into(),
            fail_open,
        }
    }

    /// Whether the configured check command exists (as a project-relative
    /// path or on PATH).
    #[must_use]
    pub fn is_present(&self) -> bool {
        let Some(program) = self.command.split_whitespace().next() else {
            return false;
        };
        if program.contains('/') {
            return self.project_dir.join(program).exists();
        }
        which::which(program).is_ok()
    }
}

#[async_trait]
impl Gate for CommandGate {
    async fn check(&self) -> Result<bool> {
        if !self.is_present() {
            warn!(
                "Quality check '{}' not found; defaulting to {}",
                self.command,
                if self.fail_open { "pass" } else { "reject" }
            );
            return Ok(self.fail_open);
        }

        let mut parts = self.command.split_whitespace();
        let program = parts.next().unwrap_or_default();
        let status = Command::new(program)
            .args(parts)
            .current_dir(&self.project_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await?;

        let passed = status.success();
        debug!("Quality check '{}' {}", self.command, if passed { "passed" } else { "rejected" });
        Ok(passed)
    }
}
