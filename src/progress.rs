//! Append-only progress log.
//!
//! One human-skimmable line per entry: `[timestamp] [Iteration N] message`.
//! The log is write-only from the loop's perspective and doubles as the
//! audit trail of every task transition.

use crate::error::{PrdError, Result};
use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Writer for the progress log file.
#[derive(Debug, Clone)]
pub struct ProgressLog {
    path: PathBuf,
}

impl ProgressLog {
    /// Create a logger for the given file. The file is created lazily on
    /// first append.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a progress entry for the given iteration.
    ///
    /// # Errors
    ///
    /// Returns a ledger error if the file cannot be opened or written.
    pub fn append(&self, iteration: u32, message: &str) -> Result<()> {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let line = format!("[{timestamp}] [Iteration {iteration}] {message}\n");

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                PrdError::ledger_with_path(
                    format!("progress log open failed: {e}"),
                    self.path.clone(),
                )
            })?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Append a learning entry, prefixed so learnings are grep-able.
    pub fn append_learning(&self, iteration: u32, learning: &str) -> Result<()> {
        self.append(iteration, &format!("LEARNING: {learning}"))
    }
}
