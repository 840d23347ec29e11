//! Custom error types for prdloop.
//!
//! This module provides structured error types that enable better
//! error handling, reporting, and recovery throughout the application.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for prdloop operations
#[derive(Error, Debug)]
pub enum PrdError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Failed to load configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Missing required file
    #[error("Missing required file: {path}")]
    MissingFile { path: PathBuf },

    // =========================================================================
    // Ledger Errors
    // =========================================================================
    /// Ledger could not be read or written
    #[error("Ledger error: {message}")]
    Ledger {
        message: String,
        path: Option<PathBuf>,
    },

    /// Referenced task does not exist in the ledger
    #[error("Task #{id} not found in ledger")]
    TaskNotFound { id: u64 },

    // =========================================================================
    // Loop Execution Errors
    // =========================================================================
    /// Loop execution failed
    #[error("Loop execution error: {message}")]
    Loop { message: String },

    /// Agent process failed to run to completion
    #[error("Agent '{backend}' failed with exit code {exit_code}: {message}")]
    AgentProcess {
        backend: String,
        exit_code: i32,
        message: String,
    },

    /// Maximum iterations exceeded
    #[error("Maximum iterations ({max}) reached without completion")]
    MaxIterations { max: u32 },

    // =========================================================================
    // Tool Errors
    // =========================================================================
    /// Missing required tool
    #[error("Missing required tool: {tool}")]
    MissingTool { tool: String },

    /// No agent backend available on PATH
    #[error("No agent backend available: {detail}")]
    NoBackend { detail: String },

    /// Git operation failed
    #[error("Git operation failed: {operation} - {message}")]
    Git { operation: String, message: String },

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PrdError {
    // =========================================================================
    // Constructor helpers
    // =========================================================================

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a ledger error
    pub fn ledger(message: impl Into<String>) -> Self {
        Self::Ledger {
            message: message.into(),
            path: None,
        }
    }

    /// Create a ledger error with the offending path
    pub fn ledger_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Ledger {
            message: message.into(),
            path: Some(path),
        }
    }

    /// Create a loop error
    pub fn loop_error(message: impl Into<String>) -> Self {
        Self::Loop {
            message: message.into(),
        }
    }

    /// Create an agent process error
    pub fn agent(backend: impl Into<String>, exit_code: i32, message: impl Into<String>) -> Self {
        Self::AgentProcess {
            backend: backend.into(),
            exit_code,
            message: message.into(),
        }
    }

    /// Create a git error
    pub fn git(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Git {
            operation: operation.into(),
            message: message.into(),
        }
    }

    // =========================================================================
    // Classification helpers
    // =========================================================================

    /// Check if this error is recoverable (loop continues, state recorded)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Loop { .. } | Self::AgentProcess { .. } | Self::Git { .. }
        )
    }

    /// Check if this error is fatal (should abort the loop)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Ledger { .. }
                | Self::MaxIterations { .. }
                | Self::MissingFile { .. }
                | Self::MissingTool { .. }
                | Self::NoBackend { .. }
        )
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MaxIterations { .. } => 3,
            Self::MissingFile { .. } | Self::MissingTool { .. } | Self::NoBackend { .. } => 6,
            Self::Config { .. } => 7,
            Self::Ledger { .. } | Self::TaskNotFound { .. } => 8,
            _ => 1,
        }
    }
}

/// Type alias for prdloop results
pub type Result<T> = std::result::Result<T, PrdError>;
