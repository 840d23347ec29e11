//! prdloop - PRD-driven agent loop
//!
//! Drives a persistent task list (a PRD stored as JSON) through a bounded
//! retry loop: each iteration hands the next eligible task to an
//! interchangeable agent CLI and admits completion only when an external
//! quality gate passes.
//!
//! # Architecture
//!
//! - [`prd`] - the task list data model (tasks, statuses, loop metadata)
//! - [`ledger`] - task store accessor with atomic JSON persistence
//! - [`agent`] - backend dispatch (claude, codex, gemini; consensus fan-out)
//! - [`gate`] - quality gate subprocess with configurable fail-open default
//! - [`runner`] - the iteration controller
//! - [`progress`] - append-only progress log
//! - [`config`] - project configuration
//! - [`error`] - custom error types and exit-code mapping
//! - [`testing`] - mock collaborators for unit tests
//!
//! # Example
//!
//! ```rust,ignore
//! use prdloop::config::ProjectConfig;
//! use prdloop::ledger::FileLedger;
//! use prdloop::runner::LoopRunner;
//!
//! let config = ProjectConfig::load(".".as_ref())?;
//! let ledger = FileLedger::load(config.prd_file(".".as_ref()))?;
//! // Wire a dispatcher, gate, and committer, then:
//! // LoopRunner::new(...).run().await?;
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod gate;
pub mod git;
pub mod ledger;
pub mod prd;
pub mod progress;
pub mod prompt;
pub mod runner;
pub mod testing;

// Re-export commonly used types
pub use error::{PrdError, Result};

pub use agent::{Agent, AgentOutcome, Backend, CliAgent, Dispatcher, ExecutionMode};
pub use config::{GateConfig, ProjectConfig};
pub use gate::{CommandGate, Gate};
pub use git::{Committer, GitCommitter, NullCommitter};
pub use ledger::{Continuation, FileLedger, TaskStore};
pub use prd::{Prd, ProgressSummary, Task, TaskStatus};
pub use progress::ProgressLog;
pub use runner::{LoopRunner, RunOutcome};
