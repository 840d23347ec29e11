//! Agent dispatch: resolving a backend to a CLI invocation strategy.
//!
//! Each backend is an opaque, locally installed CLI tool (claude, codex,
//! gemini) that accepts a task prompt and returns captured output plus a
//! process exit status. A non-zero exit status means the agent failed to run
//! to completion; it says nothing about code correctness, which is the
//! quality gate's concern.

use crate::error::{PrdError, Result};
use crate::prompt;
use async_trait::async_trait;
use clap::ValueEnum;
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Supported agent backends.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum Backend {
    /// Claude Code CLI
    Claude,
    /// OpenAI Codex CLI
    Codex,
    /// Gemini CLI
    Gemini,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.cli_name())
    }
}

impl Backend {
    /// All known backends, in dispatch-preference order.
    pub const ALL: [Backend; 3] = [Backend::Claude, Backend::Codex, Backend::Gemini];

    /// Name of the CLI executable for this backend.
    #[must_use]
    pub fn cli_name(&self) -> &'static str {
        match self {
            Backend::Claude => "claude",
            Backend::Codex => "codex",
            Backend::Gemini => "gemini",
        }
    }

    /// Check whether the backend's CLI tool is on PATH.
    #[must_use]
    pub fn is_available(&self) -> bool {
        which::which(self.cli_name()).is_ok()
    }

    /// Backends whose CLI tool is currently installed.
    #[must_use]
    pub fn available() -> Vec<Backend> {
        Self::ALL.into_iter().filter(Backend::is_available).collect()
    }
}

/// Execution mode for the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Route to exactly one backend
    Single,
    /// Fan out to every available backend and aggregate
    Consensus,
}

/// Captured result of one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    /// Combined textual output of the agent
    pub output: String,
    /// Process exit status (0 = ran to completion)
    pub exit_code: i32,
}

impl AgentOutcome {
    /// Whether the agent ran to completion.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// An interchangeable execution strategy: accept a prompt, return output
/// text and an exit status.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Execute the agent with the given prompt.
    ///
    /// # Errors
    ///
    /// Returns an error only when the process fails to spawn; a non-zero
    /// exit status is reported through [`AgentOutcome::exit_code`].
    async fn execute(&self, prompt: &str) -> Result<AgentOutcome>;

    /// Human-readable name for logging.
    fn name(&self) -> String;
}

/// CLI-tool-backed agent for a single backend.
pub struct CliAgent {
    backend: Backend,
    project_dir: PathBuf,
}

impl CliAgent {
    #[must_use]
    pub fn new(backend: Backend, project_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            project_dir: project_dir.into(),
        }
    }

    /// Build the backend-specific command. The prompt travels on stdin for
    /// CLIs that read it there, or as an argument where the CLI requires it.
    fn command(&self, prompt: &str) -> (Command, bool) {
        let mut cmd = Command::new(self.backend.cli_name());
        cmd.current_dir(&self.project_dir);
        let stdin_prompt = match self.backend {
            Backend::Claude => {
                cmd.args(["-p", "--dangerously-skip-permissions"]);
                true
            }
            Backend::Codex => {
                cmd.args(["exec", "--full-auto", "-"]);
                true
            }
            Backend::Gemini => {
                cmd.args(["--yolo", "-p", prompt]);
                false
            }
        };
        (cmd, stdin_prompt)
    }
}

#[async_trait]
impl Agent for CliAgent {
    async fn execute(&self, prompt: &str) -> Result<AgentOutcome> {
        debug!(
            "Dispatching to {} ({} chars)",
            self.backend.cli_name(),
            prompt.len()
        );

        let (mut cmd, stdin_prompt) = self.command(prompt);
        let mut child = cmd
            .stdin(if stdin_prompt {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                PrdError::agent(self.backend.cli_name(), 127, format!("spawn failed: {e}"))
            })?;

        if stdin_prompt {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(prompt.as_bytes()).await?;
                stdin.flush().await?;
                drop(stdin);
            }
        }

        let output = child.wait_with_output().await?;
        let exit_code = output.status.code().unwrap_or(1);
        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        if exit_code != 0 {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.trim().is_empty() {
                text.push_str("\n[stderr]\n");
                text.push_str(stderr.trim());
            }
        }

        Ok(AgentOutcome { output: text, exit_code })
    }

    fn name(&self) -> String {
        self.backend.cli_name().to_string()
    }
}

/// Resolves the configured backend and mode to agent invocations.
///
/// Single mode routes to exactly one backend. Consensus mode wraps the
/// prompt in a consensus frame and fans out concurrently to every available
/// backend, aggregating the outputs under per-backend headers; the aggregate
/// succeeds when at least one backend ran to completion.
pub struct Dispatcher {
    mode: ExecutionMode,
    agents: Vec<CliAgent>,
}

impl Dispatcher {
    /// Build a dispatcher for the given backend and mode.
    ///
    /// # Errors
    ///
    /// `MissingTool` when the selected backend is not installed;
    /// `NoBackend` when consensus mode finds no backend at all.
    pub fn new(backend: Backend, mode: ExecutionMode, project_dir: &Path) -> Result<Self> {
        let agents = match mode {
            ExecutionMode::Single => {
                if !backend.is_available() {
                    return Err(PrdError::MissingTool {
                        tool: backend.cli_name().to_string(),
                    });
                }
                vec![CliAgent::new(backend, project_dir)]
            }
            ExecutionMode::Consensus => {
                let available = Backend::available();
                if available.is_empty() {
                    return Err(PrdError::NoBackend {
                        detail: "no agent CLI found on PATH (claude, codex, gemini)".to_string(),
                    });
                }
                available
                    .into_iter()
                    .map(|b| CliAgent::new(b, project_dir))
                    .collect()
            }
        };
        Ok(Self { mode, agents })
    }

    async fn execute_consensus(&self, prompt: &str) -> Result<AgentOutcome> {
        let framed = prompt::consensus_frame(prompt);
        let futures = self.agents.iter().map(|agent| {
            let framed = framed.clone();
            async move { (agent.name(), agent.execute(&framed).await) }
        });
        let results = join_all(futures).await;

        let mut any_success = false;
        let mut aggregate = String::new();
        for (name, result) in results {
            aggregate.push_str(&format!("### {name}\n"));
            match result {
                Ok(outcome) if outcome.succeeded() => {
                    any_success = true;
                    aggregate.push_str(&outcome.output);
                }
                Ok(outcome) => {
                    warn!("Consensus backend {} exited with {}", name, outcome.exit_code);
                    aggregate.push_str(&format!(
                        "(exited with status {})\n{}",
                        outcome.exit_code, outcome.output
                    ));
                }
                Err(e) => {
                    warn!("Consensus backend {} failed: {}", name, e);
                    aggregate.push_str(&format!("(failed to run: {e})"));
                }
            }
            aggregate.push_str("\n\n");
        }

        Ok(AgentOutcome {
            output: aggregate,
            exit_code: i32::from(!any_success),
        })
    }
}

#[async_trait]
impl Agent for Dispatcher {
    async fn execute(&self, prompt: &str) -> Result<AgentOutcome> {
        match self.mode {
            ExecutionMode::Single => self.agents[0].execute(prompt).await,
            ExecutionMode::Consensus => self.execute_consensus(prompt).await,
        }
    }

    fn name(&self) -> String {
        match self.mode {
            ExecutionMode::Single => self.agents[0].name(),
            ExecutionMode::Consensus => format!(
                "consensus({})",
                self.agents
                    .iter()
                    .map(Agent::name)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_cli_names() {
        assert_eq!(Backend::Claude.cli_name(), "claude");
        assert_eq!(Backend::Codex.cli_name(), "codex");
        assert_eq!(Backend::Gemini.cli_name(), "gemini");
        assert_eq!(Backend::Claude.to_string(), "claude");
    }

    #[test]
    fn test_agent_outcome_succeeded() {
        let ok = AgentOutcome {
            output: String::new(),
            exit_code: 0,
        };
        let bad = AgentOutcome {
            output: String::new(),
            exit_code: 2,
        };
        assert!(ok.succeeded());
        assert!(!bad.succeeded());
    }

    #[test]
    fn test_claude_prompt_travels_on_stdin() {
        let agent = CliAgent::new(Backend::Claude, ".");
        let (_, stdin_prompt) = agent.command("do the thing");
        assert!(stdin_prompt);
    }

    #[test]
    fn test_gemini_prompt_travels_as_argument() {
        let agent = CliAgent::new(Backend::Gemini, ".");
        let (_, stdin_prompt) = agent.command("do the thing");
        assert!(!stdin_prompt);
    }

    #[tokio::test]
    async fn test_execute_missing_binary_is_agent_error() {
        // Point the backend at a binary name that cannot exist.
        struct Missing;
        #[async_trait]
        impl Agent for Missing {
            async fn execute(&self, _prompt: &str) -> Result<AgentOutcome> {
                Err(PrdError::agent("claude", 127, "spawn failed"))
            }
            fn name(&self) -> String {
                "missing".to_string()
            }
        }
        let err = Missing.execute("x").await.unwrap_err();
        assert!(matches!(err, PrdError::AgentProcess { exit_code: 127, .. }));
        assert!(err.is_recoverable());
    }
}
