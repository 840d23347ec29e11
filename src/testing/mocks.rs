//! Mock implementations of the collaborator traits.

use crate::agent::{Agent, AgentOutcome};
use crate::error::Result;
use crate::gate::Gate;
use crate::git::Committer;
use crate::ledger::{Continuation, TaskStore};
use crate::prd::{Prd, Task, TaskStatus};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Shared handle to the in-memory PRD behind a [`MockTaskStore`], so tests
/// can inspect final state after the store has been moved into the runner.
pub type SharedPrd = Arc<Mutex<Prd>>;

/// In-memory task store with no persistence.
pub struct MockTaskStore {
    prd: SharedPrd,
}

impl MockTaskStore {
    #[must_use]
    pub fn new(prd: Prd) -> Self {
        Self {
            prd: Arc::new(Mutex::new(prd)),
        }
    }

    /// Handle for inspecting the PRD from the test after the store moves.
    #[must_use]
    pub fn shared(&self) -> SharedPrd {
        Arc::clone(&self.prd)
    }
}

impl TaskStore for MockTaskStore {
    fn fetch_next(&self) -> Option<Task> {
        self.prd.lock().unwrap().next_task().cloned()
    }

    fn transition(&mut self, id: u64, status: TaskStatus, note: Option<&str>) -> Result<()> {
        let mut prd = self.prd.lock().unwrap();
        let note = note.unwrap_or("");
        let found = match status {
            TaskStatus::InProgress => prd.mark_in_progress(id),
            TaskStatus::Done => prd.mark_done(id, note),
            TaskStatus::Failed | TaskStatus::Blocked => prd.mark_failed(id, note),
            TaskStatus::Pending => prd.reset_task(id, note),
        };
        if !found {
            return Err(crate::error::PrdError::TaskNotFound { id });
        }
        Ok(())
    }

    fn begin_iteration(&mut self) -> Result<u32> {
        let mut prd = self.prd.lock().unwrap();
        prd.iteration += 1;
        Ok(prd.iteration)
    }

    fn continuation(&self) -> Continuation {
        let prd = self.prd.lock().unwrap();
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

    fn record_learning(&mut self, learning: &str) -> Result<()> {
        self.prd.lock().unwrap().add_learning(learning);
        Ok(())
    }

    fn snapshot(&self) -> Prd {
        self.prd.lock().unwrap().clone()
    }
}

/// Agent returning scripted outcomes; defaults to success when the script
/// is exhausted.
pub struct MockAgent {
    script: Mutex<VecDeque<Result<AgentOutcome>>>,
}

impl MockAgent {
    /// Agent that always runs to completion with empty output.
    #[must_use]
    pub fn always_ok() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
        }
    }

    /// Agent returning the scripted outcomes in order.
    #[must_use]
    pub fn script(outcomes: Vec<Result<AgentOutcome>>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
        }
    }
}

#[async_trait]
impl Agent for MockAgent {
    async fn execute(&self, _prompt: &str) -> Result<AgentOutcome> {
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            Ok(AgentOutcome {
                output: String::new(),
                exit_code: 0,
            })
        })
    }

    fn name(&self) -> String {
        "mock".to_string()
    }
}

/// Gate returning scripted verdicts; falls back to a default verdict when
/// the script is exhausted. Counts how often it was consulted.
pub struct MockGate {
    verdicts: Mutex<VecDeque<bool>>,
    default: bool,
    calls: Arc<Mutex<usize>>,
}

impl MockGate {
    /// Gate that always returns the same verdict.
    #[must_use]
    pub fn always(verdict: bool) -> Self {
        Self {
            verdicts: Mutex::new(VecDeque::new()),
            default: verdict,
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Gate returning the scripted verdicts in order, then `true`.
    #[must_use]
    pub fn script(verdicts: Vec<bool>) -> Self {
        Self {
            verdicts: Mutex::new(verdicts.into()),
            default: true,
            calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Handle to the consultation counter.
    #[must_use]
    pub fn calls(&self) -> Arc<Mutex<usize>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Gate for MockGate {
    async fn check(&self) -> Result<bool> {
        *self.calls.lock().unwrap() += 1;
        Ok(self
            .verdicts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.default))
    }
}

/// Committer recording the task ids it was asked to commit.
#[derive(Clone)]
pub struct MockCommitter {
    commits: Arc<Mutex<Vec<u64>>>,
}

impl Default for MockCommitter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCommitter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            commits: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Task ids committed so far.
    #[must_use]
    pub fn commits(&self) -> Vec<u64> {
        self.commits.lock().unwrap().clone()
    }
}

impl Committer for MockCommitter {
    fn try_commit(&self, task_id: u64, _description: &str) {
        self.commits.lock().unwrap().push(task_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_gate_script_then_default() {
        let gate = MockGate::script(vec![false]);
        assert!(!gate.check().await.unwrap());
        assert!(gate.check().await.unwrap());
        assert_eq!(*gate.calls().lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_mock_agent_defaults_to_success() {
        let agent = MockAgent::always_ok();
        assert!(agent.execute("x").await.unwrap().succeeded());
    }

    #[test]
    fn test_mock_store_shares_state() {
        let store = MockTaskStore::new(Prd::new("p", "d", vec![Task::new(1, "t")]));
        let shared = store.shared();
        let mut store = store;
        store.transition(1, TaskStatus::Done, None).unwrap();
        assert!(shared.lock().unwrap().passes);
    }
}
