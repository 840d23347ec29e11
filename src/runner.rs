//! The iteration controller: drives the PRD through a bounded retry loop.
//!
//! One task is fully resolved per iteration: fetch, mark in progress,
//! dispatch to the agent, consult the quality gate, commit the new status to
//! the ledger, record a progress entry, then sleep a short pacing interval.
//! All per-task failures are converted into ledger state plus progress
//! entries; only ledger-access failures and the iteration ceiling terminate
//! the loop.

use crate::agent::Agent;
use crate::error::{PrdError, Result};
use crate::gate::Gate;
use crate::git::Committer;
use crate::ledger::{Continuation, TaskStore};
use crate::prd::TaskStatus;
use crate::progress::ProgressLog;
use crate::prompt;
use std::time::Duration;
use tracing::{error, info, warn};

/// How a completed run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every task is done
    AllPassed,
    /// No pending or in-progress tasks remain (some failed terminally)
    NoEligibleTasks,
}

/// The main loop over injected collaborators.
pub struct LoopRunner {
    store: Box<dyn TaskStore>,
    agent: Box<dyn Agent>,
    gate: Box<dyn Gate>,
    committer: Box<dyn Committer>,
    progress: ProgressLog,
    sleep: Duration,
    max_task_attempts: Option<u32>,
    commit_on_done: bool,
}

impl LoopRunner {
    #[must_use]
    pub fn new(
        store: Box<dyn TaskStore>,
        agent: Box<dyn Agent>,
        gate: Box<dyn Gate>,
        committer: Box<dyn Committer>,
        progress: ProgressLog,
    ) -> Self {
        Self {
            store,
            agent,
            gate,
            committer,
            progress,
            sleep: Duration::from_secs(2),
            max_task_attempts: None,
            commit_on_done: true,
        }
    }

    /// Set the inter-iteration pacing interval.
    #[must_use]
    pub fn with_sleep(mut self, sleep: Duration) -> Self {
        self.sleep = sleep;
        self
    }

    /// Cap attempts per task; a gate rejection at the cap marks the task
    /// failed instead of resetting it.
    #[must_use]
    pub fn with_max_task_attempts(mut self, max: Option<u32>) -> Self {
        self.max_task_attempts = max;
        self
    }

    /// Enable or disable the post-admission commit hook.
    #[must_use]
    pub fn with_commit_on_done(mut self, enabled: bool) -> Self {
        self.commit_on_done = enabled;
        self
    }

    /// Drive the loop to completion or the iteration ceiling.
    ///
    /// # Errors
    ///
    /// `MaxIterations` when the ceiling is reached with work remaining;
    /// ledger errors are fatal and propagated.
    pub async fn run(&mut self) -> Result<RunOutcome> {
        loop {
            match self.store.continuation() {
                Continuation::AllPassed => {
                    info!("All tasks complete");
                    return Ok(RunOutcome::AllPassed);
                }
                Continuation::NoEligibleTasks => {
                    info!("No more tasks to work on");
                    return Ok(RunOutcome::NoEligibleTasks);
                }
                Continuation::CeilingReached { max } => {
                    error!("Iteration ceiling ({}) reached with work remaining", max);
                    return Err(PrdError::MaxIterations { max });
                }
                Continuation::Ready => {}
            }

            let iteration = self.store.begin_iteration()?;
            self.progress
                .append(iteration, &format!("Starting iteration {iteration}"))?;

            let Some(task) = self.store.fetch_next() else {
                // Raced away between the continuation check and here.
                info!("No more tasks to work on");
                return Ok(RunOutcome::NoEligibleTasks);
            };
            info!(
                "Iteration {}: task #{} - {}",
                iteration, task.id, task.description
            );

            self.store
                .transition(task.id, TaskStatus::InProgress, None)?;
            self.run_task(task.id, iteration).await?;

            if !self.sleep.is_zero() {
                tokio::time::sleep(self.sleep).await;
            }
        }
    }

    /// Resolve a single in-progress task: dispatch, gate, commit status.
    async fn run_task(&mut self, task_id: u64, iteration: u32) -> Result<()> {
        let snapshot = self.store.snapshot();
        let prompt = prompt::task_prompt(&snapshot)
            .ok_or_else(|| PrdError::loop_error("no prompt for an eligible task"))?;

        let outcome = match self.agent.execute(&prompt).await {
            Ok(outcome) => outcome,
            Err(e) => {
                // The agent never ran to completion; this is not a verdict
                // on the code, so the gate is not consulted.
                warn!("Agent {} failed to run: {}", self.agent.name(), e);
                let reason = format!("agent failed to run: {e}");
                self.store
                    .transition(task_id, TaskStatus::Failed, Some(&reason))?;
                self.progress.append(
                    iteration,
                    &format!("Task #{task_id} execution failed: {e}"),
                )?;
                return Ok(());
            }
        };

        if !outcome.succeeded() {
            warn!(
                "Agent {} exited with status {}",
                self.agent.name(),
                outcome.exit_code
            );
            let reason = format!("agent exited with status {}", outcome.exit_code);
            self.store
                .transition(task_id, TaskStatus::Failed, Some(&reason))?;
            self.progress.append(
                iteration,
                &format!("Task #{task_id} execution failed ({reason})"),
            )?;
            return Ok(());
        }

        let verdict = match self.gate.check().await {
            Ok(passed) => passed,
            Err(e) => {
                warn!("Quality check could not run: {}", e);
                false
            }
        };

        if verdict {
            let note = format!("completed at iteration {iteration}");
            self.store
                .transition(task_id, TaskStatus::Done, Some(&note))?;
            self.progress
                .append(iteration, &format!("Task #{task_id} completed"))?;
            if self.commit_on_done {
                let description = self
                    .store
                    .snapshot()
                    .task_by_id(task_id)
                    .map(|t| t.description.clone())
                    .unwrap_or_default();
                self.committer.try_commit(task_id, &description);
            }
            return Ok(());
        }

        let attempts = self
            .store
            .snapshot()
            .task_by_id(task_id)
            .map(|t| t.attempts)
            .unwrap_or(0);
        if let Some(max) = self.max_task_attempts {
            if attempts >= max {
                let reason = format!("quality gate rejected after {attempts} attempts");
                self.store
                    .transition(task_id, TaskStatus::Failed, Some(&reason))?;
                self.progress
                    .append(iteration, &format!("Task #{task_id} failed: {reason}"))?;
                return Ok(());
            }
        }

        let reason = format!("quality gate rejected (iteration {iteration})");
        self.store
            .transition(task_id, TaskStatus::Pending, Some(&reason))?;
        self.progress.append(
            iteration,
            &format!("Task #{task_id} gate rejected; reset to pending"),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentOutcome;
    use crate::prd::{Prd, Task, TaskStatus};
    use crate::testing::{MockAgent, MockCommitter, MockGate, MockTaskStore, SharedPrd};
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    fn prd_with_tasks(n: u64) -> Prd {
        let tasks = (1..=n)
            .map(|i| Task::new(i, format!("task {i}")))
            .collect();
        Prd::new("demo", "demo project", tasks)
    }

    struct Harness {
        runner: LoopRunner,
        prd: SharedPrd,
        committer: MockCommitter,
        _dir: tempfile::TempDir,
    }

    fn harness(prd: Prd, agent: MockAgent, gate: MockGate) -> Harness {
        let dir = tempdir().unwrap();
        let store = MockTaskStore::new(prd);
        let shared = store.shared();
        let committer = MockCommitter::new();
        let runner = LoopRunner::new(
            Box::new(store),
            Box::new(agent),
            Box::new(gate),
            Box::new(committer.clone()),
            ProgressLog::new(dir.path().join("progress.txt")),
        )
        .with_sleep(Duration::ZERO);
        Harness {
            runner,
            prd: shared,
            committer,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_single_task_success() {
        let mut h = harness(prd_with_tasks(1), MockAgent::always_ok(), MockGate::always(true));
        let outcome = h.runner.run().await.unwrap();

        assert_eq!(outcome, RunOutcome::AllPassed);
        let prd = h.prd.lock().unwrap();
        assert_eq!(prd.task_by_id(1).unwrap().status, TaskStatus::Done);
        assert_eq!(prd.iteration, 1);
        assert!(!prd.should_continue());
        assert_eq!(h.committer.commits(), vec![1]);
    }

    #[tokio::test]
    async fn test_gate_fails_twice_then_passes() {
        let gate = MockGate::script(vec![false, false, true]);
        let mut h = harness(prd_with_tasks(1), MockAgent::always_ok(), gate);
        let outcome = h.runner.run().await.unwrap();

        assert_eq!(outcome, RunOutcome::AllPassed);
        let prd = h.prd.lock().unwrap();
        let task = prd.task_by_id(1).unwrap();
        assert_eq!(task.status, TaskStatus::Done);
        assert_eq!(task.attempts, 3);
        assert_eq!(prd.iteration, 3);
    }

    #[tokio::test]
    async fn test_agent_nonzero_exit_marks_failed_without_gate() {
        let agent = MockAgent::script(vec![Ok(AgentOutcome {
            output: "crash".to_string(),
            exit_code: 2,
        })]);
        let gate = MockGate::always(true);
        let gate_calls = gate.calls();
        let mut h = harness(prd_with_tasks(1), agent, gate);
        let outcome = h.runner.run().await.unwrap();

        assert_eq!(outcome, RunOutcome::NoEligibleTasks);
        let prd = h.prd.lock().unwrap();
        let task = prd.task_by_id(1).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.last_error.contains("status 2"));
        assert_eq!(prd.iteration, 1);
        // The gate is never consulted on execution failure.
        assert_eq!(*gate_calls.lock().unwrap(), 0);
        assert!(h.committer.commits().is_empty());
    }

    #[tokio::test]
    async fn test_agent_spawn_failure_marks_failed() {
        let agent = MockAgent::script(vec![Err(PrdError::agent(
            "claude", 127, "spawn failed",
        ))]);
        let mut h = harness(prd_with_tasks(1), agent, MockGate::always(true));
        h.runner.run().await.unwrap();

        let prd = h.prd.lock().unwrap();
        assert_eq!(prd.task_by_id(1).unwrap().status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn test_ceiling_stops_loop_with_error() {
        let mut prd = prd_with_tasks(2);
        prd.max_iterations = 1;
        let mut h = harness(prd, MockAgent::always_ok(), MockGate::always(true));
        let err = h.runner.run().await.unwrap_err();

        assert!(matches!(err, PrdError::MaxIterations { max: 1 }));
        let prd = h.prd.lock().unwrap();
        assert_eq!(prd.iteration, 1);
        assert_eq!(prd.task_by_id(1).unwrap().status, TaskStatus::Done);
        assert_eq!(prd.task_by_id(2).unwrap().status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_terminates_within_ceiling_despite_rejections() {
        let mut prd = prd_with_tasks(1);
        prd.max_iterations = 5;
        let mut h = harness(prd, MockAgent::always_ok(), MockGate::always(false));
        let err = h.runner.run().await.unwrap_err();

        assert!(matches!(err, PrdError::MaxIterations { max: 5 }));
        let prd = h.prd.lock().unwrap();
        assert_eq!(prd.iteration, 5);
        assert_eq!(prd.task_by_id(1).unwrap().status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_per_task_attempt_cap_routes_to_failed() {
        let mut h = harness(prd_with_tasks(1), MockAgent::always_ok(), MockGate::always(false));
        h.runner = h.runner.with_max_task_attempts(Some(2));
        let outcome = h.runner.run().await.unwrap();

        assert_eq!(outcome, RunOutcome::NoEligibleTasks);
        let prd = h.prd.lock().unwrap();
        let task = prd.task_by_id(1).unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.attempts, 2);
    }

    /// Store wrapper sampling the in-progress count after every mutation,
    /// so a second simultaneous in-progress task is caught mid-run rather
    /// than inferred from final state.
    struct CountingStore {
        inner: MockTaskStore,
        max_in_progress: Arc<Mutex<usize>>,
    }

    impl CountingStore {
        fn new(prd: Prd) -> Self {
            Self {
                inner: MockTaskStore::new(prd),
                max_in_progress: Arc::new(Mutex::new(0)),
            }
        }

        fn sample(&self) {
            let count = self
                .inner
                .snapshot()
                .tasks
                .iter()
                .filter(|t| t.status == TaskStatus::InProgress)
                .count();
            let mut max = self.max_in_progress.lock().unwrap();
            if count > *max {
                *max = count;
            }
        }
    }

    impl TaskStore for CountingStore {
        fn fetch_next(&self) -> Option<Task> {
            self.inner.fetch_next()
        }

        fn transition(&mut self, id: u64, status: TaskStatus, note: Option<&str>) -> Result<()> {
            let result = self.inner.transition(id, status, note);
            self.sample();
            result
        }

        fn begin_iteration(&mut self) -> Result<u32> {
            self.inner.begin_iteration()
        }

        fn continuation(&self) -> Continuation {
            self.inner.continuation()
        }

        fn record_learning(&mut self, learning: &str) -> Result<()> {
            self.inner.record_learning(learning)
        }

        fn snapshot(&self) -> Prd {
            self.inner.snapshot()
        }
    }

    #[tokio::test]
    async fn test_at_most_one_in_progress() {
        // A rejecting first gate verdict forces a retry, so the run mixes
        // resets and completions while the wrapper samples every transition.
        let dir = tempdir().unwrap();
        let store = CountingStore::new(prd_with_tasks(3));
        let shared = store.inner.shared();
        let max_in_progress = Arc::clone(&store.max_in_progress);
        let mut runner = LoopRunner::new(
            Box::new(store),
            Box::new(MockAgent::always_ok()),
            Box::new(MockGate::script(vec![false])),
            Box::new(MockCommitter::new()),
            ProgressLog::new(dir.path().join("progress.txt")),
        )
        .with_sleep(Duration::ZERO);

        let outcome = runner.run().await.unwrap();
        assert_eq!(outcome, RunOutcome::AllPassed);

        assert_eq!(*max_in_progress.lock().unwrap(), 1);
        let prd = shared.lock().unwrap();
        assert!(prd.tasks.iter().all(|t| t.status == TaskStatus::Done));
        assert_eq!(prd.iteration, 4);
    }

    #[tokio::test]
    async fn test_no_commit_when_disabled() {
        let mut h = harness(prd_with_tasks(1), MockAgent::always_ok(), MockGate::always(true));
        h.runner = h.runner.with_commit_on_done(false);
        h.runner.run().await.unwrap();
        assert!(h.committer.commits().is_empty());
    }

    #[tokio::test]
    async fn test_gate_rejection_records_reason_for_next_prompt() {
        let gate = MockGate::script(vec![false, true]);
        let mut h = harness(prd_with_tasks(1), MockAgent::always_ok(), gate);
        h.runner.run().await.unwrap();

        let prd = h.prd.lock().unwrap();
        // After the final pass the error is cleared; learnings live in the
        // progress log. Verify the run took two iterations.
        assert_eq!(prd.iteration, 2);
        assert_eq!(prd.task_by_id(1).unwrap().status, TaskStatus::Done);
    }
}
