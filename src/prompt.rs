//! Prompt construction for agent invocations.
//!
//! Builds the task execution prompt from PRD context: project header,
//! progress summary, the current task with its success criteria and file
//! hints, and the most recent learnings.

use crate::prd::{Prd, Task};

/// How many trailing learnings to include in prompt context.
const RECENT_LEARNINGS: usize = 5;

/// Build the execution prompt for the next eligible task.
///
/// Returns `None` when no task is eligible.
#[must_use]
pub fn task_prompt(prd: &Prd) -> Option<String> {
    let task = prd.next_task()?;
    let summary = prd.progress_summary();

    let mut prompt = format!(
        "## Project: {name}\n\n{description}\n\n## Progress\n\
         - Iteration: {iteration}\n\
         - Tasks: {done}/{total} completed ({percent}%)\n\
         - Status: {status}\n\n## Current Task\n",
        name = prd.project_name,
        description = prd.description,
        iteration = summary.iteration,
        done = summary.done,
        total = summary.total,
        percent = summary.progress_percent,
        status = if prd.passes {
            "ALL TASKS COMPLETE"
        } else {
            "In Progress"
        },
    );

    prompt.push_str(&format!(
        "\n### Task #{id}: {description}\n\n\
         **Success Criteria:** {criteria}\n\n\
         **Files to Modify:** {files}\n\n\
         **Attempts:** {attempts}\n",
        id = task.id,
        description = task.description,
        criteria = or_unspecified(&task.success_criteria),
        files = if task.files_to_modify.is_empty() {
            "Not specified".to_string()
        } else {
            task.files_to_modify.join(", ")
        },
        attempts = task.attempts,
    ));

    if !task.last_error.is_empty() {
        prompt.push_str(&format!("\n**Previous Error:** {}\n", task.last_error));
    }

    if !prd.learnings.is_empty() {
        prompt.push_str("\n## Recent Learnings\n");
        let start = prd.learnings.len().saturating_sub(RECENT_LEARNINGS);
        for learning in &prd.learnings[start..] {
            prompt.push_str(&format!("- {learning}\n"));
        }
    }

    Some(prompt)
}

/// Build a consensus decision prompt for a specific task.
#[must_use]
pub fn consensus_prompt(prd: &Prd, task: &Task) -> String {
    let mut prompt = format!(
        "## Decision Request\n\n\
         **Project:** {name}\n\
         **Task #{id}:** {description}\n\n\
         **Success Criteria:**\n{criteria}\n\n\
         **Files to Consider:**\n{files}\n\n\
         **Previous Attempts:** {attempts}\n",
        name = prd.project_name,
        id = task.id,
        description = task.description,
        criteria = or_unspecified(&task.success_criteria),
        files = if task.files_to_modify.is_empty() {
            "- To be determined based on task".to_string()
        } else {
            task.files_to_modify
                .iter()
                .map(|f| format!("- {f}"))
                .collect::<Vec<_>>()
                .join("\n")
        },
        attempts = task.attempts,
    );

    if !task.last_error.is_empty() {
        prompt.push_str(&format!(
            "\n**Previous Error (must be fixed):**\n```\n{}\n```\n",
            task.last_error
        ));
    }

    prompt.push_str(
        "\n**Question for Consensus:**\n\
         What is the best approach to complete this task? Consider:\n\
         1. What specific changes are needed?\n\
         2. What are potential risks or edge cases?\n\
         3. How can we ensure the success criteria are met?\n",
    );

    prompt
}

/// Wrap a prompt in the consensus frame applied to every fanned-out backend.
#[must_use]
pub fn consensus_frame(prompt: &str) -> String {
    format!(
        "You are one of several independent agents asked the same question.\n\
         Give your single best recommendation; it will be aggregated with\n\
         the others.\n\n{prompt}"
    )
}

fn or_unspecified(text: &str) -> &str {
    if text.is_empty() {
        "Not specified"
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prd::Task;

    fn sample_prd() -> Prd {
        Prd::new(
            "widget",
            "a widget factory",
            vec![
                Task::new(1, "build the widget")
                    .with_success_criteria("cargo test passes")
                    .with_files(vec!["src/widget.rs".to_string()]),
                Task::new(2, "ship the widget"),
            ],
        )
    }

    #[test]
    fn test_task_prompt_includes_task_context() {
        let prd = sample_prd();
        let prompt = task_prompt(&prd).unwrap();
        assert!(prompt.contains("## Project: widget"));
        assert!(prompt.contains("Task #1: build the widget"));
        assert!(prompt.contains("cargo test passes"));
        assert!(prompt.contains("src/widget.rs"));
        assert!(prompt.contains("**Attempts:** 0"));
    }

    #[test]
    fn test_task_prompt_carries_previous_error() {
        let mut prd = sample_prd();
        prd.reset_task(1, "gate rejected: 2 tests failing");
        let prompt = task_prompt(&prd).unwrap();
        assert!(prompt.contains("**Previous Error:** gate rejected: 2 tests failing"));
    }

    #[test]
    fn test_task_prompt_none_when_exhausted() {
        let mut prd = sample_prd();
        prd.mark_done(1, "");
        prd.mark_done(2, "");
        assert!(task_prompt(&prd).is_none());
    }

    #[test]
    fn test_task_prompt_caps_learnings() {
        let mut prd = sample_prd();
        for i in 0..8 {
            prd.add_learning(&format!("learning {i}"));
        }
        let prompt = task_prompt(&prd).unwrap();
        assert!(!prompt.contains("learning 2"));
        assert!(prompt.contains("learning 3"));
        assert!(prompt.contains("learning 7"));
    }

    #[test]
    fn test_consensus_prompt_shape() {
        let prd = sample_prd();
        let task = prd.task_by_id(1).unwrap();
        let prompt = consensus_prompt(&prd, task);
        assert!(prompt.contains("Decision Request"));
        assert!(prompt.contains("Question for Consensus"));
        assert!(prompt.contains("- src/widget.rs"));
    }

    #[test]
    fn test_consensus_frame_wraps_prompt() {
        let framed = consensus_frame("inner question");
        assert!(framed.contains("independent agents"));
        assert!(framed.ends_with("inner question"));
    }
}
