//! Prompt construction for the three gateway calls

use llm_core::ChatMessage;

use crate::tasks::{HistoryEntry, Task};

const PLANNER_SYSTEM: &str = "You are a task planning AI. Always respond with valid JSON arrays.";
const EXECUTOR_SYSTEM: &str = "You are a task execution AI. Provide clear, concise results.";

const TASK_SHAPE: &str = r#"Each element must be an object with:
- "id": a short unique identifier such as "task1"
- "description": a clear, actionable description of the task"#;

/// Messages asking the model to break an objective into first tasks
pub fn decompose(objective: &str) -> Vec<ChatMessage> {
    let prompt = format!(
        r#"You are an autonomous AI agent. Your objective is: "{objective}".

Break this objective down into 3-5 concise, actionable subtasks.

Respond with a JSON array only. {TASK_SHAPE}

Example:
[{{"id": "task1", "description": "Research the topic"}}, {{"id": "task2", "description": "Summarize findings"}}]

Do not add explanations, markdown or code fences."#
    );

    vec![ChatMessage::system(PLANNER_SYSTEM), ChatMessage::user(prompt)]
}

/// Messages asking the model to simulate one task
pub fn execute(objective: &str, task: &Task, history: &[HistoryEntry]) -> Vec<ChatMessage> {
    let previous = format_history(history, "No previous tasks.");
    let prompt = format!(
        r#"You are an autonomous AI agent.
Current Objective: "{objective}"
Task to Execute: "{task}"
Previous Tasks and Results:
{previous}

Simulate the execution of the "Task to Execute" and report a concise, factual result or a brief summary of what was done. Do not propose next tasks or future steps; report only the outcome of this task."#,
        task = task.description,
    );

    vec![ChatMessage::system(EXECUTOR_SYSTEM), ChatMessage::user(prompt)]
}

/// Messages asking for the next queue given what has been done so far
pub fn reprioritize(objective: &str, history: &[HistoryEntry], pending: &[Task]) -> Vec<ChatMessage> {
    let completed = format_history(history, "No tasks completed yet.");
    let remaining = format_pending(pending, "No remaining tasks.");
    let prompt = format!(
        r#"You are an autonomous AI agent.
Current Objective: "{objective}"
Completed Tasks and Results:
{completed}
Remaining Tasks (not yet completed):
{remaining}

Evaluate progress toward the objective given the completed and remaining tasks.
Produce an updated, prioritized list of 3-5 subtasks that best advance the objective.
If the objective is complete, respond with an empty array: []

Respond with a JSON array only. {TASK_SHAPE}
Ids must be unique, even when a new task resembles an old one.

Example:
[{{"id": "task_new_1", "description": "Analyze market trends"}}, {{"id": "task_new_2", "description": "Draft report"}}]"#
    );

    vec![ChatMessage::system(PLANNER_SYSTEM), ChatMessage::user(prompt)]
}

fn format_history(history: &[HistoryEntry], empty: &str) -> String {
    if history.is_empty() {
        return empty.to_string();
    }
    history
        .iter()
        .map(|entry| format!("Task: {}\nResult: {}", entry.task_description, entry.result))
        .collect::<Vec<_>>()
        .join("\n---\n")
}

fn format_pending(pending: &[Task], empty: &str) -> String {
    if pending.is_empty() {
        return empty.to_string();
    }
    pending
        .iter()
        .map(|task| format!("Task ID: {}, Description: {}", task.id, task.description))
        .collect::<Vec<_>>()
        .join("\n")
}
