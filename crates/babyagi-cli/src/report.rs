//! Markdown report of an agent session

use std::fmt::Write as _;

use chrono::{DateTime, Local, TimeZone};

use crate::agent::AgentSnapshot;

/// Default file name for an export made at `now`
pub fn default_file_name<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("babyagi-report-{}.md", now.format("%Y%m%d-%H%M%S"))
}

/// Render the snapshot as Markdown
pub fn render(snapshot: &AgentSnapshot, generated_at: DateTime<Local>) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "# BabyAGI Report");
    let _ = writeln!(out);
    let _ = writeln!(out, "_Generated {}_", generated_at.format("%Y-%m-%d %H:%M:%S"));
    let _ = writeln!(out);

    let _ = writeln!(out, "## Objective");
    let _ = writeln!(out);
    if snapshot.objective.is_empty() {
        let _ = writeln!(out, "_No objective set._");
    } else {
        let _ = writeln!(out, "{}", snapshot.objective);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "**Status:** {}", snapshot.status);
    if let Some(err) = &snapshot.last_error {
        let _ = writeln!(out);
        let _ = writeln!(out, "**Last error:** {}", err);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "## Current Task");
    let _ = writeln!(out);
    match snapshot.current_task() {
        Some(task) => {
            let _ = writeln!(out, "{} (`{}`)", task.description, task.id);
        }
        None => {
            let _ = writeln!(out, "_None._");
        }
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "## Pending Tasks ({})", snapshot.pending.len());
    let _ = writeln!(out);
    if snapshot.pending.is_empty() {
        let _ = writeln!(out, "_Queue is empty._");
    }
    for (i, task) in snapshot.pending.iter().enumerate() {
        let _ = writeln!(out, "{}. {} (`{}`)", i + 1, task.description, task.id);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "## Completed Tasks ({})", snapshot.history.len());
    if snapshot.history.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "_No tasks completed yet._");
    }
    for entry in &snapshot.history {
        let _ = writeln!(out);
        let _ = writeln!(out, "### {}", entry.task_description);
        let _ = writeln!(out);
        let _ = writeln!(out, "_{}_", entry.timestamp);
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", entry.result.trim_end());
    }

    out
}
