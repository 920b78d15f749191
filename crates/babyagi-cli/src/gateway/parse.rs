//! Reading task lists out of free-form model output
//!
//! Models rarely answer with clean JSON. Accepted shapes:
//! - a bare array: `[{"id": "t1", "description": "..."}]`
//! - the same inside a markdown fence (```` ```json ```` or plain ```` ``` ````)
//! - an object wrapping the array under `tasks`, `subtasks` or `items`
//! - any of the above surrounded by prose

use std::collections::HashSet;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::tasks::Task;

const WRAPPER_KEYS: [&str; 3] = ["tasks", "subtasks", "items"];
const DESCRIPTION_KEYS: [&str; 3] = ["description", "task", "name"];
const ID_KEYS: [&str; 2] = ["id", "taskId"];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Failed to parse AI response as JSON. The model may not support JSON mode.")]
    NotJson,

    #[error("AI returned an object but no task array was found. Try a different model.")]
    NoTaskArray,

    #[error("AI response is not in expected format.")]
    UnexpectedShape,
}

/// Parse a task list, synthesizing `{placeholder}_{n}` ids where missing.
///
/// Records without a usable description are dropped, so the result may be
/// empty even when the model returned a non-empty array. Callers decide
/// whether that is acceptable.
pub fn parse_task_list(content: &str, placeholder: &str) -> Result<Vec<Task>, ParseError> {
    let value = extract_json(content).ok_or(ParseError::NotJson)?;
    let records = locate_task_array(value)?;
    Ok(normalize(records, placeholder))
}

/// Find the JSON document in `content`
fn extract_json(content: &str) -> Option<Value> {
    let content = content.trim();
    let body = extract_fenced(content).unwrap_or(content);

    if let Ok(value) = serde_json::from_str::<Value>(body) {
        if value.is_array() || value.is_object() {
            return Some(value);
        }
    }

    let mut fallback = None;
    for span in json_spans(body) {
        let Ok(value) = serde_json::from_str::<Value>(span) else {
            continue;
        };
        let task_shaped = match &value {
            Value::Array(items) => items.iter().any(Value::is_object),
            Value::Object(_) => true,
            _ => false,
        };
        if task_shaped {
            return Some(value);
        }
        if fallback.is_none() && value.is_array() {
            fallback = Some(value);
        }
    }
    fallback
}

/// Contents of the first markdown code fence, if any
fn extract_fenced(content: &str) -> Option<&str> {
    let start = content.find("```")?;
    let after_ticks = &content[start + 3..];
    // Skip the language tag line (```json, ```JSON, or nothing)
    let body_start = match after_ticks.find('\n') {
        Some(newline) if !after_ticks[..newline].contains('[') && !after_ticks[..newline].contains('{') => {
            newline + 1
        }
        _ => after_ticks
            .char_indices()
            .find(|(_, c)| !c.is_ascii_alphanumeric())
            .map(|(i, _)| i)
            .unwrap_or(after_ticks.len()),
    };
    let body = &after_ticks[body_start..];
    let end = body.find("```")?;
    Some(body[..end].trim())
}

/// Balanced `[...]` / `{...}` spans in order of their opening bracket
fn json_spans(content: &str) -> Vec<&str> {
    let bytes = content.as_bytes();
    let mut spans = Vec::new();

    for (start, &open) in bytes.iter().enumerate() {
        if open != b'[' && open != b'{' {
            continue;
        }
        if let Some(end) = matching_close(bytes, start) {
            spans.push(&content[start..=end]);
        }
    }

    spans
}

fn matching_close(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' | b'{' => depth += 1,
            b']' | b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

fn locate_task_array(value: Value) -> Result<Vec<Value>, ParseError> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => WRAPPER_KEYS
            .iter()
            .find_map(|key| match map.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .ok_or(ParseError::NoTaskArray),
        _ => Err(ParseError::UnexpectedShape),
    }
}

fn normalize(records: Vec<Value>, placeholder: &str) -> Vec<Task> {
    let mut seen = HashSet::new();
    let mut tasks = Vec::new();

    for record in records {
        let Value::Object(map) = record else {
            continue;
        };
        let Some(description) = first_text(&map, &DESCRIPTION_KEYS) else {
            continue;
        };

        let base_id = first_text(&map, &ID_KEYS)
            .unwrap_or_else(|| format!("{}_{}", placeholder, tasks.len() + 1));
        let mut id = base_id.clone();
        let mut suffix = 2;
        while !seen.insert(id.clone()) {
            id = format!("{}_{}", base_id, suffix);
            suffix += 1;
        }

        tasks.push(Task { id, description });
    }

    tasks
}

/// First non-blank string (or number) among `keys`
fn first_text(map: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match map.get(*key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
