//! Task document loading.
//!
//! A task file holds either a single task object or an array of tasks.
//! Every task is validated on load and ids must be unique within the file.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use tandem_contracts::{
    error::{TandemError, TandemResult},
    task::Task,
};

#[derive(Deserialize)]
#[serde(untagged)]
enum TaskDocument {
    Many(Vec<Task>),
    One(Box<Task>),
}

/// Parse and validate a JSON task document.
pub fn parse_tasks(json: &str) -> TandemResult<Vec<Task>> {
    let document: TaskDocument = serde_json::from_str(json).map_err(|e| TandemError::ConfigError {
        reason: format!("failed to parse task document: {}", e),
    })?;
    let tasks = match document {
        TaskDocument::Many(tasks) => tasks,
        TaskDocument::One(task) => vec![*task],
    };

    let mut seen = BTreeSet::new();
    for task in &tasks {
        task.validate()?;
        if !seen.insert(task.task_id.as_str()) {
            return Err(TandemError::ConfigError {
                reason: format!("duplicate task_id '{}'", task.task_id),
            });
        }
    }

    debug!(task_count = tasks.len(), "task document loaded");
    Ok(tasks)
}

/// Read the file at `path` and parse it as a task document.
pub fn load_tasks(path: &Path) -> TandemResult<Vec<Task>> {
    let contents = std::fs::read_to_string(path).map_err(|e| TandemError::ConfigError {
        reason: format!("failed to read task file '{}': {}", path.display(), e),
    })?;
    parse_tasks(&contents)
}
