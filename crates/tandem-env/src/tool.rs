//! Tool and assertion definitions supplied by a domain.
//!
//! A `Tool` couples an action name with its JSON Schema parameter document
//! and the handler that runs it against the database. Handlers report
//! domain failures as `ToolError`; the toolkit turns those into error tool
//! messages, they never abort a run.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// A domain-level failure inside a tool handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("{what} not found")]
    NotFound { what: String },

    #[error("invalid arguments: {reason}")]
    InvalidArguments { reason: String },

    /// The request is well-formed but the domain refuses it.
    #[error("{reason}")]
    Rejected { reason: String },

    #[error("unknown tool '{name}'")]
    UnknownTool { name: String },
}

impl ToolError {
    pub fn not_found(what: impl Into<String>) -> Self {
        ToolError::NotFound { what: what.into() }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        ToolError::Rejected {
            reason: reason.into(),
        }
    }

    /// The payload carried by the error tool message.
    pub fn to_content(&self) -> Value {
        json!({ "error": self.to_string() })
    }
}

/// What a successful call asks the orchestrator to do next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolSignal {
    /// Keep the caller's turn.
    #[default]
    Continue,
    /// End the caller's turn; the other participant speaks next.
    Handoff,
    /// The task is complete; end the run.
    Done,
}

/// A handler's successful result.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolReply {
    pub content: Value,
    pub signal: ToolSignal,
}

impl ToolReply {
    pub fn ok(content: Value) -> Self {
        Self {
            content,
            signal: ToolSignal::Continue,
        }
    }

    pub fn handoff(content: Value) -> Self {
        Self {
            content,
            signal: ToolSignal::Handoff,
        }
    }

    pub fn done(content: Value) -> Self {
        Self {
            content,
            signal: ToolSignal::Done,
        }
    }
}

/// Executes one action against a mutable database.
pub type ToolHandler<D> = Arc<dyn Fn(&mut D, &Value) -> Result<ToolReply, ToolError> + Send + Sync>;

/// A boolean predicate over a database.
pub type AssertionFn<D> = Arc<dyn Fn(&D, &Value) -> Result<bool, ToolError> + Send + Sync>;

/// A named, schema-described action.
pub struct Tool<D> {
    pub name: String,
    pub description: String,
    /// JSON Schema for the argument object.
    pub parameters: Value,
    pub handler: ToolHandler<D>,
}

impl<D> Tool<D> {
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(&mut D, &Value) -> Result<ToolReply, ToolError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler: Arc::new(handler),
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
        }
    }
}

impl<D> Clone for Tool<D> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

/// A named predicate usable in a task's `env_assertions`.
pub struct Assertion<D> {
    pub name: String,
    pub description: String,
    pub check: AssertionFn<D>,
}

impl<D> Assertion<D> {
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, check: F) -> Self
    where
        F: Fn(&D, &Value) -> Result<bool, ToolError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            check: Arc::new(check),
        }
    }
}

/// The participant-facing description of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Read a required string argument.
pub fn str_arg<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments {
            reason: format!("'{key}' must be a string"),
        })
}

/// Read a required numeric argument.
pub fn f64_arg(args: &Value, key: &str) -> Result<f64, ToolError> {
    args.get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| ToolError::InvalidArguments {
            reason: format!("'{key}' must be a number"),
        })
}
