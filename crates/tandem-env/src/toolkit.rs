//! Schema-validated toolkits.
//!
//! A `Toolkit` is one role's view of the environment: a statically built map
//! from action name to handler, each with a compiled JSON Schema validator,
//! bound to the environment's single database handle.
//!
//! Execution runs in two phases:
//!
//! 1. **Validation**: the action must exist and the arguments must satisfy
//!    its parameter schema. All schema violations are collected into one
//!    error message.
//! 2. **Execution**: the handler runs against the shared database.
//!
//! Every failure in either phase is a normal, error-flagged tool message.
//! Only a poisoned database lock escapes as `Err`.

use std::collections::BTreeMap;

use jsonschema::Validator;
use serde_json::{json, Value};
use tracing::{debug, warn};

use tandem_contracts::{
    error::{TandemError, TandemResult},
    message::{Role, ToolCall, ToolMessage},
};

use crate::{
    database::{Database, SharedDb},
    tool::{Tool, ToolDefinition, ToolError, ToolSignal},
};

/// The result of executing one tool call.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub message: ToolMessage,
    /// `Continue` for error results.
    pub signal: ToolSignal,
}

struct Entry<D> {
    tool: Tool<D>,
    validator: Validator,
}

/// One role's set of callable actions over the shared database.
pub struct Toolkit<D: Database> {
    role: Role,
    db: SharedDb<D>,
    tools: BTreeMap<String, Entry<D>>,
}

impl<D: Database> Toolkit<D> {
    /// Build a toolkit, compiling every parameter schema up front.
    ///
    /// Fails with `ConfigError` on an empty or duplicate action name and with
    /// `SchemaValidation` when a parameter schema does not compile.
    pub fn new(role: Role, tools: Vec<Tool<D>>, db: SharedDb<D>) -> TandemResult<Self> {
        let mut map = BTreeMap::new();
        for tool in tools {
            if tool.name.trim().is_empty() {
                return Err(TandemError::ConfigError {
                    reason: format!("{role} toolkit contains a tool with an empty name"),
                });
            }
            if map.contains_key(&tool.name) {
                return Err(TandemError::ConfigError {
                    reason: format!("{role} toolkit declares tool '{}' twice", tool.name),
                });
            }
            let validator = jsonschema::validator_for(&tool.parameters).map_err(|e| {
                TandemError::SchemaValidation {
                    reason: format!("parameter schema of tool '{}' is invalid: {e}", tool.name),
                }
            })?;
            map.insert(tool.name.clone(), Entry { tool, validator });
        }

        debug!(role = %role, tool_count = map.len(), "toolkit built");
        Ok(Self { role, db, tools: map })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn db(&self) -> &SharedDb<D> {
        &self.db
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Participant-facing definitions, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|e| e.tool.definition()).collect()
    }

    /// Check that `name` exists and `arguments` satisfy its schema.
    pub fn validate_arguments(&self, name: &str, arguments: &Value) -> Result<(), ToolError> {
        let entry = self.tools.get(name).ok_or_else(|| ToolError::UnknownTool {
            name: name.to_string(),
        })?;

        let violations: Vec<String> = entry
            .validator
            .iter_errors(arguments)
            .map(|error| format!("at '{}': {}", error.instance_path, error))
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ToolError::InvalidArguments {
                reason: violations.join("; "),
            })
        }
    }

    /// Validate and run one call against the shared database.
    pub fn execute(&self, call: &ToolCall) -> TandemResult<ToolOutcome> {
        // A missing argument object is treated as an empty one.
        let arguments = if call.arguments.is_null() {
            json!({})
        } else {
            call.arguments.clone()
        };

        let result = match self.validate_arguments(&call.name, &arguments) {
            Ok(()) => {
                let handler = &self.tools[&call.name].tool.handler;
                self.db.with_mut(|db| handler(db, &arguments))?
            }
            Err(e) => Err(e),
        };

        let (content, error, signal) = match result {
            Ok(reply) => {
                debug!(
                    role = %self.role,
                    tool = %call.name,
                    call_id = %call.id,
                    signal = ?reply.signal,
                    "tool call succeeded"
                );
                (reply.content, false, reply.signal)
            }
            Err(e) => {
                warn!(
                    role = %self.role,
                    tool = %call.name,
                    call_id = %call.id,
                    reason = %e,
                    "tool call returned an error"
                );
                (e.to_content(), true, ToolSignal::Continue)
            }
        };

        Ok(ToolOutcome {
            message: ToolMessage {
                id: call.id.clone(),
                requestor: self.role,
                content,
                error,
                turn_idx: 0,
            },
            signal,
        })
    }
}
