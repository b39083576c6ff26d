//! # tandem-env
//!
//! The simulated world a run takes place in.
//!
//! This crate provides:
//! - `Domain`, the trait a concrete world implements (database type, agent
//!   tools, user tools, assertions)
//! - `Toolkit`, one role's schema-validated view of the database
//! - `Environment`, which binds both toolkits to a single database instance
//!   and supports reset, deterministic state reconstruction, hashing and diff
//! - Canonical JSON hashing shared with the evaluator
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tandem_env::{Environment, domain::Domain};
//!
//! let env = Environment::from_initial_state(domain, &task.initial_state, seed)?;
//! let outcome = env.execute(Role::Agent, &call)?;
//! ```

pub mod canonical;
pub mod database;
pub mod domain;
pub mod environment;
pub mod tool;
pub mod toolkit;

pub use domain::Domain;
pub use environment::{DomainRef, Environment};
pub use tool::{Assertion, Tool, ToolDefinition, ToolError, ToolReply, ToolSignal};
pub use toolkit::{ToolOutcome, Toolkit};

#[cfg(test)]
mod tests {
    use serde_json::json;

    use tandem_contracts::{
        error::TandemError,
        message::{Role, ToolCall},
    };

    use crate::{
        database::SharedDb,
        tool::{Tool, ToolReply, ToolSignal},
        toolkit::Toolkit,
    };

    fn noop(name: &str, schema: serde_json::Value) -> Tool<Vec<String>> {
        Tool::new(name, "test tool", schema, |db: &mut Vec<String>, _args: &serde_json::Value| {
            db.push("called".to_string());
            Ok(ToolReply::done(json!({ "len": db.len() })))
        })
    }

    #[test]
    fn test_toolkit_null_arguments_are_treated_as_empty_object() {
        let db = SharedDb::new(Vec::new());
        let kit = Toolkit::new(Role::Agent, vec![noop("finish", json!({ "type": "object" }))], db.clone()).unwrap();

        let outcome = kit
            .execute(&ToolCall::new("c1", "finish", serde_json::Value::Null))
            .unwrap();
        assert!(!outcome.message.error);
        assert_eq!(outcome.signal, ToolSignal::Done);
        assert_eq!(outcome.message.requestor, Role::Agent);
        assert_eq!(db.with(|d| d.len()).unwrap(), 1);
    }

    #[test]
    fn test_toolkit_error_result_never_carries_a_signal() {
        let db = SharedDb::new(Vec::new());
        let schema = json!({ "type": "object", "required": ["x"] });
        let kit = Toolkit::new(Role::User, vec![noop("finish", schema)], db.clone()).unwrap();

        let outcome = kit.execute(&ToolCall::new("c1", "finish", json!({}))).unwrap();
        assert!(outcome.message.error);
        assert_eq!(outcome.signal, ToolSignal::Continue);
        // Validation failed, so the handler never ran.
        assert!(db.with(|d| d.is_empty()).unwrap());
    }

    #[test]
    fn test_toolkit_collects_every_schema_violation() {
        let db = SharedDb::new(Vec::new());
        let schema = json!({
            "type": "object",
            "properties": { "a": { "type": "string" }, "b": { "type": "integer" } },
            "required": ["a", "b"]
        });
        let kit = Toolkit::new(Role::Agent, vec![noop("t", schema)], db).unwrap();

        let err = kit.validate_arguments("t", &json!({ "a": 1, "b": "x" })).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("/a"), "{text}");
        assert!(text.contains("/b"), "{text}");
    }

    #[test]
    fn test_toolkit_rejects_uncompilable_schema() {
        let db = SharedDb::new(Vec::new());
        let result = Toolkit::new(Role::Agent, vec![noop("t", json!({ "type": 12 }))], db);
        assert!(matches!(result, Err(TandemError::SchemaValidation { .. })));
    }

    #[test]
    fn test_toolkit_rejects_empty_tool_name() {
        let db = SharedDb::new(Vec::new());
        let result = Toolkit::new(Role::Agent, vec![noop("  ", json!({ "type": "object" }))], db);
        assert!(matches!(result, Err(TandemError::ConfigError { .. })));
    }

    #[test]
    fn test_shared_db_handles_see_each_other() {
        let a = SharedDb::new(vec!["x".to_string()]);
        let b = a.clone();
        b.with_mut(|d| d.push("y".to_string())).unwrap();
        assert_eq!(a.with(|d| d.clone()).unwrap(), vec!["x", "y"]);
        assert!(a.same_instance(&b));
        assert!(!a.same_instance(&SharedDb::new(Vec::new())));
    }
}
