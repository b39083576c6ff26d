//! Runtime error types for the tandem simulation pipeline.
//!
//! All fallible operations in the workspace return `TandemResult<T>`.
//! Only `SetupError`, `FatalError` and `ParticipantFailed` ever end a run
//! early; the remaining variants are turned into protocol messages by the
//! orchestrator so participants can self-correct.

use thiserror::Error;

/// The unified error type for the tandem runtime.
#[derive(Debug, Error)]
pub enum TandemError {
    /// A participant produced a message that breaks the interaction protocol.
    ///
    /// Recoverable: counted against the run's error budget.
    #[error("protocol violation: {reason}")]
    ProtocolViolation { reason: String },

    /// A domain handler failed (e.g. the referenced record does not exist).
    #[error("tool '{tool}' failed: {reason}")]
    ToolExecution { tool: String, reason: String },

    /// The environment could not reach a valid initial state.
    #[error("setup error: {reason}")]
    SetupError { reason: String },

    /// An internal invariant broke. The run aborts regardless of budget.
    #[error("fatal error: {reason}")]
    FatalError { reason: String },

    /// A participant could not produce its next message at all.
    #[error("participant '{participant}' failed: {reason}")]
    ParticipantFailed { participant: String, reason: String },

    /// The orchestrator was driven from a state that does not allow the call.
    #[error("state machine error: {reason}")]
    StateMachineError { reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    /// A JSON Schema document could not be compiled or applied.
    #[error("schema validation error: {reason}")]
    SchemaValidation { reason: String },
}

/// Convenience alias used throughout the tandem crates.
pub type TandemResult<T> = Result<T, TandemError>;
