//! Core trait definitions for the simulation loop.
//!
//! - `Participant`: an agent or user policy. Untrusted: may be scripted,
//!   backed by a language model, or a human at a terminal.
//! - `TraceWriter`: trusted sink receiving every appended message.
//!
//! The orchestrator owns the conversation and the environment. Participants
//! only ever see the history and their own private state.

use tandem_contracts::{
    error::TandemResult,
    message::{Draft, Message},
    participant::{ParticipantId, ParticipantState, RunId},
    run::{TerminationReason, TraceRecord},
    task::Task,
};
use tandem_env::ToolDefinition;

/// Ends the conversation when sent by either participant.
pub const STOP: &str = "###STOP###";
/// The user asks to be handed to a human representative.
pub const TRANSFER: &str = "###TRANSFER###";
/// The user's scenario does not cover what the agent asked.
pub const OUT_OF_SCOPE: &str = "###OUT-OF-SCOPE###";

pub const AGENT_STOP_TOKENS: &[&str] = &[STOP];
pub const USER_STOP_TOKENS: &[&str] = &[STOP, TRANSFER, OUT_OF_SCOPE];

/// An agent or user policy.
///
/// Implementations must not keep per-run state in `self`: a participant is
/// shared across concurrent runs, and everything it needs between turns goes
/// into the `ParticipantState` it returns.
pub trait Participant: Send + Sync {
    /// Identifier recorded in run metadata.
    fn id(&self) -> ParticipantId;

    /// Build the private state for a fresh run of `task`.
    ///
    /// `tools` are the definitions of the toolkit this participant's calls
    /// are routed to; empty when it has none. `seed` is the run's seed
    /// (`config.seed + trial`); a stochastic policy draws from it.
    fn initial_state(
        &self,
        task: &Task,
        tools: &[ToolDefinition],
        seed: u64,
    ) -> TandemResult<ParticipantState>;

    /// Produce the next draft given the shared history.
    ///
    /// Returns the draft together with the state to pass in next time. An
    /// `Err` is unrecoverable and ends the run with `fatal_error`.
    fn next_message(
        &self,
        history: &[Message],
        state: ParticipantState,
    ) -> TandemResult<(Draft, ParticipantState)>;

    /// Tokens whose presence in a text draft ends the conversation.
    fn stop_tokens(&self) -> &'static [&'static str] {
        AGENT_STOP_TOKENS
    }

    /// True if `draft` is this participant's stop signal.
    ///
    /// Only text drafts can stop; a draft carrying tool calls never does.
    fn is_stop(&self, draft: &Draft) -> bool {
        if draft.is_tool_call() {
            return false;
        }
        draft
            .content
            .as_deref()
            .is_some_and(|text| self.stop_tokens().iter().any(|token| text.contains(token)))
    }
}

/// The append-only trace of a run.
///
/// A failed write is fatal: the run ends with `fatal_error`.
pub trait TraceWriter: Send + Sync {
    /// Append one record to the trace of `run_id`.
    fn write(&self, run_id: &RunId, record: &TraceRecord) -> TandemResult<()>;

    /// Close the trace of `run_id`.
    ///
    /// Returns the terminal hash when the implementation chains records.
    fn seal(&self, run_id: &RunId, reason: TerminationReason) -> TandemResult<Option<String>>;
}
