//! Run-level results and trace records.
//!
//! `SimulationRun` is the sealed trajectory the orchestrator returns once a
//! run terminates. `TraceRecord` is what gets written to the trace log, one
//! per appended message.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    message::{Message, Role},
    participant::{ParticipantId, RunId},
    reward::RewardResult,
};

/// Why a run ended.
///
/// The serialized strings are stable and consumed by downstream tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The environment signalled task completion.
    Done,
    /// The step budget ran out.
    MaxSteps,
    /// The protocol-error budget ran out.
    MaxErrors,
    /// The agent sent its stop signal.
    AgentStop,
    /// The user sent a stop signal.
    UserStop,
    /// Setup failed or an internal invariant broke.
    FatalError,
}

impl TerminationReason {
    pub const ALL: [TerminationReason; 6] = [
        TerminationReason::Done,
        TerminationReason::MaxSteps,
        TerminationReason::MaxErrors,
        TerminationReason::AgentStop,
        TerminationReason::UserStop,
        TerminationReason::FatalError,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TerminationReason::Done => "done",
            TerminationReason::MaxSteps => "max_steps",
            TerminationReason::MaxErrors => "max_errors",
            TerminationReason::AgentStop => "agent_stop",
            TerminationReason::UserStop => "user_stop",
            TerminationReason::FatalError => "fatal_error",
        }
    }

    /// True when a participant or the environment ended the conversation,
    /// as opposed to a budget or a failure.
    pub fn is_natural(self) -> bool {
        matches!(
            self,
            TerminationReason::Done | TerminationReason::AgentStop | TerminationReason::UserStop
        )
    }

    /// The stop reason for `role`.
    pub fn stop_by(role: Role) -> Self {
        match role {
            Role::Agent => TerminationReason::AgentStop,
            Role::User => TerminationReason::UserStop,
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A protocol violation recorded against the run's error budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// The step during which the violation happened.
    pub step: u64,
    pub role: Role,
    pub reason: String,
}

/// The sealed trajectory of one run.
///
/// Built by the orchestrator turn by turn and handed to the evaluator
/// read-only. `reward` is filled in after evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationRun {
    pub run_id: RunId,
    pub task_id: String,
    /// Zero-based trial index for repeated runs of one task.
    pub trial: u32,
    pub seed: u64,
    pub domain: String,
    pub agent_id: ParticipantId,
    /// Absent in solo mode.
    pub user_id: Option<ParticipantId>,
    pub solo: bool,
    /// Full ordered history, seed messages included.
    pub messages: Vec<Message>,
    pub termination_reason: TerminationReason,
    /// Canonical snapshot of the database at termination.
    pub final_db: Option<serde_json::Value>,
    pub final_db_hash: Option<String>,
    pub steps: u64,
    pub errors: u64,
    pub violations: Vec<Violation>,
    /// Terminal hash of the run's trace chain, if a trace was kept.
    pub trace_hash: Option<String>,
    /// The setup or fatal error that ended the run, if any.
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    #[serde(default)]
    pub reward: Option<RewardResult>,
}

impl SimulationRun {
    /// Tool calls issued by `role`, in issue order.
    pub fn tool_calls_by(&self, role: Role) -> impl Iterator<Item = &crate::message::ToolCall> {
        self.messages
            .iter()
            .flat_map(|m| m.tool_calls())
            .filter(move |c| c.requestor == role)
    }

    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }
}

/// One immutable trace entry, written for every message appended to history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// The orchestrator step that produced the message (0 for seed messages).
    pub step: u64,
    pub message: Message,
    /// Wall-clock time the record was created (UTC).
    pub timestamp: DateTime<Utc>,
}
