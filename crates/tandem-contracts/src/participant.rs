//! Participant identity and private state types.
//!
//! tandem does not prescribe how an agent or user decides what to say. These
//! types only describe what the orchestrator carries on a participant's
//! behalf between turns.

use serde::{Deserialize, Serialize};

/// Stable, human-readable identifier for a participant implementation.
///
/// Recorded in run metadata. Example: ParticipantId("scripted-agent")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// Unique identifier for a single simulation run (one task × one trial).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub uuid::Uuid);

impl RunId {
    /// Create a new, unique run ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a participant carries between its own turns.
///
/// The orchestrator treats this as an opaque value it passes into
/// `Participant::next_message()` and receives back from it. It never edits
/// the contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantState {
    /// Which participant owns this state.
    pub participant_id: ParticipantId,
    /// Arbitrary participant-internal state. The runtime never inspects this.
    pub context: serde_json::Value,
    /// Number of drafts this participant has produced so far.
    pub turns: u64,
}

impl ParticipantState {
    pub fn new(participant_id: ParticipantId, context: serde_json::Value) -> Self {
        Self {
            participant_id,
            context,
            turns: 0,
        }
    }

    /// The same state, one turn later.
    pub fn advanced(self) -> Self {
        Self {
            turns: self.turns + 1,
            ..self
        }
    }
}
