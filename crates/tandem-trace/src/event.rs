//! Trace event and log types.
//!
//! `TraceEvent` is one link of a run's hash chain: a `TraceRecord` (one
//! appended message) plus its position and the hashes tying it to its
//! predecessor. `TraceLog` is the sealed chain of one run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tandem_contracts::{
    participant::RunId,
    run::{TerminationReason, TraceRecord},
};

/// A single entry in the hash chain of one run.
///
/// Editing any field, including the embedded message, invalidates
/// `this_hash` and every later `prev_hash`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Position in the chain, starting at 0.
    pub sequence: u64,
    pub run_id: RunId,
    pub record: TraceRecord,
    /// `this_hash` of the previous event, or `GENESIS_HASH` for the first.
    pub prev_hash: String,
    /// Computed by `hash_event()`.
    pub this_hash: String,
}

impl TraceEvent {
    /// The `prev_hash` of the first event of every chain: 64 hex zeros.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";
}

/// The trace of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceLog {
    pub run_id: RunId,
    pub events: Vec<TraceEvent>,
    /// Why the run ended; `None` while the run is still in flight.
    pub termination_reason: Option<TerminationReason>,
    pub sealed_at: Option<DateTime<Utc>>,
    /// `this_hash` of the last event, or `GENESIS_HASH` for an empty chain.
    pub terminal_hash: String,
}

impl TraceLog {
    pub fn is_sealed(&self) -> bool {
        self.termination_reason.is_some()
    }

    /// Recorded messages in append order.
    pub fn messages(&self) -> impl Iterator<Item = &tandem_contracts::message::Message> {
        self.events.iter().map(|e| &e.record.message)
    }
}
