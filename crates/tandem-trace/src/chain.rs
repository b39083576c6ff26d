//! Hash-chain primitives.
//!
//! Hash input layout (bytes, in order):
//!   1. run id as its 16 raw UUID bytes
//!   2. sequence as 8-byte little-endian
//!   3. prev_hash as UTF-8 bytes (64 ASCII hex chars)
//!   4. compact JSON of the trace record

use sha2::{Digest, Sha256};

use tandem_contracts::{
    error::{TandemError, TandemResult},
    participant::RunId,
    run::TraceRecord,
};

use crate::event::TraceEvent;

/// SHA-256 of one event's content, as lowercase hex.
pub fn hash_event(
    run_id: &RunId,
    sequence: u64,
    record: &TraceRecord,
    prev_hash: &str,
) -> TandemResult<String> {
    let record_json = serde_json::to_vec(record).map_err(|e| TandemError::FatalError {
        reason: format!("trace record is not serializable: {}", e),
    })?;

    let mut hasher = Sha256::new();
    hasher.update(run_id.0.as_bytes());
    hasher.update(sequence.to_le_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(&record_json);
    Ok(hex::encode(hasher.finalize()))
}

/// True when every event links to its predecessor, carries its expected
/// sequence number and stores the hash of its own content.
///
/// An empty chain is valid.
pub fn verify_chain(events: &[TraceEvent]) -> bool {
    let mut expected_prev = TraceEvent::GENESIS_HASH.to_string();

    for (idx, event) in events.iter().enumerate() {
        if event.prev_hash != expected_prev || event.sequence != idx as u64 {
            return false;
        }
        match hash_event(&event.run_id, event.sequence, &event.record, &event.prev_hash) {
            Ok(recomputed) if recomputed == event.this_hash => {}
            _ => return false,
        }
        expected_prev = event.this_hash.clone();
    }

    true
}
