//! In-memory implementation of `TraceWriter`.
//!
//! One writer can be shared by every run of a batch: each run id gets its own
//! chain. Writing to a sealed chain is refused.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::info;

use tandem_contracts::{
    error::{TandemError, TandemResult},
    participant::RunId,
    run::{TerminationReason, TraceRecord},
};
use tandem_core::traits::TraceWriter;

use crate::{
    chain::{hash_event, verify_chain},
    event::{TraceEvent, TraceLog},
};

// ── Internal mutable state ───────────────────────────────────────────────────

pub(crate) struct Chain {
    pub(crate) events: Vec<TraceEvent>,
    pub(crate) last_hash: String,
    pub(crate) reason: Option<TerminationReason>,
    pub(crate) sealed_at: Option<chrono::DateTime<Utc>>,
}

impl Chain {
    fn new() -> Self {
        Self {
            events: Vec::new(),
            last_hash: TraceEvent::GENESIS_HASH.to_string(),
            reason: None,
            sealed_at: None,
        }
    }
}

// ── Public writer ────────────────────────────────────────────────────────────

/// Hash-chained trace storage for any number of runs.
#[derive(Clone, Default)]
pub struct InMemoryTraceWriter {
    pub(crate) chains: Arc<Mutex<HashMap<RunId, Chain>>>,
}

impl InMemoryTraceWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> TandemResult<MutexGuard<'_, HashMap<RunId, Chain>>> {
        self.chains.lock().map_err(|e| TandemError::FatalError {
            reason: format!("trace state lock poisoned: {}", e),
        })
    }

    /// The trace of `run_id`, sealed or not. `None` if nothing was written.
    pub fn export_log(&self, run_id: &RunId) -> TandemResult<Option<TraceLog>> {
        let chains = self.lock()?;
        Ok(chains.get(run_id).map(|chain| TraceLog {
            run_id: *run_id,
            events: chain.events.clone(),
            termination_reason: chain.reason,
            sealed_at: chain.sealed_at,
            terminal_hash: chain.last_hash.clone(),
        }))
    }

    /// True when the stored chain of `run_id` is intact.
    pub fn verify_integrity(&self, run_id: &RunId) -> TandemResult<bool> {
        let chains = self.lock()?;
        Ok(chains.get(run_id).map_or(true, |chain| verify_chain(&chain.events)))
    }

    /// Number of runs with a chain, sealed or not.
    pub fn run_count(&self) -> TandemResult<usize> {
        Ok(self.lock()?.len())
    }
}

// ── TraceWriter impl ─────────────────────────────────────────────────────────

impl TraceWriter for InMemoryTraceWriter {
    fn write(&self, run_id: &RunId, record: &TraceRecord) -> TandemResult<()> {
        let mut chains = self.lock()?;
        let chain = chains.entry(*run_id).or_insert_with(Chain::new);
        if let Some(reason) = chain.reason {
            return Err(TandemError::FatalError {
                reason: format!("trace of run {} was already sealed with {reason}", run_id.0),
            });
        }

        let sequence = chain.events.len() as u64;
        let prev_hash = chain.last_hash.clone();
        let this_hash = hash_event(run_id, sequence, record, &prev_hash)?;

        chain.events.push(TraceEvent {
            sequence,
            run_id: *run_id,
            record: record.clone(),
            prev_hash,
            this_hash: this_hash.clone(),
        });
        chain.last_hash = this_hash;
        Ok(())
    }

    /// Seal the chain and return its terminal hash.
    ///
    /// Sealing a run that never wrote anything yields the genesis hash.
    fn seal(&self, run_id: &RunId, reason: TerminationReason) -> TandemResult<Option<String>> {
        let mut chains = self.lock()?;
        let chain = chains.entry(*run_id).or_insert_with(Chain::new);
        if chain.reason.is_some() {
            return Err(TandemError::FatalError {
                reason: format!("trace of run {} sealed twice", run_id.0),
            });
        }
        chain.reason = Some(reason);
        chain.sealed_at = Some(Utc::now());

        info!(
            run_id = %run_id.0,
            event_count = chain.events.len(),
            reason = %reason,
            terminal_hash = %chain.last_hash,
            "trace sealed"
        );
        Ok(Some(chain.last_hash.clone()))
    }
}
