//! # tandem-trace
//!
//! Append-only, SHA-256 hash-chained trajectory traces.
//!
//! Every message the orchestrator appends to a run's history is wrapped in a
//! `TraceEvent` linked to its predecessor by hash. Editing any recorded
//! message breaks the chain, which `verify_chain` detects. The terminal hash
//! of a sealed chain is stored on the run as a compact commitment to its
//! whole history.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tandem_trace::InMemoryTraceWriter;
//!
//! let trace = Arc::new(InMemoryTraceWriter::new());
//! let mut orchestrator = Orchestrator::new(domain, agent, user, config).with_trace(trace.clone());
//! let run = orchestrator.run(&task);
//! assert!(trace.verify_integrity(&run.run_id)?);
//! ```

pub mod chain;
pub mod event;
pub mod memory;

pub use chain::{hash_event, verify_chain};
pub use event::{TraceEvent, TraceLog};
pub use memory::InMemoryTraceWriter;

// ── Tests ────────────────────────────────────────────────────────────────────
