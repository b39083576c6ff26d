//! # tandem-core
//!
//! The dual-control simulation runtime.
//!
//! This crate provides:
//! - The `Participant` and `TraceWriter` traits
//! - Protocol rules for drafts and complete histories
//! - The `Orchestrator` state machine that sequences agent, user and
//!   environment, enforces the protocol and the step/error budgets
//! - `RunConfig` (TOML), task loading (JSON) and the explicit `Registry`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tandem_core::{Orchestrator, config::RunConfig};
//!
//! let mut orchestrator = Orchestrator::new(domain, agent, user, RunConfig::default());
//! let run = orchestrator.run(&task);
//! ```

pub mod config;
pub mod orchestrator;
pub mod protocol;
pub mod registry;
pub mod tasks;
pub mod traits;

pub use orchestrator::{Orchestrator, Phase};
pub use registry::Registry;

// ── Tests ────────────────────────────────────────────────────────────────────
