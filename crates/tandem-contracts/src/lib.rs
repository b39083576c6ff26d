//! # tandem-contracts
//!
//! Shared types for the tandem dual-control simulator: messages, tool calls,
//! participant state, task documents, run documents and reward documents.
//!
//! All crates in the workspace import from here. No simulation logic lives
//! in this crate, only data definitions, format checks and error types.

pub mod error;
pub mod message;
pub mod participant;
pub mod reward;
pub mod run;
pub mod task;
