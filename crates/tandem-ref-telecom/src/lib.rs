//! # tandem-ref-telecom
//!
//! Telecom reference domain for the tandem simulation runtime.
//!
//! A tech-support world where the customer's phone is part of the shared
//! state: the agent manages lines in the back office, the user operates the
//! device, and both act on one database.
//!
//! 1. **Airplane mode**: dual control; the fix is a user tool call the
//!    agent can only talk the user through.
//! 2. **Data refuel**: dual control; the agent changes the plan and the
//!    user observes the effect on the device.
//! 3. **Solo refuel**: the same fix as a ticket, agent only, closed with
//!    the `done` tool.
//!
//! All data is fictional and all participants are scripted. No external
//! calls are made.

pub mod db;
pub mod domain;
pub mod participant;
pub mod runner;
pub mod scenarios;

pub use db::TelecomDb;
pub use domain::TelecomDomain;
pub use participant::ScriptedParticipant;
pub use runner::{run_batch, BatchPlan};
