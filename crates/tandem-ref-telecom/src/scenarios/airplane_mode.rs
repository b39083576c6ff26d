//! Scenario: no service because airplane mode was left on.
//!
//! Dual control. The fault lives on the user's phone, so the agent can only
//! diagnose; the fix is a user tool call. Walk-through:
//!   1. The agent looks the customer up and finds the line active.
//!   2. The user reads the status bar and reports airplane mode.
//!   3. The user toggles airplane mode off, confirms, and stops.

use std::sync::Arc;

use serde_json::json;

use tandem_contracts::{error::TandemResult, message::Draft, run::SimulationRun};
use tandem_core::{config::RunConfig, traits::TraceWriter};

use crate::participant::{call, say};

pub const TASK_ID: &str = "airplane_mode";

pub fn agent_script() -> Vec<Draft> {
    vec![
        say("Hi, thanks for contacting support. How can I help you today?"),
        call("a1", "get_customer", json!({ "phone_number": "555-0101" })),
        say("Thanks Ada, line L1 is active on our side. Could you check the status bar on your phone and tell me what it shows?"),
        say("Airplane mode is on, which turns off the radio. Please switch it off and check again."),
    ]
}

pub fn user_script() -> Vec<Draft> {
    vec![
        say("My phone has had no service since this morning. My number is 555-0101."),
        call("u1", "check_status_bar", json!({})),
        say("It shows an airplane icon and no signal bars."),
        call("u2", "toggle_airplane_mode", json!({})),
        call("u3", "check_status_bar", json!({})),
        say("Signal is back to full bars, thank you! ###STOP###"),
    ]
}

pub fn run_scenario(config: &RunConfig, trace: Option<Arc<dyn TraceWriter>>) -> TandemResult<SimulationRun> {
    super::run_task(TASK_ID, false, config, trace)
}
