//! Scenario: the data top-up as a back-office ticket.
//!
//! Solo mode. There is no user to talk to, so the agent only calls tools
//! and closes the ticket with `done`, which ends the run.

use std::sync::Arc;

use serde_json::json;

use tandem_contracts::{error::TandemResult, message::Draft, run::SimulationRun};
use tandem_core::{config::RunConfig, traits::TraceWriter};

use crate::participant::call;

pub const TASK_ID: &str = "solo_refuel";

pub fn agent_script() -> Vec<Draft> {
    vec![
        call("a1", "get_line", json!({ "line_id": "L1" })),
        call("a2", "refuel_data", json!({ "line_id": "L1", "gb_amount": 2.0 })),
        call("a3", "done", json!({})),
    ]
}

pub fn run_scenario(config: &RunConfig, trace: Option<Arc<dyn TraceWriter>>) -> TandemResult<SimulationRun> {
    super::run_task(TASK_ID, true, config, trace)
}
