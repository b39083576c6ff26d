//! Scenario: mobile data stopped because the plan allowance ran out.
//!
//! Dual control with an agent-side fix. The agent inspects the line, offers
//! a top-up, applies it after the user agrees and reports the new
//! allowance. The user then sees data return on their own status bar, which
//! reads the same database the agent just changed.

use std::sync::Arc;

use serde_json::json;

use tandem_contracts::{error::TandemResult, message::Draft, run::SimulationRun};
use tandem_core::{config::RunConfig, traits::TraceWriter};

use crate::participant::{call, say};

pub const TASK_ID: &str = "data_refuel";

pub fn agent_script() -> Vec<Draft> {
    vec![
        say("Hello! What can I do for you today?"),
        call("a1", "get_customer", json!({ "phone_number": "555-0101" })),
        call("a2", "get_line", json!({ "line_id": "L1" })),
        say("You have used all 10 GB included in your plan this cycle. I can add 2 GB right away. Shall I go ahead?"),
        call("a3", "refuel_data", json!({ "line_id": "L1", "gb_amount": 2.0 })),
        say("Done. Your allowance for this cycle is now 12 GB. Could you check whether mobile data works?"),
    ]
}

pub fn user_script() -> Vec<Draft> {
    vec![
        say("Mobile data stopped working on my phone. The number is 555-0101."),
        say("Yes, please add it."),
        call("u1", "check_status_bar", json!({})),
        say("I see LTE again. Thanks! ###STOP###"),
    ]
}

pub fn run_scenario(config: &RunConfig, trace: Option<Arc<dyn TraceWriter>>) -> TandemResult<SimulationRun> {
    super::run_task(TASK_ID, false, config, trace)
}
