//! The telecom domain: agent back-office tools, user device tools and the
//! assertions tasks check at the end of a run.

use serde_json::{json, Value};

use tandem_env::{
    tool::{f64_arg, str_arg},
    Assertion, Domain, Tool, ToolError, ToolReply,
};

use crate::db::{default_db, Line, LineStatus, SimStatus, TelecomDb};

/// Largest top-up a single `refuel_data` call may add.
pub const MAX_REFUEL_GB: f64 = 2.0;

pub struct TelecomDomain;

impl Domain for TelecomDomain {
    type Db = TelecomDb;

    fn name(&self) -> &str {
        "telecom"
    }

    /// The fixture is the same for every seed.
    fn initial_db(&self, _seed: u64) -> TelecomDb {
        default_db()
    }

    fn agent_tools(&self) -> Vec<Tool<TelecomDb>> {
        vec![
            Tool::new(
                "get_customer",
                "Look up a customer by the phone number of one of their lines",
                object_schema(json!({ "phone_number": { "type": "string" } }), &["phone_number"]),
                get_customer,
            ),
            Tool::new(
                "get_line",
                "Read the status, plan and data usage of a line",
                line_schema(),
                |db: &mut TelecomDb, args: &Value| {
                    let line = line(db, args)?;
                    Ok(ToolReply::ok(line_json(line)))
                },
            ),
            Tool::new(
                "suspend_line",
                "Suspend an active line",
                line_schema(),
                |db: &mut TelecomDb, args: &Value| set_status(db, args, LineStatus::Active, LineStatus::Suspended),
            ),
            Tool::new(
                "resume_line",
                "Resume a suspended line",
                line_schema(),
                |db: &mut TelecomDb, args: &Value| set_status(db, args, LineStatus::Suspended, LineStatus::Active),
            ),
            Tool::new(
                "refuel_data",
                "Add data to a line's allowance for the current cycle",
                object_schema(
                    json!({
                        "line_id": { "type": "string" },
                        "gb_amount": { "type": "number", "exclusiveMinimum": 0, "maximum": MAX_REFUEL_GB }
                    }),
                    &["line_id", "gb_amount"],
                ),
                refuel_data,
            ),
            Tool::new(
                "enable_roaming",
                "Allow a line to use partner networks abroad",
                line_schema(),
                |db: &mut TelecomDb, args: &Value| {
                    let line = line_mut(db, args)?;
                    if line.roaming_enabled {
                        return Err(ToolError::rejected(format!("roaming is already enabled on {}", line.line_id)));
                    }
                    line.roaming_enabled = true;
                    Ok(ToolReply::ok(line_json(line)))
                },
            ),
            Tool::new(
                "transfer_to_human_agents",
                "Hand the conversation to a human representative",
                object_schema(json!({ "summary": { "type": "string" } }), &["summary"]),
                |_db: &mut TelecomDb, _args: &Value| {
                    Ok(ToolReply::handoff(json!("Transfer successful")))
                },
            ),
            Tool::new(
                "done",
                "Declare the ticket resolved",
                object_schema(json!({}), &[]),
                |_db: &mut TelecomDb, _args: &Value| Ok(ToolReply::done(json!("Ticket closed"))),
            ),
        ]
    }

    fn user_tools(&self) -> Vec<Tool<TelecomDb>> {
        vec![
            Tool::new(
                "check_status_bar",
                "Look at the phone's status bar",
                object_schema(json!({}), &[]),
                |db: &mut TelecomDb, _args: &Value| Ok(ToolReply::ok(db.status_bar())),
            ),
            Tool::new(
                "toggle_airplane_mode",
                "Switch airplane mode on or off",
                object_schema(json!({}), &[]),
                |db: &mut TelecomDb, _args: &Value| {
                    db.device.airplane_mode = !db.device.airplane_mode;
                    Ok(ToolReply::ok(db.status_bar()))
                },
            ),
            Tool::new(
                "toggle_mobile_data",
                "Switch mobile data on or off",
                object_schema(json!({}), &[]),
                |db: &mut TelecomDb, _args: &Value| {
                    db.device.mobile_data = !db.device.mobile_data;
                    Ok(ToolReply::ok(db.status_bar()))
                },
            ),
            Tool::new(
                "reseat_sim",
                "Take the SIM card out and put it back in",
                object_schema(json!({}), &[]),
                |db: &mut TelecomDb, _args: &Value| {
                    db.device.sim = SimStatus::Seated;
                    Ok(ToolReply::ok(db.status_bar()))
                },
            ),
        ]
    }

    fn assertions(&self) -> Vec<Assertion<TelecomDb>> {
        vec![
            Assertion::new(
                "assert_service_working",
                "The phone has cellular service",
                |db: &TelecomDb, _args: &Value| Ok(db.service_working()),
            ),
            Assertion::new(
                "assert_mobile_data_working",
                "The phone has working mobile data",
                |db: &TelecomDb, _args: &Value| Ok(db.mobile_data_working()),
            ),
            Assertion::new(
                "assert_line_status",
                "A line has the given status",
                |db: &TelecomDb, args: &Value| {
                    let expected = str_arg(args, "status")?;
                    let line = lookup(db, str_arg(args, "line_id")?)?;
                    Ok(line.status.as_str() == expected)
                },
            ),
        ]
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

fn get_customer(db: &mut TelecomDb, args: &Value) -> Result<ToolReply, ToolError> {
    let number = str_arg(args, "phone_number")?;
    let line_id = db
        .lines
        .values()
        .find(|l| l.phone_number == number)
        .map(|l| l.line_id.clone())
        .ok_or_else(|| ToolError::not_found(format!("line with number {number}")))?;
    let customer = db
        .customers
        .values()
        .find(|c| c.line_ids.contains(&line_id))
        .ok_or_else(|| ToolError::not_found(format!("customer for line {line_id}")))?;
    Ok(ToolReply::ok(json!(customer)))
}

fn set_status(
    db: &mut TelecomDb,
    args: &Value,
    from: LineStatus,
    to: LineStatus,
) -> Result<ToolReply, ToolError> {
    let line = line_mut(db, args)?;
    if line.status != from {
        return Err(ToolError::rejected(format!(
            "line {} is {}, expected {}",
            line.line_id,
            line.status.as_str(),
            from.as_str()
        )));
    }
    line.status = to;
    Ok(ToolReply::ok(line_json(line)))
}

fn refuel_data(db: &mut TelecomDb, args: &Value) -> Result<ToolReply, ToolError> {
    let amount = f64_arg(args, "gb_amount")?;
    let line = line_mut(db, args)?;
    if line.status != LineStatus::Active {
        return Err(ToolError::rejected(format!("line {} is not active", line.line_id)));
    }
    line.data_limit_gb += amount;
    Ok(ToolReply::ok(json!({
        "line_id": line.line_id,
        "added_gb": amount,
        "data_limit_gb": line.data_limit_gb,
    })))
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn object_schema(properties: Value, required: &[&str]) -> Value {
    let mut schema = json!({
        "type": "object",
        "properties": properties,
        "additionalProperties": false
    });
    if !required.is_empty() {
        schema["required"] = json!(required);
    }
    schema
}

fn line_schema() -> Value {
    object_schema(json!({ "line_id": { "type": "string" } }), &["line_id"])
}

fn lookup<'a>(db: &'a TelecomDb, line_id: &str) -> Result<&'a Line, ToolError> {
    db.lines
        .get(line_id)
        .ok_or_else(|| ToolError::not_found(format!("line {line_id}")))
}

fn line<'a>(db: &'a TelecomDb, args: &Value) -> Result<&'a Line, ToolError> {
    lookup(db, str_arg(args, "line_id")?)
}

fn line_mut<'a>(db: &'a mut TelecomDb, args: &Value) -> Result<&'a mut Line, ToolError> {
    let line_id = str_arg(args, "line_id")?;
    db.lines
        .get_mut(line_id)
        .ok_or_else(|| ToolError::not_found(format!("line {line_id}")))
}

fn line_json(line: &Line) -> Value {
    json!(line)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use tandem_contracts::message::{Role, ToolCall};
    use tandem_env::{Environment, ToolSignal};

    use super::TelecomDomain;

    fn env() -> Environment<crate::db::TelecomDb> {
        Environment::new(Arc::new(TelecomDomain), 0).unwrap()
    }

    #[test]
    fn refuel_is_bounded_by_schema() {
        let env = env();
        let too_much = ToolCall::new("c1", "refuel_data", json!({ "line_id": "L1", "gb_amount": 5.0 }));
        assert!(env.execute(Role::Agent, &too_much).unwrap().message.error);

        let ok = ToolCall::new("c2", "refuel_data", json!({ "line_id": "L1", "gb_amount": 2.0 }));
        let outcome = env.execute(Role::Agent, &ok).unwrap();
        assert!(!outcome.message.error);
        assert_eq!(outcome.message.content["data_limit_gb"], json!(12.0));
    }

    #[test]
    fn suspended_line_cannot_be_refueled_or_suspended() {
        let env = env();
        let refuel = ToolCall::new("c1", "refuel_data", json!({ "line_id": "L2", "gb_amount": 1.0 }));
        assert!(env.execute(Role::Agent, &refuel).unwrap().message.error);
        let suspend = ToolCall::new("c2", "suspend_line", json!({ "line_id": "L2" }));
        let outcome = env.execute(Role::Agent, &suspend).unwrap();
        assert!(outcome.message.error);
        assert_eq!(outcome.message.content["error"], json!("line L2 is suspended, expected active"));
    }

    #[test]
    fn user_device_change_is_visible_to_agent_assertions() {
        let env = env();
        let toggle = ToolCall::new("u1", "toggle_airplane_mode", json!({})).by(Role::User);
        let outcome = env.execute(Role::User, &toggle).unwrap();
        assert_eq!(outcome.message.content["signal"], json!("airplane mode"));
        assert!(!env.check_assertion("assert_service_working", &json!({})).unwrap());
    }

    #[test]
    fn agent_cannot_use_device_tools() {
        let env = env();
        let call = ToolCall::new("c1", "toggle_airplane_mode", json!({}));
        assert!(env.execute(Role::Agent, &call).unwrap().message.error);
    }

    #[test]
    fn transfer_and_done_signal_the_orchestrator() {
        let env = env();
        let transfer = ToolCall::new("c1", "transfer_to_human_agents", json!({ "summary": "billing" }));
        assert_eq!(env.execute(Role::Agent, &transfer).unwrap().signal, ToolSignal::Handoff);
        let done = ToolCall::new("c2", "done", json!({}));
        assert_eq!(env.execute(Role::Agent, &done).unwrap().signal, ToolSignal::Done);
    }

    #[test]
    fn line_status_assertion() {
        let env = env();
        assert!(env
            .check_assertion("assert_line_status", &json!({ "line_id": "L2", "status": "suspended" }))
            .unwrap());
        assert!(env
            .check_assertion("assert_line_status", &json!({ "line_id": "L9", "status": "active" }))
            .is_err());
    }
}
