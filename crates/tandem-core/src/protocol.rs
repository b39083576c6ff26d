//! Message-level protocol rules.
//!
//! `validate_draft` decides whether a single participant draft may enter the
//! history. `check_history` audits a complete history after the fact, and
//! `opening_role` derives who speaks first from a task's seed conversation.
//! None of these touch the environment.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use tandem_contracts::{
    error::{TandemError, TandemResult},
    message::{Draft, Message, Role},
    task::InitialState,
};

/// What `validate_draft` needs to know about the run.
#[derive(Debug, Clone, Copy)]
pub struct DraftContext<'a> {
    pub role: Role,
    pub solo: bool,
    /// Whether the domain grants the user a toolkit.
    pub user_has_tools: bool,
    /// Every call id issued so far in this run.
    pub issued_call_ids: &'a BTreeSet<String>,
    /// Whether the participant marked this draft as its stop signal.
    pub is_stop: bool,
}

/// Check one draft against the protocol.
///
/// Returns the reason for the first violated rule. Unknown tool names are
/// not violations; the toolkit answers them with an error result.
pub fn validate_draft(draft: &Draft, ctx: &DraftContext<'_>) -> Result<(), String> {
    draft.check_format()?;

    if !draft.is_tool_call() {
        if ctx.solo && !ctx.is_stop {
            return Err(
                "solo mode accepts only tool calls or the stop signal; text was sent".to_string(),
            );
        }
        return Ok(());
    }

    if ctx.role == Role::User && !ctx.user_has_tools {
        return Err("the user has no tools in this domain".to_string());
    }

    let mut batch = BTreeSet::new();
    for call in &draft.tool_calls {
        if call.id.trim().is_empty() {
            return Err(format!("tool call '{}' has an empty id", call.name));
        }
        if call.name.trim().is_empty() {
            return Err(format!("tool call '{}' has an empty name", call.id));
        }
        if !matches!(call.arguments, Value::Object(_) | Value::Null) {
            return Err(format!("arguments of tool call '{}' must be a JSON object", call.id));
        }
        if ctx.issued_call_ids.contains(&call.id) || !batch.insert(call.id.as_str()) {
            return Err(format!("tool call id '{}' was already used", call.id));
        }
    }
    Ok(())
}

/// Audit a complete history.
///
/// Every message must satisfy the text-xor-tool-calls rule, every tool call
/// must be answered exactly once by a result for the same role before any
/// participant speaks again, and every result must answer a pending call.
pub fn check_history(history: &[Message]) -> TandemResult<()> {
    let mut pending: BTreeMap<&str, Role> = BTreeMap::new();
    let mut issued: BTreeSet<&str> = BTreeSet::new();

    for (idx, message) in history.iter().enumerate() {
        let violation = |reason: String| TandemError::ProtocolViolation {
            reason: format!("message {idx}: {reason}"),
        };

        match message {
            Message::Assistant(chat) | Message::User(chat) => {
                if let Some(id) = pending.keys().next() {
                    return Err(violation(format!(
                        "participant spoke while tool call '{id}' was unanswered"
                    )));
                }
                let draft = Draft {
                    content: chat.content.clone(),
                    tool_calls: chat.tool_calls.clone(),
                };
                draft.check_format().map_err(violation)?;

                let role = message.role().unwrap_or(Role::Agent);
                for call in &chat.tool_calls {
                    if !issued.insert(call.id.as_str()) {
                        return Err(violation(format!("tool call id '{}' reused", call.id)));
                    }
                    pending.insert(call.id.as_str(), role);
                }
            }
            Message::Tool(_) | Message::MultiTool(_) => {
                for result in message.tool_results() {
                    match pending.remove(result.id.as_str()) {
                        Some(role) if role == result.requestor => {}
                        Some(role) => {
                            return Err(violation(format!(
                                "result '{}' names requestor {} but the call came from {}",
                                result.id, result.requestor, role
                            )))
                        }
                        None => {
                            return Err(violation(format!(
                                "result '{}' answers no pending tool call",
                                result.id
                            )))
                        }
                    }
                }
            }
            Message::System(_) => {}
        }
    }

    match pending.keys().next() {
        Some(id) => Err(TandemError::ProtocolViolation {
            reason: format!("tool call '{id}' is never answered"),
        }),
        None => Ok(()),
    }
}

/// Who speaks first.
///
/// An explicit `opening_role` wins. Otherwise an empty history opens with
/// the agent; after assistant text the user answers, after user text the
/// agent does, and after tool results the role that issued the calls
/// continues. Solo runs always open with the agent.
pub fn opening_role(initial: &InitialState, solo: bool) -> Role {
    if solo {
        return Role::Agent;
    }
    if let Some(role) = initial.opening_role {
        return role;
    }
    let last = initial
        .message_history
        .iter()
        .rev()
        .find(|m| !matches!(m, Message::System(_)));
    match last {
        None => Role::Agent,
        Some(Message::Assistant(_)) => Role::User,
        Some(Message::User(_)) => Role::Agent,
        Some(other) => other.role().unwrap_or(Role::Agent),
    }
}
