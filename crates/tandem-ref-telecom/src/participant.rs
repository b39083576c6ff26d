//! A participant that replays fixed drafts.
//!
//! Scripts are keyed by task id, so one scripted agent (or user) can be
//! registered once and serve every task of a batch. The position in the
//! script lives in the participant's private state, never in `self`.

use std::collections::BTreeMap;

use serde_json::{json, Value};
use tracing::debug;

use tandem_contracts::{
    error::{TandemError, TandemResult},
    message::{Draft, Message, Role, ToolCall},
    participant::{ParticipantId, ParticipantState},
    task::Task,
};
use tandem_core::traits::{Participant, AGENT_STOP_TOKENS, STOP, USER_STOP_TOKENS};
use tandem_env::ToolDefinition;

pub struct ScriptedParticipant {
    id: ParticipantId,
    role: Role,
    scripts: BTreeMap<String, Vec<Draft>>,
}

impl ScriptedParticipant {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: ParticipantId::new(id),
            role,
            scripts: BTreeMap::new(),
        }
    }

    /// Replay `drafts` for runs of `task_id`.
    pub fn with_script(mut self, task_id: impl Into<String>, drafts: Vec<Draft>) -> Self {
        self.scripts.insert(task_id.into(), drafts);
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }
}

impl Participant for ScriptedParticipant {
    fn id(&self) -> ParticipantId {
        self.id.clone()
    }

    fn initial_state(
        &self,
        task: &Task,
        _tools: &[ToolDefinition],
        seed: u64,
    ) -> TandemResult<ParticipantState> {
        if !self.scripts.contains_key(&task.task_id) {
            return Err(TandemError::ConfigError {
                reason: format!("{} has no script for task '{}'", self.id.0, task.task_id),
            });
        }
        Ok(ParticipantState::new(
            self.id.clone(),
            json!({ "task_id": task.task_id, "cursor": 0, "seed": seed }),
        ))
    }

    fn next_message(
        &self,
        _history: &[Message],
        state: ParticipantState,
    ) -> TandemResult<(Draft, ParticipantState)> {
        let task_id = state.context["task_id"].as_str().unwrap_or_default();
        let cursor = state.context["cursor"].as_u64().unwrap_or_default() as usize;
        let script = self.scripts.get(task_id).ok_or_else(|| TandemError::ConfigError {
            reason: format!("{} has no script for task '{task_id}'", self.id.0),
        })?;

        let draft = match script.get(cursor) {
            Some(draft) => draft.clone(),
            None => {
                debug!(participant = %self.id.0, task_id, "script exhausted, stopping");
                Draft::text(STOP)
            }
        };

        let mut next = state.advanced();
        next.context["cursor"] = json!(cursor + 1);
        Ok((draft, next))
    }

    fn stop_tokens(&self) -> &'static [&'static str] {
        match self.role {
            Role::Agent => AGENT_STOP_TOKENS,
            Role::User => USER_STOP_TOKENS,
        }
    }
}

// ── Draft helpers ────────────────────────────────────────────────────────────

pub fn say(text: &str) -> Draft {
    Draft::text(text)
}

pub fn call(id: &str, name: &str, arguments: Value) -> Draft {
    Draft::calls(vec![ToolCall::new(id, name, arguments)])
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use tandem_contracts::{message::Role, task::Task};
    use tandem_core::traits::{Participant, TRANSFER};

    use super::{call, say, ScriptedParticipant};

    fn task(id: &str) -> Task {
        serde_json::from_value(json!({ "task_id": id })).unwrap()
    }

    #[test]
    fn replays_then_stops() {
        let user = ScriptedParticipant::new("user", Role::User)
            .with_script("t", vec![say("hello"), call("u1", "check_status_bar", json!({}))]);
        let state = user.initial_state(&task("t"), &[], 7).unwrap();
        assert_eq!(state.context["seed"], json!(7));

        let (first, state) = user.next_message(&[], state).unwrap();
        assert_eq!(first.content.as_deref(), Some("hello"));
        let (second, state) = user.next_message(&[], state).unwrap();
        assert_eq!(second.tool_calls[0].name, "check_status_bar");
        let (third, state) = user.next_message(&[], state).unwrap();
        assert!(user.is_stop(&third));
        assert_eq!(state.turns, 3);
    }

    #[test]
    fn unknown_task_is_rejected_at_setup() {
        let agent = ScriptedParticipant::new("agent", Role::Agent);
        assert!(agent.initial_state(&task("missing"), &[], 0).is_err());
    }

    #[test]
    fn only_users_may_transfer_out() {
        let agent = ScriptedParticipant::new("agent", Role::Agent);
        let user = ScriptedParticipant::new("user", Role::User);
        let draft = say(TRANSFER);
        assert!(!agent.is_stop(&draft));
        assert!(user.is_stop(&draft));
    }
}
