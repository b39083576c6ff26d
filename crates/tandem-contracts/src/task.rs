//! Task documents: initial state plus gold evaluation criteria.
//!
//! A `Task` is loaded once (usually from JSON) and never modified afterwards.
//! The orchestrator reads `initial_state`; the evaluator reads
//! `evaluation_criteria`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{TandemError, TandemResult},
    message::{Message, Role, ToolCall},
};

fn default_agent() -> Role {
    Role::Agent
}

fn default_true() -> bool {
    true
}

/// A tool call executed against the environment outside any conversation,
/// e.g. to seed the database before the first turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvFunctionCall {
    /// Whose toolkit executes the call.
    #[serde(default = "default_agent")]
    pub requestor: Role,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// How the environment and the conversation look before the first turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InitialState {
    /// Full database snapshot. When absent, the domain's default database is used.
    #[serde(default)]
    pub db_snapshot: Option<Value>,
    /// Calls replayed on the database, in order, before any seed message.
    #[serde(default)]
    pub initialization_actions: Vec<EnvFunctionCall>,
    /// Conversation prefix; its tool calls are replayed against the database.
    #[serde(default)]
    pub message_history: Vec<Message>,
    /// Who speaks first. Derived from `message_history` when absent.
    #[serde(default)]
    pub opening_role: Option<Role>,
}

/// A gold tool call the participant is expected to make.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedAction {
    pub action_id: String,
    #[serde(default = "default_agent")]
    pub requestor: Role,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
    /// Argument keys that must match. `None` compares every key in `arguments`.
    #[serde(default)]
    pub compare_args: Option<Vec<String>>,
}

impl ExpectedAction {
    /// True when `call` is this action: same requestor, same tool, and the
    /// compared argument keys hold equal values. Extra call arguments are
    /// ignored.
    pub fn matches(&self, call: &ToolCall) -> bool {
        if call.requestor != self.requestor || call.name != self.name {
            return false;
        }
        let keys: Vec<&str> = match &self.compare_args {
            Some(keys) => keys.iter().map(String::as_str).collect(),
            None => self
                .arguments
                .as_object()
                .map(|o| o.keys().map(String::as_str).collect())
                .unwrap_or_default(),
        };
        keys.iter()
            .all(|k| self.arguments.get(k) == call.arguments.get(k))
    }
}

/// Whether expected actions must appear in declaration order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOrdering {
    #[default]
    Unordered,
    Ordered,
}

/// A named boolean predicate evaluated over the final database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvAssertion {
    /// Name of an assertion registered by the domain.
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
    /// The value the predicate must return.
    #[serde(default = "default_true")]
    pub expected: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// One scorable criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewardComponent {
    Db,
    Action,
    EnvAssertion,
    Communicate,
    NlAssertion,
}

impl RewardComponent {
    pub fn as_str(self) -> &'static str {
        match self {
            RewardComponent::Db => "DB",
            RewardComponent::Action => "ACTION",
            RewardComponent::EnvAssertion => "ENV_ASSERTION",
            RewardComponent::Communicate => "COMMUNICATE",
            RewardComponent::NlAssertion => "NL_ASSERTION",
        }
    }
}

/// Rule folding per-component scores into the scalar reward.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Combination {
    /// Every component must pass: product of component scores.
    #[default]
    All,
    /// Any component passing is enough: maximum component score.
    Any,
    /// Normalized weighted mean. Components without a weight count as 0.
    Weighted { weights: BTreeMap<RewardComponent, f64> },
    /// A policy registered with the evaluator under `name`.
    Custom { name: String },
}

fn default_basis() -> Vec<RewardComponent> {
    vec![RewardComponent::Db]
}

/// Gold criteria a finished run is scored against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationCriteria {
    #[serde(default)]
    pub expected_actions: Vec<ExpectedAction>,
    #[serde(default)]
    pub action_ordering: ActionOrdering,
    /// Tool names whose use fails the action criterion outright.
    #[serde(default)]
    pub disallowed_actions: Vec<String>,
    /// Gold final database. Derived by replaying `expected_actions` when absent.
    #[serde(default)]
    pub gold_db: Option<Value>,
    #[serde(default)]
    pub env_assertions: Vec<EnvAssertion>,
    /// Facts the agent must state to the user.
    #[serde(default)]
    pub communicate_info: Vec<String>,
    /// Natural-language expectations for an optional external judge.
    #[serde(default)]
    pub nl_assertions: Vec<String>,
    #[serde(default = "default_basis")]
    pub reward_basis: Vec<RewardComponent>,
    #[serde(default)]
    pub combination: Combination,
}

impl Default for EvaluationCriteria {
    fn default() -> Self {
        Self {
            expected_actions: Vec::new(),
            action_ordering: ActionOrdering::default(),
            disallowed_actions: Vec::new(),
            gold_db: None,
            env_assertions: Vec::new(),
            communicate_info: Vec::new(),
            nl_assertions: Vec::new(),
            reward_basis: default_basis(),
            combination: Combination::default(),
        }
    }
}

impl EvaluationCriteria {
    /// True when `component` has something to check.
    ///
    /// `Db` always does: with no gold snapshot and no expected actions it
    /// asserts the database is left unchanged.
    pub fn supports(&self, component: RewardComponent) -> bool {
        match component {
            RewardComponent::Db => true,
            RewardComponent::Action => !self.expected_actions.is_empty(),
            RewardComponent::EnvAssertion => !self.env_assertions.is_empty(),
            RewardComponent::Communicate => !self.communicate_info.is_empty(),
            RewardComponent::NlAssertion => !self.nl_assertions.is_empty(),
        }
    }
}

/// A complete evaluation task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Opaque instructions for user simulators. The core never reads it.
    #[serde(default)]
    pub user_scenario: Value,
    #[serde(default)]
    pub initial_state: InitialState,
    #[serde(default)]
    pub evaluation_criteria: EvaluationCriteria,
    #[serde(default)]
    pub split: Option<String>,
}

impl Task {
    /// Check the document-level requirements: a non-empty id and at least
    /// one reward component that has something to check.
    pub fn validate(&self) -> TandemResult<()> {
        if self.task_id.trim().is_empty() {
            return Err(TandemError::ConfigError {
                reason: "task_id must not be empty".to_string(),
            });
        }
        let criteria = &self.evaluation_criteria;
        if criteria.reward_basis.is_empty() {
            return Err(TandemError::ConfigError {
                reason: format!("task '{}' declares an empty reward_basis", self.task_id),
            });
        }
        for component in &criteria.reward_basis {
            if !criteria.supports(*component) {
                return Err(TandemError::ConfigError {
                    reason: format!(
                        "task '{}' scores {} but provides no criteria for it",
                        self.task_id,
                        component.as_str()
                    ),
                });
            }
        }
        Ok(())
    }
}
