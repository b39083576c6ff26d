//! Reward documents produced by the evaluator.
//!
//! A `RewardResult` is always complete: every component listed in the
//! task's reward basis has a score, and every check that ran is reported,
//! whether it passed or not.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::task::RewardComponent;

/// Outcome of matching one expected action against the trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionMatch {
    pub action_id: String,
    pub name: String,
    pub matched: bool,
    /// The id of the call that satisfied the action.
    pub call_id: Option<String>,
}

/// Action criterion breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionCheck {
    pub matches: Vec<ActionMatch>,
    /// Fraction of expected actions found, in `[0, 1]`.
    pub recall: f64,
    /// Ids of calls to disallowed tools.
    pub disallowed_calls: Vec<String>,
    pub passed: bool,
}

/// One diverging field between the final and the gold database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    /// JSON pointer to the field, e.g. `/lines/L1/status`.
    pub path: String,
    pub expected: Option<Value>,
    pub actual: Option<Value>,
}

/// Database criterion breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbCheck {
    pub passed: bool,
    pub final_hash: String,
    pub gold_hash: String,
    /// Diagnostic only; empty when the hashes match.
    pub diff: Vec<FieldDiff>,
}

/// Result of one environment assertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionCheck {
    pub name: String,
    pub expected: bool,
    /// What the predicate returned; `None` when it could not be evaluated.
    pub actual: Option<bool>,
    pub passed: bool,
    pub message: Option<String>,
}

/// Whether one required fact was communicated to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunicateCheck {
    pub info: String,
    pub found: bool,
}

/// Verdict of an external judge on one natural-language assertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NlAssertionCheck {
    pub assertion: String,
    pub met: bool,
    pub justification: Option<String>,
}

/// Auxiliary score from an external natural-language judge.
///
/// Recorded next to the structural reward, never folded into it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NlJudgment {
    pub judge: String,
    pub score: f64,
    pub checks: Vec<NlAssertionCheck>,
}

/// The scored outcome of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardResult {
    /// Scalar reward in `[0, 1]`.
    pub reward: f64,
    pub reward_basis: Vec<RewardComponent>,
    /// Per-component score in `[0, 1]` for every component in the basis.
    pub components: BTreeMap<RewardComponent, f64>,
    pub action_check: Option<ActionCheck>,
    pub db_check: Option<DbCheck>,
    pub env_assertions: Vec<AssertionCheck>,
    pub communicate_checks: Vec<CommunicateCheck>,
    pub nl_judgment: Option<NlJudgment>,
    /// The run ended on a budget or a failure rather than a stop signal.
    pub premature_termination: bool,
    /// Evaluation problems that zeroed a component instead of failing.
    pub notes: Vec<String>,
}

impl RewardResult {
    /// A zero reward with every basis component scored 0.
    pub fn zero(reward_basis: Vec<RewardComponent>, note: impl Into<String>) -> Self {
        let components = reward_basis.iter().map(|c| (*c, 0.0)).collect();
        Self {
            reward: 0.0,
            reward_basis,
            components,
            action_check: None,
            db_check: None,
            env_assertions: Vec::new(),
            communicate_checks: Vec::new(),
            nl_judgment: None,
            premature_termination: false,
            notes: vec![note.into()],
        }
    }

    /// True when the reward is the maximum.
    pub fn is_success(&self) -> bool {
        (self.reward - 1.0).abs() < 1e-9
    }
}
