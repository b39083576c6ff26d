//! The evaluator: sealed run + task criteria → reward.
//!
//! Components are computed independently:
//!
//! 1. **Action**: expected tool calls found in the trajectory (ordered or
//!    unordered), and no disallowed call made.
//! 2. **Db**: the canonical hash of the final database equals the hash of
//!    the gold database. A structural diff is attached on mismatch.
//! 3. **EnvAssertion**: every declared predicate over the final database
//!    yields its expected value.
//! 4. **Communicate**: every required piece of information appears in some
//!    agent text message.
//!
//! The task's combination folds the scores of its reward basis into the
//! reward. An optional `NlJudge` is consulted for `nl_assertions`; its score
//! is reported on its own and never folded in.
//!
//! Evaluation is total: any internal failure zeroes the affected component
//! and leaves a note, so every run yields a `RewardResult`.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;
use tracing::{debug, info, warn};

use tandem_contracts::{
    error::{TandemError, TandemResult},
    message::{Message, Role, ToolCall},
    reward::{
        ActionCheck, ActionMatch, AssertionCheck, CommunicateCheck, DbCheck, NlJudgment,
        RewardResult,
    },
    run::SimulationRun,
    task::{ActionOrdering, Combination, EvaluationCriteria, RewardComponent, Task},
};
use tandem_env::{
    canonical::{content_hash, diff},
    database::Database,
    DomainRef, Environment,
};

use crate::policy::{AllPolicy, AnyPolicy, RewardPolicy, WeightedPolicy};

/// An auxiliary natural-language scorer, typically backed by a model.
pub trait NlJudge: Send + Sync {
    fn name(&self) -> &str;

    /// Judge `run` against `assertions`. The returned score is reported in
    /// `RewardResult::nl_judgment` only.
    fn judge(&self, run: &SimulationRun, assertions: &[String]) -> TandemResult<NlJudgment>;
}

/// Computes rewards. Build once at startup, share across runs.
#[derive(Default)]
pub struct Evaluator {
    policies: HashMap<String, Box<dyn RewardPolicy>>,
    judge: Option<Box<dyn NlJudge>>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom policy under its name, replacing any previous one.
    pub fn register_policy(&mut self, policy: Box<dyn RewardPolicy>) {
        self.policies.insert(policy.name().to_string(), policy);
    }

    pub fn with_judge(mut self, judge: Box<dyn NlJudge>) -> Self {
        self.judge = Some(judge);
        self
    }

    /// Score `run` against `task`'s criteria.
    ///
    /// `domain` must be the domain the run was executed in; it rebuilds the
    /// gold database and evaluates assertions.
    pub fn evaluate<D: Database>(
        &self,
        run: &SimulationRun,
        task: &Task,
        domain: &DomainRef<D>,
    ) -> RewardResult {
        let criteria = &task.evaluation_criteria;
        let mut result = RewardResult {
            reward: 0.0,
            reward_basis: criteria.reward_basis.clone(),
            components: BTreeMap::new(),
            action_check: None,
            db_check: None,
            env_assertions: Vec::new(),
            communicate_checks: Vec::new(),
            nl_judgment: None,
            premature_termination: !run.termination_reason.is_natural(),
            notes: Vec::new(),
        };

        if let Some(error) = &run.error {
            result.notes.push(format!("run ended with error: {error}"));
        }

        // ── Structural components ────────────────────────────────────────────
        for component in criteria.reward_basis.iter().copied() {
            let score = match component {
                RewardComponent::Action => {
                    let check = check_actions(run, criteria);
                    let score = pass_score(check.passed);
                    result.action_check = Some(check);
                    score
                }
                RewardComponent::Db => match check_db(run, task, domain) {
                    Ok(check) => {
                        let score = pass_score(check.passed);
                        result.db_check = Some(check);
                        score
                    }
                    Err(note) => {
                        result.notes.push(note);
                        0.0
                    }
                },
                RewardComponent::EnvAssertion => {
                    let (checks, notes) = check_assertions(run, criteria, domain);
                    let passed = !checks.is_empty() && checks.iter().all(|c| c.passed);
                    result.env_assertions = checks;
                    result.notes.extend(notes);
                    pass_score(passed)
                }
                RewardComponent::Communicate => {
                    let checks = check_communicate(run, criteria);
                    let passed = checks.iter().all(|c| c.found);
                    result.communicate_checks = checks;
                    pass_score(passed)
                }
                RewardComponent::NlAssertion => {
                    result.notes.push(
                        "NL_ASSERTION is reported in nl_judgment and not combined into the reward"
                            .to_string(),
                    );
                    continue;
                }
            };
            debug!(
                run_id = %run.run_id.0,
                component = component.as_str(),
                score,
                "reward component scored"
            );
            result.components.insert(component, score);
        }

        // ── Combination ──────────────────────────────────────────────────────
        result.reward = if result.components.is_empty() {
            result
                .notes
                .push("reward basis has no structural component".to_string());
            0.0
        } else {
            self.combine(&criteria.combination, &result.components, &mut result.notes)
        };

        // ── Auxiliary NL judgment ────────────────────────────────────────────
        if let Some(judge) = &self.judge {
            if !criteria.nl_assertions.is_empty() {
                match judge.judge(run, &criteria.nl_assertions) {
                    Ok(judgment) => result.nl_judgment = Some(judgment),
                    Err(e) => result.notes.push(format!("NL judge '{}' failed: {e}", judge.name())),
                }
            }
        }

        info!(
            run_id = %run.run_id.0,
            task_id = %task.task_id,
            reward = result.reward,
            premature = result.premature_termination,
            "run evaluated"
        );
        result
    }

    fn combine(
        &self,
        combination: &Combination,
        components: &BTreeMap<RewardComponent, f64>,
        notes: &mut Vec<String>,
    ) -> f64 {
        let reward = match combination {
            Combination::All => AllPolicy.combine(components),
            Combination::Any => AnyPolicy.combine(components),
            Combination::Weighted { weights } => WeightedPolicy { weights }.combine(components),
            Combination::Custom { name } => match self.policies.get(name) {
                Some(policy) => policy.combine(components),
                None => {
                    warn!(policy = %name, "no reward policy registered under this name");
                    notes.push(format!("no reward policy registered under '{name}'"));
                    return 0.0;
                }
            },
        };
        if reward.is_nan() {
            notes.push("reward policy produced NaN".to_string());
            return 0.0;
        }
        reward.clamp(0.0, 1.0)
    }
}

fn pass_score(passed: bool) -> f64 {
    if passed {
        1.0
    } else {
        0.0
    }
}

// ── Action match ─────────────────────────────────────────────────────────────

fn check_actions(run: &SimulationRun, criteria: &EvaluationCriteria) -> ActionCheck {
    let calls: Vec<&ToolCall> = run.messages.iter().flat_map(Message::tool_calls).collect();
    let mut used = vec![false; calls.len()];
    // Ordered matching only searches after the previous match.
    let mut cursor = 0;

    let matches: Vec<ActionMatch> = criteria
        .expected_actions
        .iter()
        .map(|expected| {
            let start = match criteria.action_ordering {
                ActionOrdering::Ordered => cursor,
                ActionOrdering::Unordered => 0,
            };
            let found = (start..calls.len()).find(|&i| !used[i] && expected.matches(calls[i]));
            if let Some(i) = found {
                used[i] = true;
                cursor = i + 1;
            }
            ActionMatch {
                action_id: expected.action_id.clone(),
                name: expected.name.clone(),
                matched: found.is_some(),
                call_id: found.map(|i| calls[i].id.clone()),
            }
        })
        .collect();

    let disallowed_calls: Vec<String> = calls
        .iter()
        .filter(|c| c.requestor == Role::Agent && criteria.disallowed_actions.contains(&c.name))
        .map(|c| c.id.clone())
        .collect();

    let recall = if matches.is_empty() {
        1.0
    } else {
        matches.iter().filter(|m| m.matched).count() as f64 / matches.len() as f64
    };
    let passed = matches.iter().all(|m| m.matched) && disallowed_calls.is_empty();

    ActionCheck {
        matches,
        recall,
        disallowed_calls,
        passed,
    }
}

// ── Database match ───────────────────────────────────────────────────────────

/// The gold database snapshot, normalized through the domain's database type.
///
/// Uses `gold_db` when given; otherwise replays the expected actions on the
/// task's initial state built from `seed`, the seed of the run being scored.
pub fn gold_snapshot<D: Database>(
    task: &Task,
    domain: &DomainRef<D>,
    seed: u64,
) -> TandemResult<Value> {
    let criteria = &task.evaluation_criteria;
    if let Some(gold) = &criteria.gold_db {
        let mut env = Environment::new(domain.clone(), seed)?;
        env.reset(seed, Some(gold))?;
        return env.snapshot();
    }

    let env = Environment::from_initial_state(domain.clone(), &task.initial_state, seed)?;
    for expected in &criteria.expected_actions {
        let call = ToolCall::new(
            format!("gold-{}", expected.action_id),
            expected.name.clone(),
            expected.arguments.clone(),
        )
        .by(expected.requestor);
        let outcome = env.execute(expected.requestor, &call)?;
        if outcome.message.error {
            debug!(
                task_id = %task.task_id,
                action_id = %expected.action_id,
                "gold action returned an error result"
            );
        }
    }
    env.snapshot()
}

fn check_db<D: Database>(
    run: &SimulationRun,
    task: &Task,
    domain: &DomainRef<D>,
) -> Result<DbCheck, String> {
    let final_db = run
        .final_db
        .as_ref()
        .ok_or_else(|| "run has no final database; DB scored 0".to_string())?;
    let gold = gold_snapshot(task, domain, run.seed).map_err(|e| format!("gold database unavailable: {e}"))?;

    let final_hash = content_hash(final_db);
    let gold_hash = content_hash(&gold);
    let passed = final_hash == gold_hash;
    Ok(DbCheck {
        passed,
        diff: if passed { Vec::new() } else { diff(&gold, final_db) },
        final_hash,
        gold_hash,
    })
}

// ── Environment assertions ───────────────────────────────────────────────────

fn check_assertions<D: Database>(
    run: &SimulationRun,
    criteria: &EvaluationCriteria,
    domain: &DomainRef<D>,
) -> (Vec<AssertionCheck>, Vec<String>) {
    let mut notes = Vec::new();
    let env = match final_environment(run, domain) {
        Ok(env) => Some(env),
        Err(e) => {
            notes.push(format!("cannot evaluate assertions: {e}"));
            None
        }
    };

    let checks = criteria
        .env_assertions
        .iter()
        .map(|assertion| {
            let actual = match &env {
                Some(env) => match env.check_assertion(&assertion.name, &assertion.arguments) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        notes.push(format!("assertion '{}' failed to evaluate: {e}", assertion.name));
                        None
                    }
                },
                None => None,
            };
            AssertionCheck {
                name: assertion.name.clone(),
                expected: assertion.expected,
                actual,
                passed: actual == Some(assertion.expected),
                message: assertion.message.clone(),
            }
        })
        .collect();
    (checks, notes)
}

fn final_environment<D: Database>(
    run: &SimulationRun,
    domain: &DomainRef<D>,
) -> TandemResult<Environment<D>> {
    let mut env = Environment::new(domain.clone(), run.seed)?;
    let final_db = run.final_db.as_ref().ok_or_else(|| TandemError::SetupError {
        reason: "run has no final database".to_string(),
    })?;
    env.reset(run.seed, Some(final_db))?;
    Ok(env)
}

// ── Communicate ──────────────────────────────────────────────────────────────

fn normalize(text: &str) -> String {
    text.to_lowercase().replace(',', "")
}

fn check_communicate(run: &SimulationRun, criteria: &EvaluationCriteria) -> Vec<CommunicateCheck> {
    let agent_texts: Vec<String> = run
        .messages
        .iter()
        .filter(|m| matches!(m, Message::Assistant(_)))
        .filter_map(Message::text)
        .map(normalize)
        .collect();

    criteria
        .communicate_info
        .iter()
        .map(|info| {
            let needle = normalize(info);
            CommunicateCheck {
                info: info.clone(),
                found: agent_texts.iter().any(|text| text.contains(&needle)),
            }
        })
        .collect()
}
