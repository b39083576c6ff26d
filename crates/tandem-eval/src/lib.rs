//! # tandem-eval
//!
//! Reward computation for finished runs.
//!
//! The evaluator is a pure function of a sealed `SimulationRun`, its `Task`
//! and the domain the run executed in: the same inputs always produce the
//! same `RewardResult`. See `evaluator` for the components and `policy` for
//! how they are combined.

pub mod evaluator;
pub mod metrics;
pub mod policy;

pub use evaluator::{gold_snapshot, Evaluator, NlJudge};
pub use metrics::{summarize, Summary};
pub use policy::RewardPolicy;

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Value};

    use tandem_contracts::{
        error::{TandemError, TandemResult},
        message::{ChatMessage, Draft, Message, Role, ToolCall, ToolMessage},
        participant::{ParticipantId, RunId},
        reward::{NlAssertionCheck, NlJudgment},
        run::{SimulationRun, TerminationReason},
        task::{RewardComponent, Task},
    };
    use tandem_env::{Assertion, Domain, DomainRef, Tool, ToolError, ToolReply};

    use super::{summarize, Evaluator, NlJudge, RewardPolicy};

    // ── Mock domain: a stock ledger ──────────────────────────────────────────

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Ledger {
        stock: BTreeMap<String, i64>,
    }

    struct LedgerDomain;

    impl Domain for LedgerDomain {
        type Db = Ledger;

        fn name(&self) -> &str {
            "ledger"
        }

        fn initial_db(&self, _seed: u64) -> Ledger {
            let stock = [("apple".to_string(), 3), ("pear".to_string(), 1)].into_iter().collect();
            Ledger { stock }
        }

        fn agent_tools(&self) -> Vec<Tool<Ledger>> {
            vec![Tool::new(
                "sell",
                "sell one item",
                json!({
                    "type": "object",
                    "properties": { "item": { "type": "string" } },
                    "required": ["item"]
                }),
                |db: &mut Ledger, args: &Value| {
                    let item = args["item"].as_str().unwrap_or_default().to_string();
                    let count = db
                        .stock
                        .get_mut(&item)
                        .ok_or_else(|| ToolError::not_found(format!("item '{item}'")))?;
                    if *count == 0 {
                        return Err(ToolError::rejected("out of stock"));
                    }
                    *count -= 1;
                    Ok(ToolReply::ok(json!({ "item": item, "left": *count })))
                },
            )]
        }

        fn assertions(&self) -> Vec<Assertion<Ledger>> {
            vec![Assertion::new("in_stock", "item count is positive", |db: &Ledger, args: &Value| {
                let item = args
                    .get("item")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ToolError::InvalidArguments { reason: "item".to_string() })?;
                Ok(db.stock.get(item).is_some_and(|n| *n > 0))
            })]
        }
    }

    fn domain() -> DomainRef<Ledger> {
        Arc::new(LedgerDomain)
    }

    // ── Fixtures ─────────────────────────────────────────────────────────────

    fn run(messages: Vec<Message>, final_db: Value, reason: TerminationReason) -> SimulationRun {
        SimulationRun {
            run_id: RunId::new(),
            task_id: "t".to_string(),
            trial: 0,
            seed: 0,
            domain: "ledger".to_string(),
            agent_id: ParticipantId::new("agent"),
            user_id: Some(ParticipantId::new("user")),
            solo: false,
            messages,
            termination_reason: reason,
            final_db: Some(final_db),
            final_db_hash: None,
            steps: 0,
            errors: 0,
            violations: Vec::new(),
            trace_hash: None,
            error: None,
            started_at: Utc::now(),
            ended_at: Utc::now(),
            reward: None,
        }
    }

    fn sell(id: &str, item: &str) -> Vec<Message> {
        vec![
            Message::Assistant(ChatMessage::from_draft(
                Draft::calls(vec![ToolCall::new(id, "sell", json!({ "item": item }))]),
                Role::Agent,
                0,
            )),
            Message::Tool(ToolMessage {
                id: id.to_string(),
                requestor: Role::Agent,
                content: json!({}),
                error: false,
                turn_idx: 1,
            }),
        ]
    }

    fn say(role: Role, text: &str) -> Message {
        let chat = ChatMessage::from_draft(Draft::text(text), role, 0);
        match role {
            Role::Agent => Message::Assistant(chat),
            Role::User => Message::User(chat),
        }
    }

    fn task(criteria: Value) -> Task {
        serde_json::from_value(json!({ "task_id": "t", "evaluation_criteria": criteria })).unwrap()
    }

    fn ledger(apple: i64, pear: i64) -> Value {
        json!({ "stock": { "apple": apple, "pear": pear } })
    }

    // ── DB ───────────────────────────────────────────────────────────────────

    /// Final DB equal to the gold snapshot scores 1.0; a single diverging
    /// field scores 0.0 and is flagged in the diff.
    #[test]
    fn test_db_basis_exact_match_and_single_field_divergence() {
        let t = task(json!({ "reward_basis": ["DB"], "gold_db": ledger(2, 1) }));
        let evaluator = Evaluator::new();

        let good = evaluator.evaluate(&run(vec![], ledger(2, 1), TerminationReason::AgentStop), &t, &domain());
        assert_eq!(good.reward, 1.0);
        let check = good.db_check.unwrap();
        assert!(check.passed);
        assert_eq!(check.final_hash, check.gold_hash);
        assert!(check.diff.is_empty());

        let bad = evaluator.evaluate(&run(vec![], ledger(2, 0), TerminationReason::AgentStop), &t, &domain());
        assert_eq!(bad.reward, 0.0);
        let check = bad.db_check.unwrap();
        assert!(!check.passed);
        assert_eq!(check.diff.len(), 1);
        assert_eq!(check.diff[0].path, "/stock/pear");
        assert_eq!(check.diff[0].expected, Some(json!(1)));
        assert_eq!(check.diff[0].actual, Some(json!(0)));
    }

    /// Without gold_db the gold state is the initial state with the expected
    /// actions replayed.
    #[test]
    fn test_gold_db_derived_from_expected_actions() {
        let t = task(json!({
            "reward_basis": ["DB"],
            "expected_actions": [{ "action_id": "a1", "name": "sell", "arguments": { "item": "apple" } }]
        }));
        let evaluator = Evaluator::new();
        let result = evaluator.evaluate(&run(sell("c1", "apple"), ledger(2, 1), TerminationReason::AgentStop), &t, &domain());
        assert_eq!(result.reward, 1.0);

        let untouched = evaluator.evaluate(&run(vec![], ledger(3, 1), TerminationReason::AgentStop), &t, &domain());
        assert_eq!(untouched.reward, 0.0);
    }

    #[test]
    fn test_reward_is_deterministic() {
        let t = task(json!({
            "reward_basis": ["DB", "ACTION", "COMMUNICATE"],
            "gold_db": ledger(2, 1),
            "expected_actions": [{ "action_id": "a1", "name": "sell", "arguments": { "item": "apple" } }],
            "communicate_info": ["2 apples"]
        }));
        let r = run(
            [sell("c1", "apple"), vec![say(Role::Agent, "You have 2 apples left.")]].concat(),
            ledger(2, 1),
            TerminationReason::UserStop,
        );
        let evaluator = Evaluator::new();
        let first = serde_json::to_value(evaluator.evaluate(&r, &t, &domain())).unwrap();
        let second = serde_json::to_value(evaluator.evaluate(&r, &t, &domain())).unwrap();
        assert_eq!(first, second);
        assert_eq!(first["reward"], json!(1.0));
    }

    // ── Action ───────────────────────────────────────────────────────────────

    #[test]
    fn test_ordered_actions_require_order() {
        let criteria = json!({
            "reward_basis": ["ACTION"],
            "action_ordering": "ordered",
            "expected_actions": [
                { "action_id": "a1", "name": "sell", "arguments": { "item": "pear" } },
                { "action_id": "a2", "name": "sell", "arguments": { "item": "apple" } }
            ]
        });
        let messages = [sell("c1", "apple"), sell("c2", "pear")].concat();
        let evaluator = Evaluator::new();

        let ordered = evaluator.evaluate(&run(messages.clone(), ledger(2, 0), TerminationReason::AgentStop), &task(criteria.clone()), &domain());
        let check = ordered.action_check.unwrap();
        assert!(!check.passed);
        assert_eq!(check.recall, 0.5);
        assert_eq!(check.matches[0].call_id.as_deref(), Some("c2"));

        let mut unordered = criteria;
        unordered["action_ordering"] = json!("unordered");
        let result = evaluator.evaluate(&run(messages, ledger(2, 0), TerminationReason::AgentStop), &task(unordered), &domain());
        assert_eq!(result.reward, 1.0);
    }

    #[test]
    fn test_compare_args_restricts_matching() {
        let t = task(json!({
            "reward_basis": ["ACTION"],
            "expected_actions": [{
                "action_id": "a1", "name": "sell",
                "arguments": { "item": "apple", "note": "ignored" },
                "compare_args": ["item"]
            }]
        }));
        let result = Evaluator::new().evaluate(&run(sell("c1", "apple"), ledger(2, 1), TerminationReason::AgentStop), &t, &domain());
        assert_eq!(result.reward, 1.0);
    }

    #[test]
    fn test_disallowed_action_fails_action_check() {
        let t = task(json!({
            "reward_basis": ["ACTION"],
            "expected_actions": [{ "action_id": "a1", "name": "sell", "arguments": { "item": "apple" } }],
            "disallowed_actions": ["sell"]
        }));
        let result = Evaluator::new().evaluate(&run(sell("c1", "apple"), ledger(2, 1), TerminationReason::AgentStop), &t, &domain());
        let check = result.action_check.unwrap();
        assert_eq!(check.recall, 1.0);
        assert_eq!(check.disallowed_calls, vec!["c1".to_string()]);
        assert_eq!(result.reward, 0.0);
    }

    // ── Assertions and communicate ───────────────────────────────────────────

    #[test]
    fn test_env_assertions_all_must_hold() {
        let t = task(json!({
            "reward_basis": ["ENV_ASSERTION"],
            "env_assertions": [
                { "name": "in_stock", "arguments": { "item": "apple" } },
                { "name": "in_stock", "arguments": { "item": "pear" }, "expected": false }
            ]
        }));
        let evaluator = Evaluator::new();
        let pass = evaluator.evaluate(&run(vec![], ledger(1, 0), TerminationReason::AgentStop), &t, &domain());
        assert_eq!(pass.reward, 1.0);
        assert_eq!(pass.env_assertions.len(), 2);

        let fail = evaluator.evaluate(&run(vec![], ledger(0, 0), TerminationReason::AgentStop), &t, &domain());
        assert_eq!(fail.reward, 0.0);
        assert_eq!(fail.env_assertions[0].actual, Some(false));
    }

    #[test]
    fn test_unknown_assertion_scores_zero_with_note() {
        let t = task(json!({
            "reward_basis": ["ENV_ASSERTION"],
            "env_assertions": [{ "name": "no_such_check" }]
        }));
        let result = Evaluator::new().evaluate(&run(vec![], ledger(3, 1), TerminationReason::AgentStop), &t, &domain());
        assert_eq!(result.reward, 0.0);
        assert_eq!(result.env_assertions[0].actual, None);
        assert!(result.notes.iter().any(|n| n.contains("no_such_check")));
    }

    #[test]
    fn test_communicate_ignores_case_and_commas_and_user_text() {
        let t = task(json!({
            "reward_basis": ["COMMUNICATE"],
            "communicate_info": ["1000 MB"]
        }));
        let evaluator = Evaluator::new();
        let agent_said = run(vec![say(Role::Agent, "I added 1,000 mb to your plan.")], ledger(3, 1), TerminationReason::AgentStop);
        assert_eq!(evaluator.evaluate(&agent_said, &t, &domain()).reward, 1.0);

        let user_said = run(vec![say(Role::User, "I want 1000 MB")], ledger(3, 1), TerminationReason::AgentStop);
        assert_eq!(evaluator.evaluate(&user_said, &t, &domain()).reward, 0.0);
    }

    // ── Combination ──────────────────────────────────────────────────────────

    fn mixed_criteria(combination: Value) -> Task {
        task(json!({
            "reward_basis": ["DB", "COMMUNICATE"],
            "gold_db": ledger(3, 1),
            "communicate_info": ["never said"],
            "combination": combination
        }))
    }

    #[test]
    fn test_builtin_combinations() {
        let r = run(vec![], ledger(3, 1), TerminationReason::AgentStop);
        let evaluator = Evaluator::new();
        assert_eq!(evaluator.evaluate(&r, &mixed_criteria(json!({ "kind": "all" })), &domain()).reward, 0.0);
        assert_eq!(evaluator.evaluate(&r, &mixed_criteria(json!({ "kind": "any" })), &domain()).reward, 1.0);
        let weighted = mixed_criteria(json!({ "kind": "weighted", "weights": { "DB": 3.0, "COMMUNICATE": 1.0 } }));
        assert!((evaluator.evaluate(&r, &weighted, &domain()).reward - 0.75).abs() < 1e-12);
    }

    struct DbOnly;

    impl RewardPolicy for DbOnly {
        fn name(&self) -> &str {
            "db_only"
        }

        fn combine(&self, components: &BTreeMap<RewardComponent, f64>) -> f64 {
            components.get(&RewardComponent::Db).copied().unwrap_or(0.0)
        }
    }

    #[test]
    fn test_custom_policy_registered_and_unregistered() {
        let r = run(vec![], ledger(3, 1), TerminationReason::AgentStop);
        let t = mixed_criteria(json!({ "kind": "custom", "name": "db_only" }));

        let unregistered = Evaluator::new().evaluate(&r, &t, &domain());
        assert_eq!(unregistered.reward, 0.0);
        assert!(unregistered.notes.iter().any(|n| n.contains("db_only")));

        let mut evaluator = Evaluator::new();
        evaluator.register_policy(Box::new(DbOnly));
        assert_eq!(evaluator.evaluate(&r, &t, &domain()).reward, 1.0);
    }

    // ── Termination and NL judgment ──────────────────────────────────────────

    #[test]
    fn test_premature_termination_is_flagged_but_scored() {
        let t = task(json!({ "reward_basis": ["DB"], "gold_db": ledger(3, 1) }));
        let result = Evaluator::new().evaluate(&run(vec![], ledger(3, 1), TerminationReason::MaxSteps), &t, &domain());
        assert!(result.premature_termination);
        assert_eq!(result.reward, 1.0);
    }

    #[test]
    fn test_missing_final_db_scores_zero() {
        let t = task(json!({ "reward_basis": ["DB"] }));
        let mut r = run(vec![], Value::Null, TerminationReason::FatalError);
        r.final_db = None;
        r.error = Some("setup error: bad snapshot".to_string());
        let result = Evaluator::new().evaluate(&r, &t, &domain());
        assert_eq!(result.reward, 0.0);
        assert!(result.premature_termination);
        assert!(result.db_check.is_none());
        assert!(result.notes.len() >= 2);
    }

    struct FixedJudge {
        fail: bool,
    }

    impl NlJudge for FixedJudge {
        fn name(&self) -> &str {
            "fixed"
        }

        fn judge(&self, _run: &SimulationRun, assertions: &[String]) -> TandemResult<NlJudgment> {
            if self.fail {
                return Err(TandemError::ParticipantFailed {
                    participant: "fixed".to_string(),
                    reason: "judge offline".to_string(),
                });
            }
            Ok(NlJudgment {
                judge: "fixed".to_string(),
                score: 0.0,
                checks: assertions
                    .iter()
                    .map(|a| NlAssertionCheck {
                        assertion: a.clone(),
                        met: false,
                        justification: None,
                    })
                    .collect(),
            })
        }
    }

    #[test]
    fn test_nl_judgment_never_changes_reward() {
        let t = task(json!({
            "reward_basis": ["DB", "NL_ASSERTION"],
            "gold_db": ledger(3, 1),
            "nl_assertions": ["agent was polite"]
        }));
        let r = run(vec![], ledger(3, 1), TerminationReason::AgentStop);

        let judged = Evaluator::new().with_judge(Box::new(FixedJudge { fail: false })).evaluate(&r, &t, &domain());
        assert_eq!(judged.reward, 1.0);
        let judgment = judged.nl_judgment.unwrap();
        assert_eq!(judgment.score, 0.0);
        assert_eq!(judgment.checks.len(), 1);
        assert!(!judged.components.contains_key(&RewardComponent::NlAssertion));

        let failed = Evaluator::new().with_judge(Box::new(FixedJudge { fail: true })).evaluate(&r, &t, &domain());
        assert_eq!(failed.reward, 1.0);
        assert!(failed.nl_judgment.is_none());
        assert!(failed.notes.iter().any(|n| n.contains("judge offline")));
    }

    // ── Metrics ──────────────────────────────────────────────────────────────

    #[test]
    fn test_summary_pass_hat_k() {
        let t = task(json!({ "reward_basis": ["DB"], "gold_db": ledger(3, 1) }));
        let evaluator = Evaluator::new();
        let mut runs = Vec::new();
        for (task_id, db) in [("a", ledger(3, 1)), ("a", ledger(0, 0)), ("b", ledger(3, 1)), ("b", ledger(3, 1))] {
            let mut r = run(vec![], db, TerminationReason::AgentStop);
            r.task_id = task_id.to_string();
            r.reward = Some(evaluator.evaluate(&r, &t, &domain()));
            runs.push(r);
        }

        let summary = summarize(&runs);
        assert_eq!(summary.runs, 4);
        assert_eq!(summary.tasks, 2);
        assert_eq!(summary.success_rate, 0.75);
        // Task a: 1 of 2 succeed; task b: 2 of 2.
        assert!((summary.pass_hat_k[&1] - 0.75).abs() < 1e-12);
        assert!((summary.pass_hat_k[&2] - 0.5).abs() < 1e-12);
        assert_eq!(summary.terminations["agent_stop"], 4);
    }
}
