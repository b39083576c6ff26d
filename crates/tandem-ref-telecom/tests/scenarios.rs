//! End-to-end runs of the telecom scenarios: orchestrate, trace, evaluate.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use serde_json::json;

use tandem_contracts::{
    error::TandemResult,
    message::{Draft, Message, Role},
    participant::{ParticipantId, ParticipantState},
    run::TerminationReason,
    task::{RewardComponent, Task},
};
use tandem_core::{config::RunConfig, traits::Participant};
use tandem_env::ToolDefinition;
use tandem_eval::{summarize, Evaluator};
use tandem_ref_telecom::{
    run_batch,
    scenarios::{self, airplane_mode, data_refuel, solo_refuel, AGENT, USER},
    BatchPlan, ScriptedParticipant,
};
use tandem_trace::InMemoryTraceWriter;

fn config() -> RunConfig {
    scenarios::default_config().unwrap()
}

// ── Airplane mode ────────────────────────────────────────────────────────────

#[test]
fn test_airplane_mode_is_fixed_by_the_user() {
    let trace = InMemoryTraceWriter::new();
    let run = airplane_mode::run_scenario(&config(), Some(Arc::new(trace.clone()))).unwrap();

    assert_eq!(run.termination_reason, TerminationReason::UserStop);
    assert!(run.error.is_none());
    assert_eq!(run.steps, 10);
    assert_eq!(run.messages.len(), 14);
    assert_eq!(run.errors, 0);

    // The toggle was issued by the user and answered for the user.
    let toggles: Vec<_> = run.tool_calls_by(Role::User).filter(|c| c.name == "toggle_airplane_mode").collect();
    assert_eq!(toggles.len(), 1);
    assert_eq!(run.final_db.as_ref().unwrap()["device"]["airplane_mode"], json!(false));

    let reward = run.reward.as_ref().unwrap();
    assert_eq!(reward.reward, 1.0, "notes: {:?}", reward.notes);
    assert!(!reward.premature_termination);
    assert_eq!(reward.components.len(), 3);

    let log = trace.export_log(&run.run_id).unwrap().unwrap();
    assert!(log.is_sealed());
    assert_eq!(log.events.len(), run.messages.len());
    assert!(trace.verify_integrity(&run.run_id).unwrap());
    assert_eq!(run.trace_hash, Some(log.terminal_hash.clone()));
}

#[test]
fn test_user_sees_status_bar_through_the_shared_database() {
    let run = airplane_mode::run_scenario(&config(), None).unwrap();
    let results: Vec<_> = run.messages.iter().flat_map(Message::tool_results).filter(|t| t.requestor == Role::User).collect();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].content["signal"], json!("airplane mode"));
    assert_eq!(results[2].content["signal"], json!("excellent"));
}

// ── Data refuel ──────────────────────────────────────────────────────────────

#[test]
fn test_agent_refuel_is_visible_on_the_users_device() {
    let run = data_refuel::run_scenario(&config(), None).unwrap();
    assert_eq!(run.termination_reason, TerminationReason::UserStop);

    let status = run
        .messages
        .iter()
        .flat_map(Message::tool_results)
        .find(|t| t.requestor == Role::User)
        .unwrap();
    assert_eq!(status.content["data"], json!("LTE"));
    assert_eq!(run.final_db.as_ref().unwrap()["lines"]["L1"]["data_limit_gb"], json!(12.0));

    let reward = run.reward.as_ref().unwrap();
    assert_eq!(reward.reward, 1.0, "notes: {:?}", reward.notes);
    assert!(reward.communicate_checks.iter().all(|c| c.found));
    assert_eq!(reward.components[&RewardComponent::Communicate], 1.0);
}

#[test]
fn test_missing_refuel_fails_db_with_field_diff() {
    let registry = scenarios::registry().unwrap();
    let task = registry.task(data_refuel::TASK_ID).unwrap();
    let mut run = data_refuel::run_scenario(&config(), None).unwrap();
    if let Some(db) = run.final_db.as_mut() {
        db["lines"]["L1"]["data_limit_gb"] = json!(10.0);
    }

    let reward = Evaluator::new().evaluate(&run, task, registry.domain());
    assert_eq!(reward.reward, 0.0);
    let check = reward.db_check.unwrap();
    assert!(!check.passed);
    assert_eq!(check.diff.len(), 1);
    assert_eq!(check.diff[0].path, "/lines/L1/data_limit_gb");
}

// ── Solo ─────────────────────────────────────────────────────────────────────

#[test]
fn test_solo_refuel_ends_with_done() {
    let run = solo_refuel::run_scenario(&config(), None).unwrap();
    assert!(run.solo);
    assert!(run.user_id.is_none());
    assert_eq!(run.termination_reason, TerminationReason::Done);
    assert_eq!(run.steps, 3);
    assert!(run.messages.iter().all(|m| m.role() == Some(Role::Agent)));

    let reward = run.reward.as_ref().unwrap();
    assert_eq!(reward.reward, 1.0, "notes: {:?}", reward.notes);
}

#[test]
fn test_step_budget_cuts_conversation_short() {
    let tight = RunConfig {
        max_steps: 3,
        ..config()
    };
    let run = airplane_mode::run_scenario(&tight, None).unwrap();
    assert_eq!(run.termination_reason, TerminationReason::MaxSteps);
    assert_eq!(run.steps, 3);

    let reward = run.reward.as_ref().unwrap();
    assert!(reward.premature_termination);
    assert_eq!(reward.reward, 0.0);
}

// ── Batch ────────────────────────────────────────────────────────────────────

#[test]
fn test_batch_runs_every_task_and_trial_in_order() {
    let registry = scenarios::registry().unwrap();
    let trace = InMemoryTraceWriter::new();
    let plan = BatchPlan {
        agent: AGENT.to_string(),
        user: Some(USER.to_string()),
        solo_tasks: scenarios::solo_tasks().into_iter().collect(),
        trials: 3,
    };
    let config = RunConfig {
        max_concurrency: 2,
        ..config()
    };

    let runs = run_batch(&registry, &Evaluator::new(), &plan, &config, Some(Arc::new(trace.clone()))).unwrap();
    assert_eq!(runs.len(), 9);
    assert_eq!(trace.run_count().unwrap(), 9);

    let order: Vec<(&str, u32)> = runs.iter().map(|r| (r.task_id.as_str(), r.trial)).collect();
    assert_eq!(order[0], ("airplane_mode", 0));
    assert_eq!(order[2], ("airplane_mode", 2));
    assert_eq!(order[8], ("solo_refuel", 2));
    assert_eq!(runs[4].seed, config.seed + 1);

    let ids: HashSet<_> = runs.iter().map(|r| r.run_id).collect();
    assert_eq!(ids.len(), 9);
    for run in &runs {
        assert!(trace.verify_integrity(&run.run_id).unwrap());
    }

    let summary = summarize(&runs);
    assert_eq!(summary.tasks, 3);
    assert_eq!(summary.success_rate, 1.0);
    assert_eq!(summary.pass_hat_k[&3], 1.0);
}

#[test]
fn test_batch_rejects_unknown_participant() {
    let registry = scenarios::registry().unwrap();
    let plan = BatchPlan {
        agent: "nobody".to_string(),
        user: None,
        solo_tasks: BTreeSet::new(),
        trials: 1,
    };
    assert!(run_batch(&registry, &Evaluator::new(), &plan, &config(), None).is_err());
}

/// The scripted agent, except that it crashes on its second turn of one task.
struct CrashingAgent {
    inner: ScriptedParticipant,
    crash_on: &'static str,
}

impl Participant for CrashingAgent {
    fn id(&self) -> ParticipantId {
        ParticipantId::new("crashing-agent")
    }

    fn initial_state(&self, task: &Task, tools: &[ToolDefinition], seed: u64) -> TandemResult<ParticipantState> {
        self.inner.initial_state(task, tools, seed)
    }

    fn next_message(&self, history: &[Message], state: ParticipantState) -> TandemResult<(Draft, ParticipantState)> {
        if state.context["task_id"] == json!(self.crash_on) && state.turns == 1 {
            panic!("agent crashed mid-conversation");
        }
        self.inner.next_message(history, state)
    }
}

#[test]
fn test_panicking_run_does_not_take_the_batch_down() {
    let mut registry = scenarios::registry().unwrap();
    registry
        .register_agent(Arc::new(CrashingAgent {
            inner: scenarios::scripted_agent(),
            crash_on: data_refuel::TASK_ID,
        }))
        .unwrap();
    let trace = InMemoryTraceWriter::new();
    let plan = BatchPlan {
        agent: "crashing-agent".to_string(),
        user: Some(USER.to_string()),
        solo_tasks: scenarios::solo_tasks().into_iter().collect(),
        trials: 2,
    };

    let runs = run_batch(&registry, &Evaluator::new(), &plan, &config(), Some(Arc::new(trace.clone()))).unwrap();
    assert_eq!(runs.len(), 6);

    for crashed in runs.iter().filter(|r| r.task_id == data_refuel::TASK_ID) {
        assert_eq!(crashed.termination_reason, TerminationReason::FatalError);
        assert!(crashed.error.as_deref().unwrap().contains("agent crashed mid-conversation"));
        // What happened before the crash is kept and the trace is sealed.
        assert_eq!(crashed.messages.len(), 2);
        assert!(crashed.final_db.is_some());
        assert!(trace.verify_integrity(&crashed.run_id).unwrap());
        assert!(crashed.trace_hash.is_some());

        let reward = crashed.reward.as_ref().unwrap();
        assert_eq!(reward.reward, 0.0);
        assert!(reward.premature_termination);
    }

    let survivors: Vec<_> = runs.iter().filter(|r| r.task_id != data_refuel::TASK_ID).collect();
    assert_eq!(survivors.len(), 4);
    for run in survivors {
        assert!(run.error.is_none(), "{}: {:?}", run.task_id, run.error);
        assert_eq!(run.reward.as_ref().unwrap().reward, 1.0);
    }
}

#[test]
fn test_identical_runs_hash_identically() {
    let first = data_refuel::run_scenario(&config(), None).unwrap();
    let second = data_refuel::run_scenario(&config(), None).unwrap();
    assert_eq!(first.final_db_hash, second.final_db_hash);
    assert_ne!(first.run_id, second.run_id);
}
