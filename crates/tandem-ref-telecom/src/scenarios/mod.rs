//! Telecom reference scenarios.
//!
//! Each scenario module holds the scripts both participants replay for one
//! task of `tasks/telecom.json`, plus a runner that executes and scores that
//! task. This module wires the shared pieces: the embedded task file, the
//! default run budgets, the registry and the evaluator.

pub mod airplane_mode;
pub mod data_refuel;
pub mod solo_refuel;

use std::sync::Arc;

use tandem_contracts::{error::TandemResult, message::Role, run::SimulationRun, task::Task};
use tandem_core::{config::RunConfig, tasks::parse_tasks, traits::TraceWriter, Registry};
use tandem_eval::Evaluator;

use crate::{db::TelecomDb, domain::TelecomDomain, participant::ScriptedParticipant};

const TASKS_JSON: &str = include_str!("../../tasks/telecom.json");

/// Run budgets used when no config file is given.
pub const DEFAULT_CONFIG: &str = include_str!("../../config/run.toml");

pub const AGENT: &str = "scripted-agent";
pub const USER: &str = "scripted-user";

pub fn default_config() -> TandemResult<RunConfig> {
    RunConfig::from_toml_str(DEFAULT_CONFIG)
}

/// The embedded telecom tasks, validated.
pub fn tasks() -> TandemResult<Vec<Task>> {
    parse_tasks(TASKS_JSON)
}

/// One agent serving every scenario.
pub fn scripted_agent() -> ScriptedParticipant {
    ScriptedParticipant::new(AGENT, Role::Agent)
        .with_script(airplane_mode::TASK_ID, airplane_mode::agent_script())
        .with_script(data_refuel::TASK_ID, data_refuel::agent_script())
        .with_script(solo_refuel::TASK_ID, solo_refuel::agent_script())
}

/// One user serving every dual-control scenario.
pub fn scripted_user() -> ScriptedParticipant {
    ScriptedParticipant::new(USER, Role::User)
        .with_script(airplane_mode::TASK_ID, airplane_mode::user_script())
        .with_script(data_refuel::TASK_ID, data_refuel::user_script())
}

/// Tasks that run without a user.
pub fn solo_tasks() -> Vec<String> {
    vec![solo_refuel::TASK_ID.to_string()]
}

/// Domain, scripted participants and tasks, registered once.
pub fn registry() -> TandemResult<Registry<TelecomDb>> {
    let mut registry = Registry::new(Arc::new(TelecomDomain));
    registry.register_agent(Arc::new(scripted_agent()))?;
    registry.register_user(Arc::new(scripted_user()))?;
    registry.register_tasks(tasks()?)?;
    Ok(registry)
}

/// Run `task_id` once and attach its reward.
///
/// `solo` drops the user and runs the agent alone.
pub fn run_task(
    task_id: &str,
    solo: bool,
    config: &RunConfig,
    trace: Option<Arc<dyn TraceWriter>>,
) -> TandemResult<SimulationRun> {
    let registry = registry()?;
    let task = registry.task(task_id)?;
    let user = if solo { None } else { Some(USER) };

    let mut orchestrator = registry.orchestrator(AGENT, user, config.clone())?;
    if let Some(trace) = trace {
        orchestrator = orchestrator.with_trace(trace);
    }
    let mut run = orchestrator.run(task);
    run.reward = Some(Evaluator::new().evaluate(&run, task, registry.domain()));
    Ok(run)
}
