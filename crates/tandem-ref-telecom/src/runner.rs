//! Batch execution: every registered task × N trials, run concurrently.
//!
//! Runs share nothing mutable. Each job builds its own orchestrator and so
//! its own environment; the registry, evaluator and trace writer are shared
//! read-only (the trace writer keys its chains by run id). At most
//! `max_concurrency` runs execute at once.
//!
//! A panic inside one run (a participant, a domain handler, the evaluator)
//! is contained to that run: it is sealed as `fatal_error` with a zero
//! reward and the batch carries on.

use std::any::Any;
use std::collections::BTreeSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::{debug, error, info};

use tandem_contracts::{
    error::{TandemError, TandemResult},
    reward::RewardResult,
    run::SimulationRun,
    task::Task,
};
use tandem_core::{config::RunConfig, traits::TraceWriter, Orchestrator, Registry};
use tandem_env::database::Database;
use tandem_eval::Evaluator;

/// Who plays which task, and how often.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    pub agent: String,
    /// `None` runs every task solo.
    pub user: Option<String>,
    /// Tasks run solo even when `user` is set.
    pub solo_tasks: BTreeSet<String>,
    pub trials: u32,
}

impl BatchPlan {
    fn user_for(&self, task: &Task) -> Option<&str> {
        if self.solo_tasks.contains(&task.task_id) {
            None
        } else {
            self.user.as_deref()
        }
    }
}

/// Run and score every registered task `plan.trials` times.
///
/// Results are ordered by task id, then trial. Participant names are checked
/// before any run starts.
pub fn run_batch<D: Database>(
    registry: &Registry<D>,
    evaluator: &Evaluator,
    plan: &BatchPlan,
    config: &RunConfig,
    trace: Option<Arc<dyn TraceWriter>>,
) -> TandemResult<Vec<SimulationRun>> {
    config.validate()?;
    registry.agent(&plan.agent)?;
    if let Some(user) = &plan.user {
        registry.user(user)?;
    }

    let jobs: Vec<(&Task, u32)> = registry
        .tasks()
        .flat_map(|task| (0..plan.trials).map(move |trial| (task, trial)))
        .collect();
    let workers = config.max_concurrency.min(jobs.len());
    info!(runs = jobs.len(), workers, "batch started");

    let next = AtomicUsize::new(0);
    let (jobs, next, trace) = (&jobs, &next, &trace);

    let mut finished: Vec<(usize, SimulationRun)> = thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                scope.spawn(move || -> TandemResult<Vec<(usize, SimulationRun)>> {
                    let mut done = Vec::new();
                    loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);
                        let Some(&(task, trial)) = jobs.get(index) else {
                            break;
                        };
                        debug!(worker, task_id = %task.task_id, trial, "run picked up");

                        let mut orchestrator = registry
                            .orchestrator(&plan.agent, plan.user_for(task), config.clone())?
                            .with_trial(trial);
                        if let Some(trace) = trace {
                            orchestrator = orchestrator.with_trace(Arc::clone(trace));
                        }
                        done.push((index, run_contained(&mut orchestrator, registry, evaluator, task)));
                    }
                    Ok(done)
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| {
                handle.join().map_err(|_| TandemError::FatalError {
                    reason: "batch worker panicked".to_string(),
                })?
            })
            .collect::<TandemResult<Vec<_>>>()
    })?
    .into_iter()
    .flatten()
    .collect();

    finished.sort_by_key(|(index, _)| *index);
    info!(runs = finished.len(), "batch finished");
    Ok(finished.into_iter().map(|(_, run)| run).collect())
}

/// Run and score `task`, turning a panic into a sealed `fatal_error` run.
fn run_contained<D: Database>(
    orchestrator: &mut Orchestrator<D>,
    registry: &Registry<D>,
    evaluator: &Evaluator,
    task: &Task,
) -> SimulationRun {
    let basis = || task.evaluation_criteria.reward_basis.clone();

    let mut run = match panic::catch_unwind(AssertUnwindSafe(|| orchestrator.run(task))) {
        Ok(run) => run,
        Err(payload) => {
            let reason = format!("run panicked: {}", panic_message(&*payload));
            error!(task_id = %task.task_id, reason = %reason, "run aborted by panic");
            let mut run = orchestrator.abort(task, reason.clone());
            let mut reward = RewardResult::zero(basis(), reason);
            reward.premature_termination = true;
            run.reward = Some(reward);
            return run;
        }
    };

    let scored = panic::catch_unwind(AssertUnwindSafe(|| {
        evaluator.evaluate(&run, task, registry.domain())
    }));
    run.reward = Some(scored.unwrap_or_else(|payload| {
        let reason = format!("evaluation panicked: {}", panic_message(&*payload));
        error!(run_id = %run.run_id.0, task_id = %task.task_id, reason = %reason, "evaluation aborted by panic");
        RewardResult::zero(basis(), reason)
    }));
    run
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
