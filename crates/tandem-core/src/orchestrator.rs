//! The orchestrator: the dual-control protocol state machine.
//!
//! A run moves through
//!
//!   Init → AgentTurn ⇄ UserTurn → Terminated(reason)
//!
//! and `step()` is the only transition primitive. Each step asks exactly one
//! participant for a draft and then does one of:
//!
//! - **violation**: the draft breaks the protocol. It is not appended; the
//!   error counter grows and, while under budget, a `System` notice addressed
//!   to the offender is appended so it can correct itself.
//! - **stop**: the draft is the participant's stop signal. It is appended and
//!   the run ends with `agent_stop` / `user_stop`.
//! - **text**: appended; the turn passes to the other role.
//! - **tool calls**: appended, dispatched in order to the caller's toolkit,
//!   answered by one result message; the caller keeps the turn unless a
//!   result signalled a handoff or completion.
//!
//! Budgets are checked after every step. Tool execution errors are ordinary
//! results and never touch the error budget.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use tandem_contracts::{
    error::{TandemError, TandemResult},
    message::{ChatMessage, Message, Role, SystemMessage, ToolMessage},
    participant::{ParticipantState, RunId},
    run::{SimulationRun, TerminationReason, TraceRecord, Violation},
    task::Task,
};
use tandem_env::{database::Database, DomainRef, Environment, ToolSignal};

use crate::{
    config::RunConfig,
    protocol::{self, DraftContext},
    traits::{Participant, TraceWriter},
};

/// Where a run stands between two steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    AgentTurn,
    UserTurn,
    Terminated(TerminationReason),
}

impl Phase {
    fn turn(role: Role) -> Self {
        match role {
            Role::Agent => Phase::AgentTurn,
            Role::User => Phase::UserTurn,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Terminated(_))
    }
}

/// Everything owned by one in-flight run.
struct Session<D: Database> {
    run: SimulationRun,
    env: Environment<D>,
    phase: Phase,
    agent_state: Option<ParticipantState>,
    user_state: Option<ParticipantState>,
    issued_call_ids: BTreeSet<String>,
}

/// Drives runs of one domain with one agent and, in dual control, one user.
///
/// Construct once and reuse for several sequential runs; every run builds a
/// fresh `Environment`. Runs of one orchestrator never overlap: concurrency
/// comes from using one orchestrator per thread.
pub struct Orchestrator<D: Database> {
    domain: DomainRef<D>,
    agent: Arc<dyn Participant>,
    user: Option<Arc<dyn Participant>>,
    config: RunConfig,
    trace: Option<Arc<dyn TraceWriter>>,
    trial: u32,
    session: Option<Session<D>>,
}

impl<D: Database> Orchestrator<D> {
    /// A dual-control orchestrator: agent and user take turns.
    pub fn new(
        domain: DomainRef<D>,
        agent: Arc<dyn Participant>,
        user: Arc<dyn Participant>,
        config: RunConfig,
    ) -> Self {
        Self {
            domain,
            agent,
            user: Some(user),
            config,
            trace: None,
            trial: 0,
            session: None,
        }
    }

    /// A solo-mode orchestrator: no user, the agent may only call tools or stop.
    pub fn solo(domain: DomainRef<D>, agent: Arc<dyn Participant>, config: RunConfig) -> Self {
        Self {
            domain,
            agent,
            user: None,
            config,
            trace: None,
            trial: 0,
            session: None,
        }
    }

    /// Write every appended message of every run to `trace`.
    pub fn with_trace(mut self, trace: Arc<dyn TraceWriter>) -> Self {
        self.trace = Some(trace);
        self
    }

    /// Record subsequent runs as trial `trial` (seed = `config.seed + trial`).
    pub fn with_trial(mut self, trial: u32) -> Self {
        self.trial = trial;
        self
    }

    pub fn is_solo(&self) -> bool {
        self.user.is_none()
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// The current phase; `Init` when no run is in flight.
    pub fn phase(&self) -> Phase {
        self.session.as_ref().map_or(Phase::Init, |s| s.phase)
    }

    /// The history of the run in flight.
    pub fn history(&self) -> &[Message] {
        self.session.as_ref().map_or(&[], |s| s.run.messages.as_slice())
    }

    /// The environment of the run in flight.
    pub fn environment(&self) -> Option<&Environment<D>> {
        self.session.as_ref().map(|s| &s.env)
    }

    // ── Initialization ───────────────────────────────────────────────────────

    /// Prepare a run of `task`.
    ///
    /// Builds the environment from the task's initial state, seeds the
    /// history, asks both participants for their initial private state and
    /// sets the opening turn. Any failure is a `SetupError`; the previous run,
    /// if unsealed, is discarded.
    pub fn initialize(&mut self, task: &Task) -> TandemResult<()> {
        self.session = None;
        let run_id = RunId::new();
        let run = self.blank_run(run_id, task);
        let session = self.prepare(task, run).map_err(|e| match e {
            TandemError::SetupError { .. } => e,
            other => TandemError::SetupError {
                reason: other.to_string(),
            },
        })?;

        info!(
            run_id = %run_id.0,
            task_id = %task.task_id,
            domain = %self.domain.name(),
            solo = self.is_solo(),
            phase = ?session.phase,
            seeded_messages = session.run.messages.len(),
            "run initialized"
        );
        self.session = Some(session);
        Ok(())
    }

    fn prepare(&self, task: &Task, run: SimulationRun) -> TandemResult<Session<D>> {
        task.validate()?;

        let initial = &task.initial_state;
        protocol::check_history(&initial.message_history)?;
        let seed = run.seed;
        let env = Environment::from_initial_state(Arc::clone(&self.domain), initial, seed)?;

        let agent_state = self
            .agent
            .initial_state(task, &env.tool_definitions(Role::Agent), seed)?;
        let user_state = match &self.user {
            Some(user) => Some(user.initial_state(task, &env.tool_definitions(Role::User), seed)?),
            None => None,
        };

        let issued_call_ids = initial
            .message_history
            .iter()
            .flat_map(|m| m.tool_calls())
            .map(|c| c.id.clone())
            .collect();

        let mut session = Session {
            run,
            env,
            phase: Phase::Init,
            agent_state: Some(agent_state),
            user_state,
            issued_call_ids,
        };
        for message in &initial.message_history {
            session.append(message.clone(), self.trace.as_deref())?;
        }
        session.phase = Phase::turn(protocol::opening_role(initial, self.is_solo()));
        Ok(session)
    }

    fn blank_run(&self, run_id: RunId, task: &Task) -> SimulationRun {
        let now = Utc::now();
        SimulationRun {
            run_id,
            task_id: task.task_id.clone(),
            trial: self.trial,
            seed: self.config.trial_seed(self.trial),
            domain: self.domain.name().to_string(),
            agent_id: self.agent.id(),
            user_id: self.user.as_ref().map(|u| u.id()),
            solo: self.is_solo(),
            messages: Vec::new(),
            termination_reason: TerminationReason::FatalError,
            final_db: None,
            final_db_hash: None,
            steps: 0,
            errors: 0,
            violations: Vec::new(),
            trace_hash: None,
            error: None,
            started_at: now,
            ended_at: now,
            reward: None,
        }
    }

    // ── Stepping ─────────────────────────────────────────────────────────────

    /// Execute one step of the run in flight and return the new phase.
    ///
    /// Participant failures and broken environment invariants end the run
    /// with `fatal_error` and are reported through the returned phase.
    /// `Err` is returned only when there is no active run to step.
    pub fn step(&mut self) -> TandemResult<Phase> {
        let session = self.session.as_mut().ok_or_else(|| TandemError::StateMachineError {
            reason: "step() called before initialize()".to_string(),
        })?;
        let role = match session.phase {
            Phase::AgentTurn => Role::Agent,
            Phase::UserTurn => Role::User,
            Phase::Init => {
                return Err(TandemError::StateMachineError {
                    reason: "run has not been initialized".to_string(),
                })
            }
            Phase::Terminated(reason) => {
                return Err(TandemError::StateMachineError {
                    reason: format!("run already terminated with {reason}"),
                })
            }
        };
        let participant = match role {
            Role::Agent => Arc::clone(&self.agent),
            Role::User => match &self.user {
                Some(user) => Arc::clone(user),
                None => {
                    return Err(TandemError::StateMachineError {
                        reason: "user turn in a solo run".to_string(),
                    })
                }
            },
        };

        session.run.steps += 1;
        let trace = self.trace.as_deref();
        let solo = self.user.is_none();

        if let Err(e) = session.take_turn(role, participant.as_ref(), solo, self.config.max_errors, trace) {
            session.fail(e);
        }
        if !session.phase.is_terminal() {
            session.check_budgets(&self.config);
        }
        Ok(session.phase)
    }

    // ── Sealing ──────────────────────────────────────────────────────────────

    /// Close the terminated run and return its trajectory.
    ///
    /// Records the final database snapshot and hash and seals the trace.
    pub fn seal(&mut self) -> TandemResult<SimulationRun> {
        match self.phase() {
            Phase::Terminated(_) => {}
            other => {
                return Err(TandemError::StateMachineError {
                    reason: format!("cannot seal a run in phase {other:?}"),
                })
            }
        }
        let Some(session) = self.session.take() else {
            return Err(TandemError::StateMachineError {
                reason: "no run to seal".to_string(),
            });
        };
        let mut run = session.run;

        match session.env.snapshot() {
            Ok(snapshot) => {
                run.final_db_hash = Some(tandem_env::canonical::content_hash(&snapshot));
                run.final_db = Some(snapshot);
            }
            Err(e) => {
                run.error.get_or_insert_with(|| e.to_string());
            }
        }

        if let Some(trace) = &self.trace {
            match trace.seal(&run.run_id, run.termination_reason) {
                Ok(hash) => run.trace_hash = hash,
                Err(e) => {
                    warn!(run_id = %run.run_id.0, reason = %e, "trace seal failed");
                    run.error.get_or_insert_with(|| e.to_string());
                }
            }
        }

        run.ended_at = Utc::now();
        info!(
            run_id = %run.run_id.0,
            task_id = %run.task_id,
            reason = %run.termination_reason,
            steps = run.steps,
            errors = run.errors,
            messages = run.messages.len(),
            "run sealed"
        );
        Ok(run)
    }

    /// Initialize, step until terminal, seal.
    ///
    /// Always returns a run: a setup failure yields a `fatal_error` run with
    /// the failure recorded in `error` and no messages.
    pub fn run(&mut self, task: &Task) -> SimulationRun {
        if let Err(e) = self.initialize(task) {
            warn!(task_id = %task.task_id, reason = %e, "run setup failed");
            return self.failed_run(task, e.to_string());
        }

        loop {
            match self.step() {
                Ok(Phase::Terminated(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    if let Some(session) = self.session.as_mut() {
                        session.fail(e);
                    }
                    break;
                }
            }
        }

        match self.seal() {
            Ok(run) => run,
            Err(e) => self.failed_run(task, e.to_string()),
        }
    }

    /// End the run in flight with `fatal_error` and seal what it recorded.
    ///
    /// For runs interrupted from outside the state machine, such as a
    /// participant that panicked. Without a run in flight the result is an
    /// empty `fatal_error` run of `task`.
    pub fn abort(&mut self, task: &Task, reason: impl Into<String>) -> SimulationRun {
        let reason = reason.into();
        let Some(session) = self.session.as_mut() else {
            return self.failed_run(task, reason);
        };
        session.fail(TandemError::FatalError { reason });
        match self.seal() {
            Ok(run) => run,
            Err(e) => self.failed_run(task, e.to_string()),
        }
    }

    fn failed_run(&self, task: &Task, error: String) -> SimulationRun {
        let mut run = self.blank_run(RunId::new(), task);
        run.error = Some(error);
        run.ended_at = Utc::now();
        run
    }
}

impl<D: Database> Session<D> {
    fn take_turn(
        &mut self,
        role: Role,
        participant: &dyn Participant,
        solo: bool,
        max_errors: u64,
        trace: Option<&dyn TraceWriter>,
    ) -> TandemResult<()> {
        let run_id = self.run.run_id;
        let step = self.run.steps;

        // ── Ask the owning participant ───────────────────────────────────────
        let state = match role {
            Role::Agent => self.agent_state.take(),
            Role::User => self.user_state.take(),
        }
        .ok_or_else(|| TandemError::FatalError {
            reason: format!("{role} private state is missing"),
        })?;

        let (draft, next_state) = participant
            .next_message(&self.run.messages, state)
            .map_err(|e| TandemError::ParticipantFailed {
                participant: participant.id().0,
                reason: e.to_string(),
            })?;
        match role {
            Role::Agent => self.agent_state = Some(next_state),
            Role::User => self.user_state = Some(next_state),
        }

        // ── Validate ─────────────────────────────────────────────────────────
        let is_stop = participant.is_stop(&draft);
        let ctx = DraftContext {
            role,
            solo,
            user_has_tools: self.env.has_user_tools(),
            issued_call_ids: &self.issued_call_ids,
            is_stop,
        };
        if let Err(reason) = protocol::validate_draft(&draft, &ctx) {
            return self.record_violation(role, reason, max_errors, trace);
        }

        // ── Stop ─────────────────────────────────────────────────────────────
        if is_stop {
            let message = chat_message(role, ChatMessage::from_draft(draft, role, 0));
            self.append(message, trace)?;
            info!(run_id = %run_id.0, step, role = %role, "participant sent stop signal");
            self.terminate(TerminationReason::stop_by(role));
            return Ok(());
        }

        // ── Text ─────────────────────────────────────────────────────────────
        if !draft.is_tool_call() {
            let message = chat_message(role, ChatMessage::from_draft(draft, role, 0));
            self.append(message, trace)?;
            debug!(run_id = %run_id.0, step, role = %role, "text forwarded");
            self.phase = Phase::turn(role.other());
            return Ok(());
        }

        // ── Tool dispatch ────────────────────────────────────────────────────
        let chat = ChatMessage::from_draft(draft, role, 0);
        let calls = chat.tool_calls.clone();
        self.issued_call_ids.extend(calls.iter().map(|c| c.id.clone()));
        self.append(chat_message(role, chat), trace)?;

        // A broken environment still answers every call, so the history
        // stays paired; the calls after the failure are not executed.
        let mut results = Vec::with_capacity(calls.len());
        let mut signal = ToolSignal::Continue;
        let mut failure: Option<TandemError> = None;
        for call in &calls {
            if let Some(e) = &failure {
                results.push(ToolMessage::failed(call, format!("not executed: {e}")));
                continue;
            }
            match self.env.execute(role, call) {
                Ok(outcome) => {
                    if signal == ToolSignal::Continue {
                        signal = outcome.signal;
                    }
                    results.push(outcome.message);
                }
                Err(e) => {
                    results.push(ToolMessage::failed(call, e.to_string()));
                    failure = Some(e);
                }
            }
        }
        debug!(
            run_id = %run_id.0,
            step,
            role = %role,
            calls = calls.len(),
            signal = ?signal,
            "tool calls dispatched"
        );
        self.append(Message::from_results(results, 0), trace)?;
        if let Some(e) = failure {
            return Err(e);
        }
        self.env.sync()?;

        match signal {
            ToolSignal::Continue => self.phase = Phase::turn(role),
            ToolSignal::Handoff if !solo => self.phase = Phase::turn(role.other()),
            ToolSignal::Handoff | ToolSignal::Done => {
                info!(run_id = %run_id.0, step, role = %role, "environment signalled completion");
                self.terminate(TerminationReason::Done);
            }
        }
        Ok(())
    }

    fn record_violation(
        &mut self,
        role: Role,
        reason: String,
        max_errors: u64,
        trace: Option<&dyn TraceWriter>,
    ) -> TandemResult<()> {
        self.run.errors += 1;
        warn!(
            run_id = %self.run.run_id.0,
            step = self.run.steps,
            role = %role,
            errors = self.run.errors,
            reason = %reason,
            "protocol violation"
        );
        self.run.violations.push(Violation {
            step: self.run.steps,
            role,
            reason: reason.clone(),
        });
        // Over budget the run ends with this step; no notice is needed.
        if self.run.errors < max_errors {
            let notice = Message::System(SystemMessage {
                recipient: Some(role),
                content: format!("protocol error: {reason}"),
                turn_idx: 0,
            });
            self.append(notice, trace)?;
        }
        Ok(())
    }

    fn check_budgets(&mut self, config: &RunConfig) {
        let reason = if self.run.errors >= config.max_errors {
            Some(TerminationReason::MaxErrors)
        } else if self.run.steps >= config.max_steps {
            Some(TerminationReason::MaxSteps)
        } else {
            None
        };
        if let Some(reason) = reason {
            info!(
                run_id = %self.run.run_id.0,
                steps = self.run.steps,
                errors = self.run.errors,
                reason = %reason,
                "budget exhausted"
            );
            self.terminate(reason);
        }
    }

    fn append(&mut self, mut message: Message, trace: Option<&dyn TraceWriter>) -> TandemResult<()> {
        let turn_idx = self.run.messages.len() as u64;
        stamp_turn(&mut message, turn_idx);
        if let Some(trace) = trace {
            let record = TraceRecord {
                step: self.run.steps,
                message: message.clone(),
                timestamp: Utc::now(),
            };
            trace.write(&self.run.run_id, &record)?;
        }
        self.run.messages.push(message);
        Ok(())
    }

    fn terminate(&mut self, reason: TerminationReason) {
        self.run.termination_reason = reason;
        self.phase = Phase::Terminated(reason);
    }

    fn fail(&mut self, error: TandemError) {
        warn!(
            run_id = %self.run.run_id.0,
            step = self.run.steps,
            reason = %error,
            "run aborted"
        );
        self.run.error = Some(error.to_string());
        self.terminate(TerminationReason::FatalError);
    }
}

fn chat_message(role: Role, chat: ChatMessage) -> Message {
    match role {
        Role::Agent => Message::Assistant(chat),
        Role::User => Message::User(chat),
    }
}

fn stamp_turn(message: &mut Message, turn_idx: u64) {
    match message {
        Message::Assistant(m) | Message::User(m) => m.turn_idx = turn_idx,
        Message::Tool(t) => t.turn_idx = turn_idx,
        Message::MultiTool(m) => {
            m.turn_idx = turn_idx;
            for t in &mut m.tool_messages {
                t.turn_idx = turn_idx;
            }
        }
        Message::System(s) => s.turn_idx = turn_idx,
    }
}
