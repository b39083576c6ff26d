//! The explicit registry of what a process can run.
//!
//! Built once at startup and passed to whatever launches runs: one domain,
//! the participants available to play agent and user, and the loaded tasks.
//! Every name is checked when it is registered, so lookups at run time can
//! only fail on names that were never registered.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use tandem_contracts::{
    error::{TandemError, TandemResult},
    task::Task,
};
use tandem_env::{database::Database, DomainRef};

use crate::{config::RunConfig, orchestrator::Orchestrator, traits::Participant};

pub struct Registry<D: Database> {
    domain: DomainRef<D>,
    agents: BTreeMap<String, Arc<dyn Participant>>,
    users: BTreeMap<String, Arc<dyn Participant>>,
    tasks: BTreeMap<String, Task>,
}

impl<D: Database> Registry<D> {
    pub fn new(domain: DomainRef<D>) -> Self {
        Self {
            domain,
            agents: BTreeMap::new(),
            users: BTreeMap::new(),
            tasks: BTreeMap::new(),
        }
    }

    pub fn domain(&self) -> &DomainRef<D> {
        &self.domain
    }

    /// Register `agent` under its participant id.
    pub fn register_agent(&mut self, agent: Arc<dyn Participant>) -> TandemResult<()> {
        insert_unique(&mut self.agents, "agent", agent.id().0, agent)
    }

    /// Register `user` under its participant id.
    pub fn register_user(&mut self, user: Arc<dyn Participant>) -> TandemResult<()> {
        insert_unique(&mut self.users, "user", user.id().0, user)
    }

    /// Validate and register `tasks`. Ids must be unique across the registry.
    pub fn register_tasks(&mut self, tasks: Vec<Task>) -> TandemResult<()> {
        for task in tasks {
            task.validate()?;
            insert_unique(&mut self.tasks, "task", task.task_id.clone(), task)?;
        }
        Ok(())
    }

    pub fn agent(&self, name: &str) -> TandemResult<Arc<dyn Participant>> {
        lookup(&self.agents, "agent", name).map(Arc::clone)
    }

    pub fn user(&self, name: &str) -> TandemResult<Arc<dyn Participant>> {
        lookup(&self.users, "user", name).map(Arc::clone)
    }

    pub fn task(&self, task_id: &str) -> TandemResult<&Task> {
        lookup(&self.tasks, "task", task_id)
    }

    /// Registered tasks in id order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    /// An orchestrator for `agent` and, unless `user` is `None`, `user`.
    ///
    /// `None` selects solo mode.
    pub fn orchestrator(
        &self,
        agent: &str,
        user: Option<&str>,
        config: RunConfig,
    ) -> TandemResult<Orchestrator<D>> {
        let agent = self.agent(agent)?;
        let domain = Arc::clone(&self.domain);
        Ok(match user {
            Some(name) => Orchestrator::new(domain, agent, self.user(name)?, config),
            None => Orchestrator::solo(domain, agent, config),
        })
    }
}

fn insert_unique<T>(map: &mut BTreeMap<String, T>, kind: &str, name: String, value: T) -> TandemResult<()> {
    if name.trim().is_empty() {
        return Err(TandemError::ConfigError {
            reason: format!("{kind} name must not be empty"),
        });
    }
    if map.contains_key(&name) {
        return Err(TandemError::ConfigError {
            reason: format!("{kind} '{name}' is already registered"),
        });
    }
    debug!(kind, name = %name, "registered");
    map.insert(name, value);
    Ok(())
}

fn lookup<'a, T>(map: &'a BTreeMap<String, T>, kind: &str, name: &str) -> TandemResult<&'a T> {
    map.get(name).ok_or_else(|| TandemError::ConfigError {
        reason: format!("no {kind} registered under '{name}'"),
    })
}
