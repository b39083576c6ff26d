//! The dual-toolkit environment.
//!
//! An `Environment` owns exactly one database instance and two toolkits over
//! it: the agent's and, in domains that grant the user tools, the user's.
//! Both toolkits hold the same `SharedDb` handle, so a write through one is
//! visible to the other without any copy step. `sync()` remains as an
//! explicit checkpoint that verifies this sharing still holds.
//!
//! The environment never decides who may call what: `execute()` routes a
//! call to the toolkit of the role it is given, and the toolkit decides
//! whether the action and its arguments are valid.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use tandem_contracts::{
    error::{TandemError, TandemResult},
    message::{Message, Role, ToolCall},
    reward::FieldDiff,
    task::{EnvFunctionCall, InitialState},
};

use crate::{
    canonical::{content_hash, diff},
    database::{Database, SharedDb},
    domain::Domain,
    tool::{Assertion, ToolDefinition},
    toolkit::{ToolOutcome, Toolkit},
};

/// A shared, read-only domain definition.
pub type DomainRef<D> = Arc<dyn Domain<Db = D>>;

/// One run's world: a database plus the toolkits operating on it.
pub struct Environment<D: Database> {
    domain: DomainRef<D>,
    seed: u64,
    db: SharedDb<D>,
    agent_tools: Toolkit<D>,
    user_tools: Option<Toolkit<D>>,
    assertions: BTreeMap<String, Assertion<D>>,
}

impl<D: Database> Environment<D> {
    /// Build an environment holding the domain's default database for `seed`.
    ///
    /// Fails fast on duplicate tool or assertion names and on parameter
    /// schemas that do not compile.
    pub fn new(domain: DomainRef<D>, seed: u64) -> TandemResult<Self> {
        let db = SharedDb::new(domain.initial_db(seed));

        let agent_tools = Toolkit::new(Role::Agent, domain.agent_tools(), db.clone())?;
        let user_specs = domain.user_tools();
        let user_tools = if user_specs.is_empty() {
            None
        } else {
            Some(Toolkit::new(Role::User, user_specs, db.clone())?)
        };

        let mut assertions = BTreeMap::new();
        for assertion in domain.assertions() {
            if assertions.contains_key(&assertion.name) {
                return Err(TandemError::ConfigError {
                    reason: format!(
                        "domain '{}' declares assertion '{}' twice",
                        domain.name(),
                        assertion.name
                    ),
                });
            }
            assertions.insert(assertion.name.clone(), assertion);
        }

        Ok(Self {
            domain,
            seed,
            db,
            agent_tools,
            user_tools,
            assertions,
        })
    }

    /// Build an environment and bring it to the state `initial` describes.
    ///
    /// Any failure is reported as `SetupError`.
    pub fn from_initial_state(
        domain: DomainRef<D>,
        initial: &InitialState,
        seed: u64,
    ) -> TandemResult<Self> {
        let mut env = Self::new(domain, seed).map_err(as_setup_error)?;
        env.set_state(
            seed,
            initial.db_snapshot.as_ref(),
            &initial.initialization_actions,
            &initial.message_history,
        )?;
        Ok(env)
    }

    /// The seed the current database was built from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn has_user_tools(&self) -> bool {
        self.user_tools.is_some()
    }

    /// The toolkit bound to `role`, if that role has one.
    pub fn toolkit(&self, role: Role) -> Option<&Toolkit<D>> {
        match role {
            Role::Agent => Some(&self.agent_tools),
            Role::User => self.user_tools.as_ref(),
        }
    }

    /// Tool definitions visible to `role`; empty when it has no toolkit.
    pub fn tool_definitions(&self, role: Role) -> Vec<ToolDefinition> {
        self.toolkit(role).map(Toolkit::definitions).unwrap_or_default()
    }

    /// Rebuild the database from `snapshot`, or from the domain default for
    /// `seed`.
    ///
    /// The database instance is replaced in place, so both toolkits observe
    /// the new state immediately. Calling this twice with the same input
    /// yields the same `hash()`.
    pub fn reset(&mut self, seed: u64, snapshot: Option<&Value>) -> TandemResult<()> {
        let fresh = match snapshot {
            Some(s) => SharedDb::<D>::decode(s)?,
            None => self.domain.initial_db(seed),
        };
        self.db.replace(fresh)?;
        self.seed = seed;
        self.sync()?;
        debug!(
            domain = %self.domain.name(),
            seed,
            from_snapshot = snapshot.is_some(),
            "environment reset"
        );
        Ok(())
    }

    /// Execute `call` with the toolkit bound to `role`.
    ///
    /// Unknown actions, invalid arguments and handler failures come back as
    /// error-flagged outcomes. `Err` means the role has no toolkit or the
    /// environment itself is broken.
    pub fn execute(&self, role: Role, call: &ToolCall) -> TandemResult<ToolOutcome> {
        let toolkit = self.toolkit(role).ok_or_else(|| TandemError::ProtocolViolation {
            reason: format!(
                "{role} issued tool call '{}' but domain '{}' grants the {role} no tools",
                call.name,
                self.domain.name()
            ),
        })?;
        toolkit.execute(call)
    }

    /// Verify both toolkits still observe this environment's database.
    ///
    /// Visibility is automatic because the toolkits share one handle; this
    /// checkpoint turns a broken sharing invariant into a `FatalError`.
    pub fn sync(&self) -> TandemResult<()> {
        let views = std::iter::once(&self.agent_tools).chain(self.user_tools.as_ref());
        for toolkit in views {
            if !toolkit.db().same_instance(&self.db) {
                return Err(TandemError::FatalError {
                    reason: format!(
                        "{} toolkit is bound to a different database instance",
                        toolkit.role()
                    ),
                });
            }
        }
        Ok(())
    }

    /// Reset, run `initialization_actions`, then replay every tool call in
    /// `history`, checking each replayed result against the recorded one.
    ///
    /// The resulting state is a pure function of the inputs. Fails with
    /// `SetupError` when an action errors, a recorded result diverges, or a
    /// call and its result do not pair up.
    pub fn set_state(
        &mut self,
        seed: u64,
        snapshot: Option<&Value>,
        initialization_actions: &[EnvFunctionCall],
        history: &[Message],
    ) -> TandemResult<()> {
        self.reset(seed, snapshot).map_err(as_setup_error)?;

        for (i, action) in initialization_actions.iter().enumerate() {
            let call = ToolCall::new(format!("init-{i}"), action.name.clone(), action.arguments.clone())
                .by(action.requestor);
            let outcome = self.execute(action.requestor, &call).map_err(as_setup_error)?;
            if outcome.message.error {
                return Err(TandemError::SetupError {
                    reason: format!(
                        "initialization action '{}' failed: {}",
                        action.name, outcome.message.content
                    ),
                });
            }
        }

        self.replay(history)?;
        self.sync()?;

        info!(
            domain = %self.domain.name(),
            seed,
            init_actions = initialization_actions.len(),
            history_len = history.len(),
            "environment state set"
        );
        Ok(())
    }

    fn replay(&self, history: &[Message]) -> TandemResult<()> {
        let mut pending: BTreeMap<String, ToolOutcome> = BTreeMap::new();

        for message in history {
            let role = match message {
                Message::Assistant(_) => Some(Role::Agent),
                Message::User(_) => Some(Role::User),
                _ => None,
            };

            if let Some(role) = role {
                for call in message.tool_calls() {
                    if pending.contains_key(&call.id) {
                        return Err(TandemError::SetupError {
                            reason: format!("history reuses pending tool call id '{}'", call.id),
                        });
                    }
                    let outcome = self.execute(role, call).map_err(as_setup_error)?;
                    pending.insert(call.id.clone(), outcome);
                }
            }

            for recorded in message.tool_results() {
                let replayed = pending.remove(&recorded.id).ok_or_else(|| TandemError::SetupError {
                    reason: format!("history answers unknown tool call '{}'", recorded.id),
                })?;
                if replayed.message.content != recorded.content
                    || replayed.message.error != recorded.error
                {
                    warn!(
                        call_id = %recorded.id,
                        recorded = %recorded.content,
                        replayed = %replayed.message.content,
                        "replayed tool result diverges from history"
                    );
                    return Err(TandemError::SetupError {
                        reason: format!(
                            "replayed result of tool call '{}' diverges from the recorded result",
                            recorded.id
                        ),
                    });
                }
            }
        }

        if let Some(id) = pending.keys().next() {
            return Err(TandemError::SetupError {
                reason: format!("history leaves tool call '{id}' unanswered"),
            });
        }
        Ok(())
    }

    /// Canonical JSON snapshot of the database.
    pub fn snapshot(&self) -> TandemResult<Value> {
        self.db.snapshot()
    }

    /// Order-independent SHA-256 content hash of the database.
    pub fn hash(&self) -> TandemResult<String> {
        Ok(content_hash(&self.snapshot()?))
    }

    /// Fields where this database diverges from `gold`.
    pub fn diff(&self, gold: &Value) -> TandemResult<Vec<FieldDiff>> {
        Ok(diff(gold, &self.snapshot()?))
    }

    /// Evaluate a domain assertion against the current database.
    pub fn check_assertion(&self, name: &str, arguments: &Value) -> TandemResult<bool> {
        let assertion = self.assertions.get(name).ok_or_else(|| TandemError::ConfigError {
            reason: format!(
                "domain '{}' has no assertion named '{name}'",
                self.domain.name()
            ),
        })?;
        self.db
            .with(|db| (assertion.check)(db, arguments))?
            .map_err(|e| TandemError::ToolExecution {
                tool: name.to_string(),
                reason: e.to_string(),
            })
    }
}

fn as_setup_error(e: TandemError) -> TandemError {
    match e {
        TandemError::SetupError { .. } => e,
        other => TandemError::SetupError {
            reason: other.to_string(),
        },
    }
}
