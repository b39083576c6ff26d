//! The domain trait: what a concrete simulation world provides.

use crate::{
    database::Database,
    tool::{Assertion, Tool},
};

/// A simulation domain: a database type plus the actions and predicates
/// defined over it.
///
/// Implementations are constructed once at startup and shared read-only by
/// every run; each run builds its own `Environment` (and so its own
/// database) from it.
pub trait Domain: Send + Sync {
    type Db: Database;

    /// Stable domain name, recorded in run metadata.
    fn name(&self) -> &str;

    /// The database used when a task provides no snapshot.
    ///
    /// `seed` is the run's seed. The result must depend on nothing else, so
    /// that equal seeds rebuild equal databases.
    fn initial_db(&self, seed: u64) -> Self::Db;

    /// Actions the agent may call.
    fn agent_tools(&self) -> Vec<Tool<Self::Db>>;

    /// Actions the user may call. Empty means the user has no toolkit.
    fn user_tools(&self) -> Vec<Tool<Self::Db>> {
        Vec::new()
    }

    /// Predicates usable in `env_assertions`.
    fn assertions(&self) -> Vec<Assertion<Self::Db>> {
        Vec::new()
    }
}
