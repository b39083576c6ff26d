//! The shared database handle.
//!
//! A domain's database is any serde-serializable, clonable type. The
//! environment wraps exactly one instance in a `SharedDb`, and both
//! toolkits hold clones of that same handle, so a mutation through either
//! toolkit is visible to the other on its next read.

use std::sync::{Arc, Mutex};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use tandem_contracts::error::{TandemError, TandemResult};

/// Marker for types usable as a domain database.
///
/// Hashing and comparison go through the serialized form, so the type
/// needs nothing beyond serde support and `Clone` (for resets).
pub trait Database: Serialize + DeserializeOwned + Clone + Send + 'static {}

impl<T> Database for T where T: Serialize + DeserializeOwned + Clone + Send + 'static {}

/// A reference-counted handle to one database instance.
pub struct SharedDb<D> {
    inner: Arc<Mutex<D>>,
}

impl<D> Clone for SharedDb<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: Database> SharedDb<D> {
    pub fn new(db: D) -> Self {
        Self {
            inner: Arc::new(Mutex::new(db)),
        }
    }

    /// Run `f` with read access to the database.
    pub fn with<R>(&self, f: impl FnOnce(&D) -> R) -> TandemResult<R> {
        let guard = self.inner.lock().map_err(|e| TandemError::FatalError {
            reason: format!("database lock poisoned: {}", e),
        })?;
        Ok(f(&guard))
    }

    /// Run `f` with write access to the database.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut D) -> R) -> TandemResult<R> {
        let mut guard = self.inner.lock().map_err(|e| TandemError::FatalError {
            reason: format!("database lock poisoned: {}", e),
        })?;
        Ok(f(&mut guard))
    }

    /// Swap the contents in place. Every holder of this handle sees the new state.
    pub fn replace(&self, db: D) -> TandemResult<()> {
        self.with_mut(|current| *current = db)
    }

    /// True when both handles point at the same instance.
    pub fn same_instance(&self, other: &SharedDb<D>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// The database serialized to JSON.
    pub fn snapshot(&self) -> TandemResult<Value> {
        self.with(|db| serde_json::to_value(db))?
            .map_err(|e| TandemError::FatalError {
                reason: format!("database is not serializable: {}", e),
            })
    }

    /// A database decoded from a JSON snapshot.
    pub fn decode(snapshot: &Value) -> TandemResult<D> {
        serde_json::from_value(snapshot.clone()).map_err(|e| TandemError::SetupError {
            reason: format!("snapshot does not match the domain database schema: {}", e),
        })
    }
}
