//! Run configuration loaded from TOML.
//!
//! ```toml
//! max_steps = 200
//! max_errors = 10
//! seed = 7
//! max_concurrency = 4
//! ```
//!
//! Every field is optional; missing fields take the defaults below.

use std::path::Path;

use serde::{Deserialize, Serialize};

use tandem_contracts::error::{TandemError, TandemResult};

fn default_max_steps() -> u64 {
    200
}

fn default_max_errors() -> u64 {
    10
}

fn default_max_concurrency() -> usize {
    4
}

/// Budgets and scheduling knobs shared by every run of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// A run terminates with `max_steps` once this many steps were taken.
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,
    /// A run terminates with `max_errors` once this many protocol
    /// violations were recorded.
    #[serde(default = "default_max_errors")]
    pub max_errors: u64,
    /// Base seed recorded in run metadata; trial `n` uses `seed + n`.
    #[serde(default)]
    pub seed: u64,
    /// Upper bound on simultaneously executing runs in a batch.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_errors: default_max_errors(),
            seed: 0,
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl RunConfig {
    /// Parse `s` as TOML and validate the result.
    ///
    /// Returns `TandemError::ConfigError` if the TOML is malformed, carries
    /// unknown keys, or violates a bound checked by `validate()`.
    pub fn from_toml_str(s: &str) -> TandemResult<Self> {
        let config: RunConfig = toml::from_str(s).map_err(|e| TandemError::ConfigError {
            reason: format!("failed to parse run config TOML: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read the file at `path` and parse it as a run config.
    pub fn from_file(path: &Path) -> TandemResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| TandemError::ConfigError {
            reason: format!("failed to read run config '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Every budget must allow at least one unit.
    pub fn validate(&self) -> TandemResult<()> {
        let checks = [
            ("max_steps", self.max_steps >= 1),
            ("max_errors", self.max_errors >= 1),
            ("max_concurrency", self.max_concurrency >= 1),
        ];
        for (field, ok) in checks {
            if !ok {
                return Err(TandemError::ConfigError {
                    reason: format!("{field} must be at least 1"),
                });
            }
        }
        Ok(())
    }

    /// Seed recorded for trial `trial`.
    pub fn trial_seed(&self, trial: u32) -> u64 {
        self.seed.wrapping_add(u64::from(trial))
    }
}
