//! Configuration for an escrow ledger instance.

use serde::{Deserialize, Serialize};

use crate::{LockchannelError, Result, constants};

/// Tunables for one escrow ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscrowConfig {
    /// Minimum number of blocks between the current height and a deposit's lock.
    pub min_lock_margin: u64,
    /// Superseded roots remembered per map to tell stale witnesses from bad ones.
    pub root_history_size: usize,
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            min_lock_margin: constants::DEFAULT_MIN_LOCK_MARGIN,
            root_history_size: constants::DEFAULT_ROOT_HISTORY_SIZE,
        }
    }
}

impl EscrowConfig {
    /// Parse and validate a JSON config. Missing fields take their defaults.
    ///
    /// # Errors
    /// Returns [`LockchannelError::Configuration`] on malformed JSON or
    /// out-of-range values.
    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)
            .map_err(|e| LockchannelError::Configuration(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check value ranges.
    ///
    /// # Errors
    /// Returns [`LockchannelError::Configuration`] if a value is zero.
    pub fn validate(&self) -> Result<()> {
        if self.min_lock_margin == 0 {
            return Err(LockchannelError::Configuration(
                "min_lock_margin must be > 0".into(),
            ));
        }
        if self.root_history_size == 0 {
            return Err(LockchannelError::Configuration(
                "root_history_size must be > 0".into(),
            ));
        }
        Ok(())
    }
}
