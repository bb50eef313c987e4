//! The authoritative root pair of an escrow ledger and its witness checks.

use lockchannel_ledger::{LeafValue, MerkleWitness};
use lockchannel_types::{Digest32, LedgerKey, LedgerRoots, LockchannelError, MapKind, Result};

use crate::root_history::RootHistory;

/// Current roots plus the recently superseded roots of each map.
///
/// Cloning a state is how the controller checkpoints before a multi-step
/// operation; restoring is plain assignment.
#[derive(Debug, Clone)]
pub struct LedgerState {
    roots: LedgerRoots,
    time_lock_history: RootHistory,
    balance_history: RootHistory,
}

impl LedgerState {
    /// Start from `roots`, remembering up to `history_size` superseded roots per map.
    #[must_use]
    pub fn new(roots: LedgerRoots, history_size: usize) -> Self {
        Self {
            roots,
            time_lock_history: RootHistory::new(history_size),
            balance_history: RootHistory::new(history_size),
        }
    }

    /// The current root pair.
    #[must_use]
    pub fn roots(&self) -> LedgerRoots {
        self.roots
    }

    /// Check that `witness` opens `expected_key` holding `value` under the
    /// current root of `map`.
    ///
    /// # Errors
    /// - `WitnessMismatch` if the witness opens another key or the value
    ///   does not match
    /// - `StaleRoot` if it matches a recently superseded root instead
    /// - `MalformedWitness` if the sibling path has the wrong length
    pub fn check_witness<V: LeafValue>(
        &self,
        map: MapKind,
        expected_key: &LedgerKey,
        value: &V,
        witness: &MerkleWitness,
    ) -> Result<()> {
        if witness.key() != expected_key {
            return Err(LockchannelError::WitnessMismatch {
                map,
                reason: format!("witness opens {} but {expected_key} was expected", witness.key()),
            });
        }
        let (computed, _) = witness.compute_root_and_key(value)?;
        let current = self.roots.root(map);
        if computed == current {
            return Ok(());
        }
        if self.history(map).contains(&computed) {
            tracing::warn!(
                map = %map,
                witness_root = hex::encode(computed),
                current_root = hex::encode(current),
                "Witness built against a superseded root"
            );
            return Err(LockchannelError::StaleRoot {
                map,
                witness_root: hex::encode(computed),
                current_root: hex::encode(current),
            });
        }
        Err(LockchannelError::WitnessMismatch {
            map,
            reason: format!(
                "value {} at {expected_key} does not match the current root",
                value.canonical()
            ),
        })
    }

    /// Replace both roots, remembering the ones that changed.
    pub fn commit(&mut self, next: LedgerRoots) {
        if next.time_lock_root != self.roots.time_lock_root {
            self.time_lock_history.record(self.roots.time_lock_root);
        }
        if next.balance_root != self.roots.balance_root {
            self.balance_history.record(self.roots.balance_root);
        }
        self.roots = next;
    }

    /// Whether `root` is a superseded root of `map` still in memory.
    #[must_use]
    pub fn is_superseded(&self, map: MapKind, root: &Digest32) -> bool {
        self.history(map).contains(root)
    }

    fn history(&self, map: MapKind) -> &RootHistory {
        match map {
            MapKind::TimeLock => &self.time_lock_history,
            MapKind::Balance => &self.balance_history,
        }
    }
}
