//! Merkle witnesses: the sibling path that proves one leaf against a root.
//!
//! A witness is independent of the leaf's value. The same witness proves the
//! current value against the current root and, fed a new value, yields the
//! root after a single-leaf update. This is how the ledger mutates state it
//! does not store.

use lockchannel_types::{
    Digest32, LedgerKey, LockchannelError, Result, constants::MERKLE_DEPTH,
};
use serde::{Deserialize, Serialize};

use crate::hashing::{LeafValue, leaf_hash, node_hash, path_bit};

/// Sibling digests from leaf level to just below the root.
///
/// `siblings[h]` is the sibling of the path node at height `h`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleWitness {
    key: LedgerKey,
    siblings: Vec<Digest32>,
}

impl MerkleWitness {
    /// Build a witness from an externally supplied sibling path.
    ///
    /// # Errors
    /// Returns [`LockchannelError::MalformedWitness`] unless exactly
    /// `MERKLE_DEPTH` siblings are given.
    pub fn new(key: LedgerKey, siblings: Vec<Digest32>) -> Result<Self> {
        check_depth(siblings.len())?;
        Ok(Self { key, siblings })
    }

    /// Construct from a path known to be full depth.
    pub(crate) fn from_path(key: LedgerKey, siblings: Vec<Digest32>) -> Self {
        debug_assert_eq!(siblings.len(), MERKLE_DEPTH);
        Self { key, siblings }
    }

    /// The leaf position this witness opens.
    #[must_use]
    pub fn key(&self) -> &LedgerKey {
        &self.key
    }

    /// Sibling hashes from the leaf level up to just below the root.
    #[must_use]
    pub fn siblings(&self) -> &[Digest32] {
        &self.siblings
    }

    /// Fold `value` up the sibling path. Returns the implied root and the key.
    ///
    /// # Errors
    /// Returns [`LockchannelError::MalformedWitness`] if the path is not full
    /// depth (possible for deserialized witnesses).
    pub fn compute_root_and_key<V: LeafValue>(&self, value: &V) -> Result<(Digest32, LedgerKey)> {
        check_depth(self.siblings.len())?;
        let mut current = leaf_hash(value);
        for (height, sibling) in self.siblings.iter().enumerate() {
            current = if path_bit(&self.key, height) == 0 {
                node_hash(&current, sibling)
            } else {
                node_hash(sibling, &current)
            };
        }
        Ok((current, self.key))
    }
}

/// Whether `witness` proves that `key` holds `value` under `root`.
///
/// A malformed witness never verifies.
#[must_use]
pub fn verify<V: LeafValue>(
    root: &Digest32,
    key: &LedgerKey,
    value: &V,
    witness: &MerkleWitness,
) -> bool {
    match witness.compute_root_and_key(value) {
        Ok((computed, witness_key)) => witness_key == *key && computed == *root,
        Err(_) => false,
    }
}

/// Root after replacing the witnessed leaf with `new_value`.
///
/// # Errors
/// Returns [`LockchannelError::MalformedWitness`] on a short or long path.
pub fn update<V: LeafValue>(witness: &MerkleWitness, new_value: &V) -> Result<Digest32> {
    witness
        .compute_root_and_key(new_value)
        .map(|(root, _)| root)
}

fn check_depth(actual: usize) -> Result<()> {
    if actual == MERKLE_DEPTH {
        Ok(())
    } else {
        Err(LockchannelError::MalformedWitness {
            expected: MERKLE_DEPTH,
            actual,
        })
    }
}
