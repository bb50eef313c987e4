//! Client-side sparse Merkle map.
//!
//! The ledger itself stores only roots. Whoever wants to produce witnesses
//! (a user, a channel participant, an indexer) keeps one of these alongside
//! and replays every committed update into it.
//!
//! Only non-default nodes are stored, keyed by height and the key prefix
//! with its lowest `height` bits cleared.

use std::collections::HashMap;

use lockchannel_types::{Digest32, LedgerKey, constants::MERKLE_DEPTH};

use crate::hashing::{LeafValue, default_node, empty_root, leaf_hash, node_hash, path_bit};
use crate::witness::MerkleWitness;

/// A full-depth sparse Merkle map from [`LedgerKey`] to `V`.
#[derive(Debug, Clone)]
pub struct SparseMerkleMap<V> {
    leaves: HashMap<LedgerKey, V>,
    nodes: HashMap<(usize, Digest32), Digest32>,
    root: Digest32,
}

impl<V: LeafValue + Clone + Default> Default for SparseMerkleMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: LeafValue + Clone + Default> SparseMerkleMap<V> {
    /// An empty map; its root is the empty root.
    #[must_use]
    pub fn new() -> Self {
        Self {
            leaves: HashMap::new(),
            nodes: HashMap::new(),
            root: empty_root(),
        }
    }

    /// Root over every leaf, empty ones included.
    #[must_use]
    pub fn root(&self) -> Digest32 {
        self.root
    }

    /// Current value at `key`; absent keys hold the default.
    #[must_use]
    pub fn get(&self, key: &LedgerKey) -> V {
        self.leaves.get(key).cloned().unwrap_or_default()
    }

    /// Number of non-default leaves.
    #[must_use]
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Sibling path for `key` against the current root.
    #[must_use]
    pub fn witness(&self, key: &LedgerKey) -> MerkleWitness {
        let siblings = (0..MERKLE_DEPTH)
            .map(|height| self.node(height, &sibling_prefix(key, height)))
            .collect();
        MerkleWitness::from_path(*key, siblings)
    }

    /// Write `value` at `key` and return the new root.
    pub fn set(&mut self, key: LedgerKey, value: V) -> Digest32 {
        let mut current = leaf_hash(&value);
        self.store(0, key.0, current);
        for height in 0..MERKLE_DEPTH {
            let sibling = self.node(height, &sibling_prefix(&key, height));
            current = if path_bit(&key, height) == 0 {
                node_hash(&current, &sibling)
            } else {
                node_hash(&sibling, &current)
            };
            self.store(height + 1, prefix(&key, height + 1), current);
        }
        if value.is_zero() {
            self.leaves.remove(&key);
        } else {
            self.leaves.insert(key, value);
        }
        self.root = current;
        current
    }

    fn node(&self, height: usize, prefix: &Digest32) -> Digest32 {
        self.nodes
            .get(&(height, *prefix))
            .copied()
            .unwrap_or_else(|| default_node(height))
    }

    fn store(&mut self, height: usize, prefix: Digest32, digest: Digest32) {
        if digest == default_node(height) {
            self.nodes.remove(&(height, prefix));
        } else {
            self.nodes.insert((height, prefix), digest);
        }
    }
}

/// `key` with its lowest `height` bits cleared: the id of its ancestor at `height`.
fn prefix(key: &LedgerKey, height: usize) -> Digest32 {
    let mut out = key.0;
    let full_bytes = height / 8;
    for byte in out.iter_mut().rev().take(full_bytes) {
        *byte = 0;
    }
    let rest = height % 8;
    if rest > 0 && full_bytes < 32 {
        out[31 - full_bytes] &= 0xFF << rest;
    }
    out
}

fn sibling_prefix(key: &LedgerKey, height: usize) -> Digest32 {
    let mut out = prefix(key, height);
    out[31 - height / 8] ^= 1 << (height % 8);
    out
}
