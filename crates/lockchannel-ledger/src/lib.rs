//! # lockchannel-ledger
//!
//! **Commitment ledger primitives for lockchannel.**
//!
//! Per-user state is never stored by the ledger. It lives in two sparse
//! Merkle maps of depth 256, committed to by their roots:
//!
//! - **Key derivation**: `hash(party, asset, tag)` with a tag per map
//! - **Witnesses**: sibling paths that prove a leaf and recompute the root
//!   after a single-leaf update
//! - **Client map**: [`SparseMerkleMap`], the store users keep to produce
//!   witnesses
//!
//! Everything here is pure: same inputs, same digests on every node.

pub mod hashing;
pub mod map;
pub mod witness;

pub use hashing::{
    LeafValue, default_node, empty_root, empty_roots, key, leaf_hash, node_hash, settlement_key,
};
pub use map::SparseMerkleMap;
pub use witness::{MerkleWitness, update, verify};
