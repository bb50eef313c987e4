//! Domain-separated hashing for the commitment ledger.
//!
//! Keys, leaves and inner nodes each hash under their own versioned prefix,
//! so no value of one kind can be reinterpreted as another. Leaf values are
//! hashed through their canonical decimal string: the zero value of every map
//! hashes to the same empty leaf, and a nullified leaf restores the empty
//! subtree digests exactly.

use std::sync::LazyLock;

use lockchannel_types::{
    AssetId, BlockHeight, Digest32, KeyTag, LedgerKey, LedgerRoots, PartyKey,
    constants::MERKLE_DEPTH,
};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

const KEY_DOMAIN: &[u8] = b"lockchannel:ledger_key:v1:";
const LEAF_DOMAIN: &[u8] = b"lockchannel:leaf:v1:";
const NODE_DOMAIN: &[u8] = b"lockchannel:node:v1:";

/// Canonical string of the zero value shared by every map.
const ZERO_CANONICAL: &str = "0";

/// A value that can be stored in a ledger leaf.
pub trait LeafValue {
    /// Canonical decimal rendering. Equal values must render identically.
    fn canonical(&self) -> String;

    /// Whether this is the map's default (empty) value.
    fn is_zero(&self) -> bool;
}

impl LeafValue for BlockHeight {
    fn canonical(&self) -> String {
        self.0.to_string()
    }

    fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl LeafValue for Decimal {
    fn canonical(&self) -> String {
        // normalize() strips trailing zeros and turns -0 into 0.
        self.normalize().to_string()
    }

    fn is_zero(&self) -> bool {
        Decimal::is_zero(self)
    }
}

/// Empty-subtree digests, indexed by height (0 = leaf, `MERKLE_DEPTH` = root).
static DEFAULT_NODES: LazyLock<Vec<Digest32>> = LazyLock::new(|| {
    let mut nodes = Vec::with_capacity(MERKLE_DEPTH + 1);
    let mut current = hash_leaf_canonical(ZERO_CANONICAL);
    nodes.push(current);
    for _ in 0..MERKLE_DEPTH {
        current = node_hash(&current, &current);
        nodes.push(current);
    }
    nodes
});

/// Derive the leaf position for a (party, asset) pair in the map selected by `tag`.
#[must_use]
pub fn key(party: &PartyKey, asset: &AssetId, tag: KeyTag) -> LedgerKey {
    let mut hasher = Sha256::new();
    hasher.update(KEY_DOMAIN);
    hasher.update(party.as_bytes());
    hasher.update(asset.as_bytes());
    hasher.update([tag.as_byte()]);
    LedgerKey(finish(hasher))
}

/// Derive the settlement-marker position for a party in one channel.
///
/// The channel digest already commits to the asset.
#[must_use]
pub fn settlement_key(party: &PartyKey, channel: &Digest32) -> LedgerKey {
    let mut hasher = Sha256::new();
    hasher.update(KEY_DOMAIN);
    hasher.update(party.as_bytes());
    hasher.update(channel);
    hasher.update([KeyTag::Settlement.as_byte()]);
    LedgerKey(finish(hasher))
}

/// Hash of a leaf holding `value`.
#[must_use]
pub fn leaf_hash<V: LeafValue>(value: &V) -> Digest32 {
    hash_leaf_canonical(&value.canonical())
}

/// Hash of an inner node.
#[must_use]
pub fn node_hash(left: &Digest32, right: &Digest32) -> Digest32 {
    let mut hasher = Sha256::new();
    hasher.update(NODE_DOMAIN);
    hasher.update(left);
    hasher.update(right);
    finish(hasher)
}

/// Digest of an empty subtree of the given height.
///
/// # Panics
/// Panics if `height > MERKLE_DEPTH`.
#[must_use]
pub fn default_node(height: usize) -> Digest32 {
    DEFAULT_NODES[height]
}

/// Root of an empty map.
#[must_use]
pub fn empty_root() -> Digest32 {
    default_node(MERKLE_DEPTH)
}

/// Roots of a freshly initialized ledger: both maps empty.
#[must_use]
pub fn empty_roots() -> LedgerRoots {
    LedgerRoots::new(empty_root(), empty_root())
}

/// Direction taken above `height` on the path to `key`: 0 = left child, 1 = right.
///
/// Bit `height` counted from the least significant end of the big-endian key.
pub(crate) fn path_bit(key: &LedgerKey, height: usize) -> u8 {
    (key.0[31 - height / 8] >> (height % 8)) & 1
}

fn hash_leaf_canonical(canonical: &str) -> Digest32 {
    let mut hasher = Sha256::new();
    hasher.update(LEAF_DOMAIN);
    hasher.update(canonical.as_bytes());
    finish(hasher)
}

fn finish(hasher: Sha256) -> Digest32 {
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

#[cfg(test)]
mod tests {
    use lockchannel_types::test_keys;

    use super::*;

    #[test]
    fn key_tags_are_domain_separated() {
        let (_, party) = test_keys::party(1);
        let asset = AssetId::from_symbol("TOKYO");
        let lock = key(&party, &asset, KeyTag::TimeLock);
        let balance = key(&party, &asset, KeyTag::Balance);
        assert_ne!(lock, balance);
    }

    #[test]
    fn key_is_deterministic() {
        let (_, party) = test_keys::party(1);
        let asset = AssetId::from_symbol("TOKYO");
        assert_eq!(
            key(&party, &asset, KeyTag::Balance),
            key(&party, &asset, KeyTag::Balance)
        );
    }

    #[test]
    fn keys_differ_by_party_and_asset() {
        let (_, a) = test_keys::party(1);
        let (_, b) = test_keys::party(2);
        let tokyo = AssetId::from_symbol("TOKYO");
        let osaka = AssetId::from_symbol("OSAKA");
        assert_ne!(
            key(&a, &tokyo, KeyTag::Balance),
            key(&b, &tokyo, KeyTag::Balance)
        );
        assert_ne!(
            key(&a, &tokyo, KeyTag::Balance),
            key(&a, &osaka, KeyTag::Balance)
        );
    }

    #[test]
    fn settlement_key_differs_per_channel() {
        let (_, party) = test_keys::party(1);
        assert_ne!(
            settlement_key(&party, &[1; 32]),
            settlement_key(&party, &[2; 32])
        );
    }

    #[test]
    fn zero_values_share_the_empty_leaf() {
        assert_eq!(leaf_hash(&BlockHeight(0)), default_node(0));
        assert_eq!(leaf_hash(&Decimal::ZERO), default_node(0));
        assert_eq!(leaf_hash(&Decimal::new(0, 2)), default_node(0));
    }

    #[test]
    fn scale_does_not_change_leaf() {
        assert_eq!(
            leaf_hash(&Decimal::new(7500, 2)),
            leaf_hash(&Decimal::new(75, 0))
        );
    }

    #[test]
    fn node_hash_is_ordered() {
        assert_ne!(node_hash(&[1; 32], &[2; 32]), node_hash(&[2; 32], &[1; 32]));
    }

    #[test]
    fn empty_roots_are_equal_pair() {
        let roots = empty_roots();
        assert_eq!(roots.time_lock_root, roots.balance_root);
        assert_eq!(roots.balance_root, default_node(MERKLE_DEPTH));
    }

    #[test]
    fn path_bit_reads_from_least_significant_end() {
        let mut bytes = [0u8; 32];
        bytes[31] = 0b0000_0010;
        bytes[0] = 0b1000_0000;
        let key = LedgerKey(bytes);
        assert_eq!(path_bit(&key, 0), 0);
        assert_eq!(path_bit(&key, 1), 1);
        assert_eq!(path_bit(&key, 255), 1);
        assert_eq!(path_bit(&key, 254), 0);
    }
}
