//! Integration test: sparse map against an independent reference model
//!
//! A random sequence of writes (including nullifications) is applied both to
//! `SparseMerkleMap` and to a plain `BTreeMap`. After every write the map's
//! root must equal a root recomputed from scratch, and the witness taken
//! before the write must predict the root after it.

use std::collections::BTreeMap;

use lockchannel_ledger::{SparseMerkleMap, key, leaf_hash, node_hash, update, verify};
use lockchannel_types::{AssetId, Digest32, KeyTag, LedgerKey, test_keys};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

const DEPTH: usize = 256;

/// Bit `index` of the key, counted from the least significant end.
fn key_bit(key: &Digest32, index: usize) -> bool {
    let byte = key[31 - index / 8];
    byte & (1 << (index % 8)) != 0
}

fn empty_subtrees() -> Vec<Digest32> {
    let mut out = vec![leaf_hash(&Decimal::ZERO)];
    for h in 0..DEPTH {
        let below = out[h];
        out.push(node_hash(&below, &below));
    }
    out
}

fn subtree_root(entries: &[(Digest32, Digest32)], height: usize, empty: &[Digest32]) -> Digest32 {
    if entries.is_empty() {
        return empty[height];
    }
    if height == 0 {
        return entries[0].1;
    }
    let (right, left): (Vec<_>, Vec<_>) = entries
        .iter()
        .copied()
        .partition(|(k, _)| key_bit(k, height - 1));
    node_hash(
        &subtree_root(&left, height - 1, empty),
        &subtree_root(&right, height - 1, empty),
    )
}

fn reference_root(model: &BTreeMap<LedgerKey, Decimal>, empty: &[Digest32]) -> Digest32 {
    let entries: Vec<(Digest32, Digest32)> = model
        .iter()
        .filter(|(_, v)| !v.is_zero())
        .map(|(k, v)| (k.0, leaf_hash(v)))
        .collect();
    subtree_root(&entries, DEPTH, empty)
}

#[test]
fn random_writes_match_reference_root() {
    let empty = empty_subtrees();
    let asset = AssetId::from_symbol("TOKYO");
    let keys: Vec<LedgerKey> = (1..=12)
        .map(|seed| key(&test_keys::party(seed).1, &asset, KeyTag::Balance))
        .collect();

    let mut rng = StdRng::seed_from_u64(0x10c4_c4a1);
    let mut map = SparseMerkleMap::<Decimal>::new();
    let mut model: BTreeMap<LedgerKey, Decimal> = BTreeMap::new();

    assert_eq!(map.root(), reference_root(&model, &empty));

    for _ in 0..300 {
        let k = keys[rng.gen_range(0..keys.len())];
        let value = if rng.gen_bool(0.3) {
            Decimal::ZERO
        } else {
            Decimal::new(rng.gen_range(1..100_000), 2)
        };

        let old = map.get(&k);
        assert_eq!(old, model.get(&k).copied().unwrap_or_default());
        let witness = map.witness(&k);
        assert!(verify(&map.root(), &k, &old, &witness));
        let predicted = update(&witness, &value).unwrap();

        map.set(k, value);
        model.insert(k, value);

        assert_eq!(map.root(), predicted);
        assert_eq!(map.root(), reference_root(&model, &empty));
    }
}

#[test]
fn time_lock_and_balance_leaves_are_independent() {
    let asset = AssetId::from_symbol("TOKYO");
    let (_, party) = test_keys::party(9);
    let lock_key = key(&party, &asset, KeyTag::TimeLock);
    let balance_key = key(&party, &asset, KeyTag::Balance);

    let mut map = SparseMerkleMap::<Decimal>::new();
    map.set(lock_key, Decimal::new(1500, 0));
    let w = map.witness(&balance_key);
    assert!(verify(&map.root(), &balance_key, &Decimal::ZERO, &w));
}

#[test]
fn witness_survives_serialization() {
    let asset = AssetId::from_symbol("TOKYO");
    let k = key(&test_keys::party(4).1, &asset, KeyTag::Balance);
    let mut map = SparseMerkleMap::<Decimal>::new();
    map.set(k, Decimal::new(250, 1));

    let json = serde_json::to_string(&map.witness(&k)).unwrap();
    let back = serde_json::from_str(&json).unwrap();
    assert!(verify(&map.root(), &k, &Decimal::new(25, 0), &back));
}
