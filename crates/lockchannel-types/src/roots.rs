//! Ledger commitment types: key tags, ledger keys and the root pair.
//!
//! The whole on-chain state of a ledger instance is one [`LedgerRoots`]
//! value. Every per-user fact is a leaf of one of the two maps and is proven
//! against the corresponding root with a witness held by the client.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Digest32;

/// Domain tag mixed into a [`LedgerKey`].
///
/// The same (party, asset) pair maps to a distinct leaf per tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum KeyTag {
    /// Lock entry: block height until which withdrawal is forbidden.
    TimeLock = 0,
    /// Balance entry: amount escrowed.
    Balance = 1,
    /// Settlement marker: nonzero once a party has settled a channel.
    Settlement = 2,
}

impl KeyTag {
    /// Tag byte mixed into key derivation.
    #[must_use]
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// The map this tag's leaves live in.
    #[must_use]
    pub fn map(self) -> MapKind {
        match self {
            Self::TimeLock => MapKind::TimeLock,
            Self::Balance | Self::Settlement => MapKind::Balance,
        }
    }
}

/// One of the two committed maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MapKind {
    TimeLock,
    Balance,
}

impl fmt::Display for MapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimeLock => write!(f, "TIME_LOCK"),
            Self::Balance => write!(f, "BALANCE"),
        }
    }
}

/// Position of a leaf in a sparse map: `hash(party, asset, tag)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct LedgerKey(pub Digest32);

impl LedgerKey {
    #[must_use]
    pub fn as_bytes(&self) -> &Digest32 {
        &self.0
    }
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key:{}", hex::encode(&self.0[..8]))
    }
}

/// The pair of roots that is the only persisted state of a ledger.
///
/// Updates always replace the whole pair; there is no partial merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerRoots {
    pub time_lock_root: Digest32,
    pub balance_root: Digest32,
}

impl LedgerRoots {
    #[must_use]
    pub fn new(time_lock_root: Digest32, balance_root: Digest32) -> Self {
        Self {
            time_lock_root,
            balance_root,
        }
    }

    /// Root of `map`.
    #[must_use]
    pub fn root(&self, map: MapKind) -> Digest32 {
        match map {
            MapKind::TimeLock => self.time_lock_root,
            MapKind::Balance => self.balance_root,
        }
    }

    /// A copy of these roots with one map's root replaced.
    #[must_use]
    pub fn with_root(self, map: MapKind, root: Digest32) -> Self {
        match map {
            MapKind::TimeLock => Self {
                time_lock_root: root,
                ..self
            },
            MapKind::Balance => Self {
                balance_root: root,
                ..self
            },
        }
    }
}

impl fmt::Display for LedgerRoots {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lock={} balance={}",
            hex::encode(&self.time_lock_root[..8]),
            hex::encode(&self.balance_root[..8])
        )
    }
}
