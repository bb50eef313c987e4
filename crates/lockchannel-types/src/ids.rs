//! Identifiers used throughout lockchannel.
//!
//! Parties, assets and token accounts are raw 32-byte values. A party is its
//! ed25519 verification key; ledger instances use UUIDv7.

use std::fmt;

use ed25519_dalek::{Signature, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use uuid::Uuid;

use crate::{LockchannelError, Result};

/// A 32-byte SHA-256 digest (roots, ledger keys, tree nodes).
pub type Digest32 = [u8; 32];

// ---------------------------------------------------------------------------
// PartyKey
// ---------------------------------------------------------------------------

/// An externally-owned identity: the raw ed25519 public key (32 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct PartyKey(pub [u8; 32]);

impl PartyKey {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The token account owned by this party.
    #[must_use]
    pub fn account(&self) -> AccountId {
        AccountId(self.0)
    }

    /// First four bytes in hex, for logs.
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Verify an ed25519 signature made by this party.
    ///
    /// Uses strict verification so malleated signatures are rejected.
    ///
    /// # Errors
    /// Returns [`LockchannelError::AuthorizationFailure`] if the key bytes are
    /// not a valid point or the signature does not verify.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<()> {
        let key = VerifyingKey::from_bytes(&self.0).map_err(|_| {
            LockchannelError::AuthorizationFailure {
                reason: format!("{self} is not a valid ed25519 key"),
            }
        })?;
        key.verify_strict(message, signature)
            .map_err(|_| LockchannelError::AuthorizationFailure {
                reason: format!("signature by {self} did not verify"),
            })
    }
}

impl From<VerifyingKey> for PartyKey {
    fn from(key: VerifyingKey) -> Self {
        Self(key.to_bytes())
    }
}

impl fmt::Display for PartyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "party:{}", hex::encode(&self.0[..8]))
    }
}

// ---------------------------------------------------------------------------
// AssetId
// ---------------------------------------------------------------------------

/// Identifier of a token type (the token ledger's address).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AssetId(pub [u8; 32]);

impl AssetId {
    /// Derive an asset id from a ticker symbol (e.g. `"TOKYO"`).
    #[must_use]
    pub fn from_symbol(symbol: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"lockchannel:asset:v1:");
        hasher.update(symbol.as_bytes());
        let mut id = [0u8; 32];
        id.copy_from_slice(&hasher.finalize());
        Self(id)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "asset:{}", hex::encode(&self.0[..8]))
    }
}

// ---------------------------------------------------------------------------
// AccountId
// ---------------------------------------------------------------------------

/// A token account inside one asset's ledger.
///
/// Party accounts share the party's key bytes; custody accounts are derived
/// from the owning escrow ledger and asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct AccountId(pub [u8; 32]);

impl AccountId {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "acct:{}", hex::encode(&self.0[..8]))
    }
}

// ---------------------------------------------------------------------------
// LedgerId
// ---------------------------------------------------------------------------

/// Identifier of one escrow ledger instance. Uses UUIDv7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct LedgerId(pub Uuid);

impl LedgerId {
    /// A fresh time-ordered (v7) id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for LedgerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LedgerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ledger:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// BlockHeight
// ---------------------------------------------------------------------------

/// Host chain height. Lock comparisons are height-relative only.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
pub struct BlockHeight(pub u64);

impl BlockHeight {
    /// Height `blocks` later, capped at `u64::MAX`.
    #[must_use]
    pub fn saturating_add(self, blocks: u64) -> Self {
        Self(self.0.saturating_add(blocks))
    }
}

impl fmt::Display for BlockHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Deterministic and random party keys for tests. **Never use in production.**
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_keys {
    use ed25519_dalek::SigningKey;

    use super::PartyKey;

    /// A signing key derived from a single seed byte, with its party key.
    #[must_use]
    pub fn party(seed: u8) -> (SigningKey, PartyKey) {
        let signing = SigningKey::from_bytes(&[seed; 32]);
        let party = PartyKey::from(signing.verifying_key());
        (signing, party)
    }

    /// A freshly generated signing key and its party key.
    #[must_use]
    pub fn random_party() -> (SigningKey, PartyKey) {
        let signing = SigningKey::generate(&mut rand::rngs::OsRng);
        let party = PartyKey::from(signing.verifying_key());
        (signing, party)
    }
}
