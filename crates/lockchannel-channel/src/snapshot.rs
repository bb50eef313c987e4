//! Channel snapshots and the messages parties sign over them.

use std::fmt;

use lockchannel_types::{AssetId, Digest32, LockchannelError, PartyKey, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const CHANNEL_DOMAIN: &[u8] = b"lockchannel:channel:v1:";
const ENDORSE_DOMAIN: &[u8] = b"lockchannel:endorse:v1:";

/// Position of a party in a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Party1,
    Party2,
}

impl Role {
    /// The other side of the channel.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Party1 => Self::Party2,
            Self::Party2 => Self::Party1,
        }
    }

    /// Array slot for per-party pairs: 0 for party1, 1 for party2.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Party1 => 0,
            Self::Party2 => 1,
        }
    }

    fn as_byte(self) -> u8 {
        match self {
            Self::Party1 => 1,
            Self::Party2 => 2,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Party1 => write!(f, "PARTY1"),
            Self::Party2 => write!(f, "PARTY2"),
        }
    }
}

/// One state of a two-party channel.
///
/// `transfer_delta` is the amount party1 paid party2 in the step that
/// produced this snapshot (negative when party2 paid). Base snapshots carry
/// zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub party1: PartyKey,
    pub party2: PartyKey,
    pub asset: AssetId,
    /// Ledger balance root the channel was opened against.
    pub balance_root: Digest32,
    pub balance1: Decimal,
    pub balance2: Decimal,
    pub transfer_delta: Decimal,
}

impl ChannelSnapshot {
    /// Identity of the channel: parties, asset and opening root.
    #[must_use]
    pub fn channel_digest(&self) -> Digest32 {
        let mut hasher = Sha256::new();
        hasher.update(CHANNEL_DOMAIN);
        hasher.update(self.party1.as_bytes());
        hasher.update(self.party2.as_bytes());
        hasher.update(self.asset.as_bytes());
        hasher.update(self.balance_root);
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        out
    }

    /// Whether `other` is a state of the same channel.
    #[must_use]
    pub fn same_channel(&self, other: &Self) -> bool {
        self.party1 == other.party1
            && self.party2 == other.party2
            && self.asset == other.asset
            && self.balance_root == other.balance_root
    }

    /// Key of the party in `role`.
    #[must_use]
    pub fn party(&self, role: Role) -> PartyKey {
        match role {
            Role::Party1 => self.party1,
            Role::Party2 => self.party2,
        }
    }

    /// Position of `party`, or `None` for an outsider.
    #[must_use]
    pub fn role_of(&self, party: &PartyKey) -> Option<Role> {
        if *party == self.party1 {
            Some(Role::Party1)
        } else if *party == self.party2 {
            Some(Role::Party2)
        } else {
            None
        }
    }

    /// Balance held by the party in `role`.
    #[must_use]
    pub fn balance(&self, role: Role) -> Decimal {
        match role {
            Role::Party1 => self.balance1,
            Role::Party2 => self.balance2,
        }
    }

    /// The snapshot after party1 pays party2 `delta` (negative: party2 pays).
    ///
    /// Only the arithmetic is checked here; [`crate::ChannelProof::step`]
    /// decides whether the result is admissible.
    ///
    /// # Errors
    /// Returns `ConservationViolation` if a balance leaves `Decimal` range.
    pub fn transfer(&self, delta: Decimal) -> Result<Self> {
        let (Some(balance1), Some(balance2)) = (
            self.balance1.checked_sub(delta),
            self.balance2.checked_add(delta),
        ) else {
            return Err(LockchannelError::ConservationViolation {
                reason: format!("transfer of {delta} overflows {self}"),
            });
        };
        Ok(Self {
            balance1,
            balance2,
            transfer_delta: delta,
            ..self.clone()
        })
    }
}

impl fmt::Display for ChannelSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "channel:{} {}={} {}={}",
            hex::encode(&self.channel_digest()[..8]),
            self.party1,
            self.balance1,
            self.party2,
            self.balance2
        )
    }
}

/// Message a party signs to endorse the total it has sent in a channel.
///
/// Cumulative totals only grow, so the newest endorsement supersedes every
/// earlier one from the same party.
#[must_use]
pub fn endorsement_message(channel: &Digest32, role: Role, sent_total: Decimal) -> Vec<u8> {
    let mut msg = Vec::with_capacity(96);
    msg.extend_from_slice(ENDORSE_DOMAIN);
    msg.extend_from_slice(channel);
    msg.push(role.as_byte());
    msg.extend_from_slice(sent_total.normalize().to_string().as_bytes());
    msg
}

#[cfg(test)]
mod tests {
    use lockchannel_types::test_keys;

    use super::*;

    fn snapshot() -> ChannelSnapshot {
        ChannelSnapshot {
            party1: test_keys::party(1).1,
            party2: test_keys::party(2).1,
            asset: AssetId::from_symbol("TOKYO"),
            balance_root: [7; 32],
            balance1: Decimal::new(100, 0),
            balance2: Decimal::ZERO,
            transfer_delta: Decimal::ZERO,
        }
    }

    #[test]
    fn transfer_keeps_channel_and_total() {
        let base = snapshot();
        let next = base.transfer(Decimal::new(20, 0)).unwrap();
        assert!(next.same_channel(&base));
        assert_eq!(next.channel_digest(), base.channel_digest());
        assert_eq!(next.balance1, Decimal::new(80, 0));
        assert_eq!(next.balance2, Decimal::new(20, 0));
        assert_eq!(next.balance1 + next.balance2, base.balance1 + base.balance2);
    }

    #[test]
    fn transfer_overflow_is_an_error() {
        let mut base = snapshot();
        base.balance2 = Decimal::MAX;
        let err = base.transfer(Decimal::ONE).unwrap_err();
        assert!(matches!(err, LockchannelError::ConservationViolation { .. }));
        assert!(base.transfer(Decimal::MIN).is_err());
    }

    #[test]
    fn digest_depends_on_root() {
        let a = snapshot();
        let mut b = snapshot();
        b.balance_root = [8; 32];
        assert!(!a.same_channel(&b));
        assert_ne!(a.channel_digest(), b.channel_digest());
    }

    #[test]
    fn role_lookup() {
        let s = snapshot();
        assert_eq!(s.role_of(&s.party1), Some(Role::Party1));
        assert_eq!(s.role_of(&s.party2), Some(Role::Party2));
        assert_eq!(s.role_of(&test_keys::party(3).1), None);
        assert_eq!(Role::Party1.opposite(), Role::Party2);
        assert_eq!(s.party(Role::Party2), s.party2);
    }

    #[test]
    fn endorsement_binds_role() {
        let digest = snapshot().channel_digest();
        assert_ne!(
            endorsement_message(&digest, Role::Party1, Decimal::ONE),
            endorsement_message(&digest, Role::Party2, Decimal::ONE)
        );
    }
}
