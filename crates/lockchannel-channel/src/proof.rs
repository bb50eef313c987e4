//! The channel accumulator.
//!
//! A [`ChannelProof`] certifies that its latest snapshot is reachable from a
//! ledger-backed base snapshot through signed, conserving, non-negative
//! steps. Instead of carrying the step history it carries, per party, the
//! cumulative amount that party has sent and that party's signature over the
//! total. Verification therefore costs two witness checks, at most two
//! signature checks and a few additions, whatever the number of steps.

use ed25519_dalek::{Signer, SigningKey};
use lockchannel_ledger::{MerkleWitness, key, verify};
use lockchannel_types::{
    AssetId, Digest32, KeyTag, LockchannelError, MapKind, PartyKey, Result, Signature,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::snapshot::{ChannelSnapshot, Role, endorsement_message};

/// A proof object that can absorb one more signed statement and be checked
/// in isolation.
pub trait VerifiableAccumulator: Sized {
    type Statement;

    /// A new accumulator covering `statement` on top of `self`.
    fn extend(&self, statement: Self::Statement, signature: &Signature) -> Result<Self>;

    /// Check the accumulator without any outside context.
    fn verify(&self) -> Result<()>;
}

/// A party's signed statement of its cumulative outgoing total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endorsement {
    pub sent_total: Decimal,
    pub signature: Signature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelProof {
    base: ChannelSnapshot,
    base_witnesses: [MerkleWitness; 2],
    latest: ChannelSnapshot,
    /// Cumulative amount sent by party1 and party2.
    sent: [Decimal; 2],
    endorsements: [Option<Endorsement>; 2],
    steps: u64,
}

impl ChannelProof {
    /// Open a channel on balances proven against the ledger's balance root.
    ///
    /// No signature is needed: the witnesses are the authority.
    ///
    /// # Errors
    /// - `ChannelMismatch` if the parties coincide or the delta is nonzero
    /// - `WitnessMismatch` if a witness does not prove its party's balance
    /// - `NegativeBalanceViolation` if a base balance is negative
    pub fn base_case(
        snapshot: ChannelSnapshot,
        witness1: MerkleWitness,
        witness2: MerkleWitness,
    ) -> Result<Self> {
        let proof = Self {
            latest: snapshot.clone(),
            base: snapshot,
            base_witnesses: [witness1, witness2],
            sent: [Decimal::ZERO, Decimal::ZERO],
            endorsements: [None, None],
            steps: 0,
        };
        proof.verify()?;
        tracing::debug!(channel = %proof.base, "Channel opened");
        Ok(proof)
    }

    /// Extend `prior` with `new_snapshot`, signed by the paying party.
    ///
    /// Checks, in order: the prior proof, non-negative balances, the signer
    /// (party1 for a positive delta, party2 for a negative one, either for
    /// zero) and conservation against the prior snapshot.
    ///
    /// # Errors
    /// - any error of `prior.verify()`
    /// - `ChannelMismatch` if the snapshot belongs to another channel
    /// - `NegativeBalanceViolation`, `AuthorizationFailure`,
    ///   `ConservationViolation` per the checks above
    pub fn step(new_snapshot: ChannelSnapshot, prior: &Self, signature: &Signature) -> Result<Self> {
        prior.verify()?;
        if !new_snapshot.same_channel(&prior.latest) {
            return Err(LockchannelError::ChannelMismatch {
                reason: format!("snapshot is not a state of {}", prior.latest),
            });
        }

        for role in [Role::Party1, Role::Party2] {
            ensure_non_negative(&new_snapshot, role)?;
        }

        let delta = new_snapshot.transfer_delta;
        let sent = accumulate(prior.sent, delta)?;
        let digest = prior.base.channel_digest();
        let signer = candidate_signers(delta)
            .iter()
            .copied()
            .find(|role| {
                let msg = endorsement_message(&digest, *role, sent[role.index()]);
                new_snapshot.party(*role).verify(&msg, signature).is_ok()
            })
            .ok_or_else(|| LockchannelError::AuthorizationFailure {
                reason: format!("step with delta {delta} not signed by the paying party"),
            })?;

        let expected1 = checked(prior.latest.balance1.checked_sub(delta))?;
        let expected2 = checked(prior.latest.balance2.checked_add(delta))?;
        if expected1 != new_snapshot.balance1 || expected2 != new_snapshot.balance2 {
            return Err(LockchannelError::ConservationViolation {
                reason: format!(
                    "delta {delta} takes ({}, {}) to ({expected1}, {expected2}), not ({}, {})",
                    prior.latest.balance1,
                    prior.latest.balance2,
                    new_snapshot.balance1,
                    new_snapshot.balance2
                ),
            });
        }

        let mut endorsements = prior.endorsements.clone();
        endorsements[signer.index()] = Some(Endorsement {
            sent_total: sent[signer.index()],
            signature: *signature,
        });

        tracing::debug!(
            channel = hex::encode(&digest[..8]),
            step = prior.steps + 1,
            delta = %delta,
            signer = %signer,
            balance1 = %new_snapshot.balance1,
            balance2 = %new_snapshot.balance2,
            "Channel step accepted"
        );

        Ok(Self {
            base: prior.base.clone(),
            base_witnesses: prior.base_witnesses.clone(),
            latest: new_snapshot,
            sent,
            endorsements,
            steps: prior.steps + 1,
        })
    }

    /// Signature `key` must contribute for `prior` to step to `new_snapshot`.
    ///
    /// # Errors
    /// - `AuthorizationFailure` if `key` is not a party to the channel
    /// - `ConservationViolation` if the cumulative total overflows
    pub fn sign_step(key: &SigningKey, prior: &Self, new_snapshot: &ChannelSnapshot) -> Result<Signature> {
        let party = PartyKey::from(key.verifying_key());
        let role = prior
            .base
            .role_of(&party)
            .ok_or_else(|| LockchannelError::AuthorizationFailure {
                reason: format!("{party} is not a party to this channel"),
            })?;
        let sent = accumulate(prior.sent, new_snapshot.transfer_delta)?;
        let msg = endorsement_message(&prior.base.channel_digest(), role, sent[role.index()]);
        Ok(key.sign(&msg))
    }

    /// The snapshot the channel opened with.
    #[must_use]
    pub fn base(&self) -> &ChannelSnapshot {
        &self.base
    }

    /// The most recent accepted snapshot.
    #[must_use]
    pub fn latest(&self) -> &ChannelSnapshot {
        &self.latest
    }

    /// The channel's single asset.
    #[must_use]
    pub fn asset(&self) -> AssetId {
        self.base.asset
    }

    /// Number of steps absorbed since the base case.
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Identity of the channel, fixed by its base snapshot.
    #[must_use]
    pub fn channel_digest(&self) -> Digest32 {
        self.base.channel_digest()
    }

    /// Final balance of `party` in the latest snapshot.
    ///
    /// # Errors
    /// Returns `AuthorizationFailure` if `party` is not in the channel.
    pub fn final_balance(&self, party: &PartyKey) -> Result<Decimal> {
        self.latest
            .role_of(party)
            .map(|role| self.latest.balance(role))
            .ok_or_else(|| LockchannelError::AuthorizationFailure {
                reason: format!("{party} is not a party to this channel"),
            })
    }

    fn verify_base(&self) -> Result<()> {
        let base = &self.base;
        if base.party1 == base.party2 {
            return Err(LockchannelError::ChannelMismatch {
                reason: format!("{} cannot open a channel with itself", base.party1),
            });
        }
        if !base.transfer_delta.is_zero() {
            return Err(LockchannelError::ChannelMismatch {
                reason: format!("base snapshot carries delta {}", base.transfer_delta),
            });
        }
        for role in [Role::Party1, Role::Party2] {
            ensure_non_negative(base, role)?;
            let party = base.party(role);
            let expected = key(&party, &base.asset, KeyTag::Balance);
            let witness = &self.base_witnesses[role.index()];
            if !verify(&base.balance_root, &expected, &base.balance(role), witness) {
                return Err(LockchannelError::WitnessMismatch {
                    map: MapKind::Balance,
                    reason: format!(
                        "base witness does not prove {party} holds {}",
                        base.balance(role)
                    ),
                });
            }
        }
        Ok(())
    }

    fn verify_endorsements(&self) -> Result<()> {
        let digest = self.base.channel_digest();
        for role in [Role::Party1, Role::Party2] {
            let sent = self.sent[role.index()];
            if sent < Decimal::ZERO {
                return Err(LockchannelError::ConservationViolation {
                    reason: format!("{role} sent total {sent} is negative"),
                });
            }
            match &self.endorsements[role.index()] {
                Some(endorsement) => {
                    if endorsement.sent_total != sent {
                        return Err(LockchannelError::AuthorizationFailure {
                            reason: format!(
                                "{role} endorsed {} but the proof claims {sent}",
                                endorsement.sent_total
                            ),
                        });
                    }
                    let msg = endorsement_message(&digest, role, sent);
                    self.base.party(role).verify(&msg, &endorsement.signature)?;
                }
                None if sent.is_zero() => {}
                None => {
                    return Err(LockchannelError::AuthorizationFailure {
                        reason: format!("{role} sent {sent} without an endorsement"),
                    });
                }
            }
        }
        Ok(())
    }
}

impl VerifiableAccumulator for ChannelProof {
    type Statement = ChannelSnapshot;

    fn extend(&self, statement: ChannelSnapshot, signature: &Signature) -> Result<Self> {
        Self::step(statement, self, signature)
    }

    fn verify(&self) -> Result<()> {
        self.verify_base()?;
        if !self.latest.same_channel(&self.base) {
            return Err(LockchannelError::ChannelMismatch {
                reason: "latest snapshot left the base channel".into(),
            });
        }
        if self.steps == 0 && self.latest != self.base {
            return Err(LockchannelError::ChannelMismatch {
                reason: "unstepped proof must sit at its base".into(),
            });
        }
        self.verify_endorsements()?;

        let [sent1, sent2] = self.sent;
        let expected1 = checked(self.base.balance1.checked_sub(sent1).and_then(|b| b.checked_add(sent2)))?;
        let expected2 = checked(self.base.balance2.checked_add(sent1).and_then(|b| b.checked_sub(sent2)))?;
        if expected1 != self.latest.balance1 || expected2 != self.latest.balance2 {
            return Err(LockchannelError::ConservationViolation {
                reason: format!(
                    "endorsed totals imply ({expected1}, {expected2}), latest is ({}, {})",
                    self.latest.balance1, self.latest.balance2
                ),
            });
        }
        for role in [Role::Party1, Role::Party2] {
            ensure_non_negative(&self.latest, role)?;
        }
        Ok(())
    }
}

/// Parties whose signature may authorize a step with this delta.
fn candidate_signers(delta: Decimal) -> &'static [Role] {
    if delta.is_zero() {
        &[Role::Party1, Role::Party2]
    } else if delta.is_sign_positive() {
        &[Role::Party1]
    } else {
        &[Role::Party2]
    }
}

/// Cumulative sent totals after a step with `delta`.
fn accumulate(sent: [Decimal; 2], delta: Decimal) -> Result<[Decimal; 2]> {
    let mut out = sent;
    if delta.is_zero() {
        return Ok(out);
    }
    if delta.is_sign_positive() {
        out[0] = checked(out[0].checked_add(delta))?;
    } else {
        out[1] = checked(out[1].checked_add(-delta))?;
    }
    Ok(out)
}

fn ensure_non_negative(snapshot: &ChannelSnapshot, role: Role) -> Result<()> {
    let balance = snapshot.balance(role);
    if balance < Decimal::ZERO {
        return Err(LockchannelError::NegativeBalanceViolation {
            party: snapshot.party(role).to_string(),
            balance,
        });
    }
    Ok(())
}

fn checked(value: Option<Decimal>) -> Result<Decimal> {
    value.ok_or_else(|| LockchannelError::ConservationViolation {
        reason: "channel amount overflow".into(),
    })
}

#[cfg(test)]
mod tests {
    use lockchannel_ledger::SparseMerkleMap;
    use lockchannel_types::test_keys;

    use super::*;

    fn dec(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    struct Channel {
        alice: SigningKey,
        bob: SigningKey,
        proof: ChannelProof,
    }

    fn open(balance1: i64, balance2: i64) -> Channel {
        let (alice, a) = test_keys::party(1);
        let (bob, b) = test_keys::party(2);
        let asset = AssetId::from_symbol("TOKYO");
        let ka = key(&a, &asset, KeyTag::Balance);
        let kb = key(&b, &asset, KeyTag::Balance);
        let mut map = SparseMerkleMap::<Decimal>::new();
        map.set(ka, dec(balance1));
        map.set(kb, dec(balance2));
        let base = ChannelSnapshot {
            party1: a,
            party2: b,
            asset,
            balance_root: map.root(),
            balance1: dec(balance1),
            balance2: dec(balance2),
            transfer_delta: Decimal::ZERO,
        };
        let proof = ChannelProof::base_case(base, map.witness(&ka), map.witness(&kb)).unwrap();
        Channel { alice, bob, proof }
    }

    fn pay(channel: &Channel, signer: &SigningKey, delta: i64) -> Result<ChannelProof> {
        let next = channel.proof.latest().transfer(dec(delta)).unwrap();
        let sig = ChannelProof::sign_step(signer, &channel.proof, &next).unwrap();
        ChannelProof::step(next, &channel.proof, &sig)
    }

    #[test]
    fn base_case_needs_no_signature() {
        let channel = open(100, 0);
        assert_eq!(channel.proof.steps(), 0);
        assert!(channel.proof.verify().is_ok());
    }

    #[test]
    fn base_case_rejects_wrong_balance() {
        let channel = open(100, 0);
        let mut base = channel.proof.base().clone();
        base.balance1 = dec(1000);
        let [w1, w2] = channel.proof.base_witnesses.clone();
        let err = ChannelProof::base_case(base, w1, w2).unwrap_err();
        assert!(matches!(err, LockchannelError::WitnessMismatch { .. }));
    }

    #[test]
    fn base_case_rejects_swapped_witnesses() {
        let channel = open(100, 0);
        let [w1, w2] = channel.proof.base_witnesses.clone();
        let err = ChannelProof::base_case(channel.proof.base().clone(), w2, w1).unwrap_err();
        assert!(matches!(err, LockchannelError::WitnessMismatch { .. }));
    }

    #[test]
    fn base_case_rejects_self_channel() {
        let channel = open(100, 0);
        let mut base = channel.proof.base().clone();
        base.party2 = base.party1;
        let [w1, w2] = channel.proof.base_witnesses.clone();
        let err = ChannelProof::base_case(base, w1, w2).unwrap_err();
        assert!(matches!(err, LockchannelError::ChannelMismatch { .. }));
    }

    #[test]
    fn base_case_rejects_nonzero_delta() {
        let channel = open(100, 0);
        let mut base = channel.proof.base().clone();
        base.transfer_delta = dec(1);
        let [w1, w2] = channel.proof.base_witnesses.clone();
        let err = ChannelProof::base_case(base, w1, w2).unwrap_err();
        assert!(matches!(err, LockchannelError::ChannelMismatch { .. }));
    }

    #[test]
    fn payer_signed_step_accepted() {
        let mut channel = open(100, 0);
        let alice = channel.alice.clone();
        channel.proof = pay(&channel, &alice, 20).unwrap();
        assert_eq!(channel.proof.latest().balance1, dec(80));
        assert_eq!(channel.proof.latest().balance2, dec(20));
        assert_eq!(channel.proof.steps(), 1);
        assert!(channel.proof.verify().is_ok());

        let bob = channel.bob.clone();
        channel.proof = pay(&channel, &bob, -5).unwrap();
        assert_eq!(channel.proof.latest().balance1, dec(85));
        assert_eq!(channel.proof.latest().balance2, dec(15));
    }

    #[test]
    fn receiver_signed_step_rejected() {
        let channel = open(100, 0);
        let err = pay(&channel, &channel.bob, 20).unwrap_err();
        assert!(matches!(err, LockchannelError::AuthorizationFailure { .. }));
    }

    #[test]
    fn outsider_cannot_sign() {
        let channel = open(100, 0);
        let (mallory, _) = test_keys::party(66);
        let next = channel.proof.latest().transfer(dec(1)).unwrap();
        let err = ChannelProof::sign_step(&mallory, &channel.proof, &next).unwrap_err();
        assert!(matches!(err, LockchannelError::AuthorizationFailure { .. }));
    }

    #[test]
    fn zero_delta_accepts_either_party() {
        let channel = open(100, 0);
        assert!(pay(&channel, &channel.alice, 0).is_ok());
        assert!(pay(&channel, &channel.bob, 0).is_ok());
    }

    #[test]
    fn overdraft_rejected() {
        let channel = open(10, 0);
        let err = pay(&channel, &channel.alice, 11).unwrap_err();
        assert!(matches!(err, LockchannelError::NegativeBalanceViolation { .. }));
    }

    #[test]
    fn non_conserving_step_rejected() {
        let channel = open(100, 0);
        let mut next = channel.proof.latest().transfer(dec(20)).unwrap();
        next.balance2 = dec(25);
        let sig = ChannelProof::sign_step(&channel.alice, &channel.proof, &next).unwrap();
        let err = ChannelProof::step(next, &channel.proof, &sig).unwrap_err();
        assert!(matches!(err, LockchannelError::ConservationViolation { .. }));
    }

    #[test]
    fn foreign_snapshot_rejected() {
        let channel = open(100, 0);
        let mut next = channel.proof.latest().transfer(dec(20)).unwrap();
        next.balance_root = [0; 32];
        let sig = ChannelProof::sign_step(&channel.alice, &channel.proof, &next).unwrap();
        let err = ChannelProof::step(next, &channel.proof, &sig).unwrap_err();
        assert!(matches!(err, LockchannelError::ChannelMismatch { .. }));
    }

    #[test]
    fn signature_is_bound_to_amount() {
        let channel = open(100, 0);
        let small = channel.proof.latest().transfer(dec(1)).unwrap();
        let sig = ChannelProof::sign_step(&channel.alice, &channel.proof, &small).unwrap();
        let large = channel.proof.latest().transfer(dec(90)).unwrap();
        let err = ChannelProof::step(large, &channel.proof, &sig).unwrap_err();
        assert!(matches!(err, LockchannelError::AuthorizationFailure { .. }));
    }

    #[test]
    fn tampered_latest_fails_verify() {
        let channel = open(100, 0);
        let mut proof = pay(&channel, &channel.alice, 20).unwrap();
        proof.latest.balance1 = dec(90);
        proof.latest.balance2 = dec(10);
        let err = proof.verify().unwrap_err();
        assert!(matches!(err, LockchannelError::ConservationViolation { .. }));
    }

    #[test]
    fn inflated_sent_total_fails_verify() {
        let channel = open(100, 0);
        let mut proof = pay(&channel, &channel.alice, 20).unwrap();
        proof.sent[0] = dec(30);
        proof.latest.balance1 = dec(70);
        proof.latest.balance2 = dec(30);
        let err = proof.verify().unwrap_err();
        assert!(matches!(err, LockchannelError::AuthorizationFailure { .. }));
    }

    #[test]
    fn extend_matches_step() {
        let channel = open(100, 0);
        let next = channel.proof.latest().transfer(dec(20)).unwrap();
        let sig = ChannelProof::sign_step(&channel.alice, &channel.proof, &next).unwrap();
        let via_trait = channel.proof.extend(next.clone(), &sig).unwrap();
        let via_step = ChannelProof::step(next, &channel.proof, &sig).unwrap();
        assert_eq!(via_trait, via_step);
    }

    #[test]
    fn final_balance_by_party() {
        let channel = open(100, 0);
        let proof = pay(&channel, &channel.alice, 20).unwrap();
        assert_eq!(proof.final_balance(&proof.base().party1).unwrap(), dec(80));
        assert_eq!(proof.final_balance(&proof.base().party2).unwrap(), dec(20));
        let err = proof.final_balance(&test_keys::party(9).1).unwrap_err();
        assert!(matches!(err, LockchannelError::AuthorizationFailure { .. }));
    }
}
