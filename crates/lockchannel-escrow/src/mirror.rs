//! Client-side copy of a ledger's two maps.
//!
//! The controller stores only roots. Whoever wants to deposit, withdraw or
//! settle keeps a mirror, builds requests from it, and applies each committed
//! operation to it so its roots keep matching the controller's.

use ed25519_dalek::{Signer, SigningKey};
use lockchannel_channel::{ChannelProof, ChannelSnapshot};
use lockchannel_ledger::{MerkleWitness, SparseMerkleMap, key, settlement_key};
use lockchannel_types::{
    AssetId, BlockHeight, Digest32, KeyTag, LedgerId, LedgerRoots, LockchannelError, PartyKey,
    Result,
};
use rust_decimal::Decimal;

use crate::controller::{
    DepositRequest, SettlementRequest, WithdrawRequest, settlement_outcome, withdraw_message,
};

#[derive(Debug, Clone)]
pub struct LedgerMirror {
    ledger: LedgerId,
    time_locks: SparseMerkleMap<BlockHeight>,
    balances: SparseMerkleMap<Decimal>,
}

impl LedgerMirror {
    /// An empty mirror; its roots are the empty roots.
    #[must_use]
    pub fn new(ledger: LedgerId) -> Self {
        Self {
            ledger,
            time_locks: SparseMerkleMap::new(),
            balances: SparseMerkleMap::new(),
        }
    }

    /// Roots of the two mirrored maps.
    #[must_use]
    pub fn roots(&self) -> LedgerRoots {
        LedgerRoots::new(self.time_locks.root(), self.balances.root())
    }

    /// Lock height of the party's deposits; zero if none.
    #[must_use]
    pub fn lock_of(&self, party: &PartyKey, asset: &AssetId) -> BlockHeight {
        self.time_locks.get(&key(party, asset, KeyTag::TimeLock))
    }

    /// Escrowed balance; zero for a party that never deposited.
    #[must_use]
    pub fn balance_of(&self, party: &PartyKey, asset: &AssetId) -> Decimal {
        self.balances.get(&key(party, asset, KeyTag::Balance))
    }

    /// Whether `party` has settled the channel with digest `channel`.
    #[must_use]
    pub fn is_settled(&self, party: &PartyKey, channel: &Digest32) -> bool {
        !self.settlement_marker(party, channel).is_zero()
    }

    /// The marker `party` recorded for `channel`; zero if unsettled.
    #[must_use]
    pub fn settlement_marker(&self, party: &PartyKey, channel: &Digest32) -> Decimal {
        self.balances.get(&settlement_key(party, channel))
    }

    /// A deposit of `amount` proven against the mirror's current leaves.
    pub fn deposit_request(
        &self,
        party: PartyKey,
        asset: AssetId,
        amount: Decimal,
        requested_lock: BlockHeight,
    ) -> DepositRequest {
        let lock_key = key(&party, &asset, KeyTag::TimeLock);
        let balance_key = key(&party, &asset, KeyTag::Balance);
        DepositRequest {
            party,
            asset,
            amount,
            requested_lock,
            lock_before: self.time_locks.get(&lock_key),
            balance_before: self.balances.get(&balance_key),
            lock_witness: self.time_locks.witness(&lock_key),
            balance_witness: self.balances.witness(&balance_key),
        }
    }

    /// Mirror a committed deposit.
    pub fn apply_deposit(&mut self, request: &DepositRequest) {
        let balance = request.balance_before + request.amount;
        self.time_locks
            .set(key(&request.party, &request.asset, KeyTag::TimeLock), request.requested_lock);
        self.balances
            .set(key(&request.party, &request.asset, KeyTag::Balance), balance);
    }

    /// A withdrawal of the party's whole balance, signed against the
    /// mirror's current balance root.
    pub fn withdraw_request(&self, signing_key: &SigningKey, asset: AssetId) -> WithdrawRequest {
        let party = PartyKey::from(signing_key.verifying_key());
        let lock_key = key(&party, &asset, KeyTag::TimeLock);
        let balance_key = key(&party, &asset, KeyTag::Balance);
        let lock_value = self.time_locks.get(&lock_key);
        let balance_value = self.balances.get(&balance_key);
        let msg = withdraw_message(
            &self.ledger,
            &asset,
            &self.balances.root(),
            lock_value,
            balance_value,
        );
        WithdrawRequest {
            party,
            asset,
            lock_witness: self.time_locks.witness(&lock_key),
            balance_witness: self.balances.witness(&balance_key),
            lock_value,
            balance_value,
            authorization: signing_key.sign(&msg),
        }
    }

    /// Mirror a committed withdrawal.
    pub fn apply_withdrawal(&mut self, party: &PartyKey, asset: &AssetId) {
        self.time_locks
            .set(key(party, asset, KeyTag::TimeLock), BlockHeight(0));
        self.balances
            .set(key(party, asset, KeyTag::Balance), Decimal::ZERO);
    }

    /// Base snapshot and balance witnesses for a channel opened now.
    pub fn channel_base(
        &self,
        party1: PartyKey,
        party2: PartyKey,
        asset: AssetId,
    ) -> (ChannelSnapshot, MerkleWitness, MerkleWitness) {
        let key1 = key(&party1, &asset, KeyTag::Balance);
        let key2 = key(&party2, &asset, KeyTag::Balance);
        let snapshot = ChannelSnapshot {
            party1,
            party2,
            asset,
            balance_root: self.balances.root(),
            balance1: self.balances.get(&key1),
            balance2: self.balances.get(&key2),
            transfer_delta: Decimal::ZERO,
        };
        (snapshot, self.balances.witness(&key1), self.balances.witness(&key2))
    }

    /// Settlement of `proof` for `party` against the mirror's current state.
    ///
    /// # Errors
    /// Any error of [`settlement_outcome`].
    pub fn settlement_request(&self, party: PartyKey, proof: &ChannelProof) -> Result<SettlementRequest> {
        let asset = proof.asset();
        let channel = proof.channel_digest();
        let counterparty_key = settlement_key(&counterparty(proof, &party)?, &channel);
        let counterparty_marker = self.balances.get(&counterparty_key);
        let (final_balance, _) = settlement_outcome(proof, &party, counterparty_marker)?;

        let balance_key = key(&party, &asset, KeyTag::Balance);
        let marker_key = settlement_key(&party, &channel);
        let mut after = self.balances.clone();
        after.set(balance_key, final_balance);
        Ok(SettlementRequest {
            asset,
            party,
            balance_witness: self.balances.witness(&balance_key),
            balance_before: self.balances.get(&balance_key),
            counterparty_marker,
            counterparty_witness: self.balances.witness(&counterparty_key),
            marker_before: self.balances.get(&marker_key),
            marker_witness: after.witness(&marker_key),
            proof: proof.clone(),
        })
    }

    /// Mirror a committed settlement.
    ///
    /// # Errors
    /// Any error of [`settlement_outcome`].
    pub fn apply_settlement(&mut self, request: &SettlementRequest) -> Result<()> {
        let (final_balance, marker) =
            settlement_outcome(&request.proof, &request.party, request.counterparty_marker)?;
        self.balances
            .set(key(&request.party, &request.asset, KeyTag::Balance), final_balance);
        self.balances
            .set(settlement_key(&request.party, &request.proof.channel_digest()), marker);
        Ok(())
    }
}

fn counterparty(proof: &ChannelProof, party: &PartyKey) -> Result<PartyKey> {
    let base = proof.base();
    base.role_of(party)
        .map(|role| base.party(role.opposite()))
        .ok_or_else(|| LockchannelError::AuthorizationFailure {
            reason: format!("{party} is not a party to this channel"),
        })
}
