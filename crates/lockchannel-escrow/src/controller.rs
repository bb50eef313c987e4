//! The escrow controller: the only code that moves the ledger's roots.
//!
//! Every operation follows the same shape:
//! 1. Check preconditions (height, amount, asset, signatures)
//! 2. Check every witness against the current roots
//! 3. Compute the replacement roots from the witnesses
//! 4. Perform external effects (token transfer)
//! 5. Commit both roots at once and emit a receipt
//!
//! Nothing is written before step 5, so a failure at any point leaves the
//! ledger untouched. `withdraw` spans two steps 5 (nullify, then release)
//! and restores a checkpoint if the release fails.

use chrono::Utc;
use lockchannel_channel::{ChannelProof, Role, VerifiableAccumulator};
use lockchannel_ledger::{MerkleWitness, key, settlement_key, update};
use lockchannel_token::TokenLedger;
use lockchannel_types::{
    AccountId, AssetId, BlockHeight, Digest32, EscrowConfig, KeyTag, LedgerId, LedgerReceipt,
    LedgerRoots, LockchannelError, MapKind, PartyKey, ReceiptKind, Result, Signature,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::chain::HostChain;
use crate::custody::CustodyHolder;
use crate::state::LedgerState;
use crate::supply::EscrowSupply;

const LEDGER_ADDRESS_DOMAIN: &[u8] = b"lockchannel:ledger:v1:";
const CUSTODY_DOMAIN: &[u8] = b"lockchannel:custody:v1:";
const WITHDRAW_DOMAIN: &[u8] = b"lockchannel:withdraw:v1:";

/// Deploy-then-initialize lifecycle of a ledger instance.
pub trait Lifecycle: Sized {
    /// Create an instance with no roots yet.
    fn deploy(config: EscrowConfig) -> Result<Self>;

    /// Install the initial roots. Allowed exactly once.
    fn initialize(&mut self, roots: LedgerRoots) -> Result<()>;

    fn is_initialized(&self) -> bool;
}

/// Everything a party submits to deposit.
///
/// `lock_before` and `balance_before` are the party's current leaf values,
/// proven by the two witnesses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositRequest {
    pub party: PartyKey,
    pub asset: AssetId,
    pub amount: Decimal,
    pub requested_lock: BlockHeight,
    pub lock_before: BlockHeight,
    pub balance_before: Decimal,
    pub lock_witness: MerkleWitness,
    pub balance_witness: MerkleWitness,
}

/// Everything a party submits to withdraw its whole balance of one asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawRequest {
    pub party: PartyKey,
    pub asset: AssetId,
    pub lock_witness: MerkleWitness,
    pub balance_witness: MerkleWitness,
    pub lock_value: BlockHeight,
    pub balance_value: Decimal,
    /// Party signature over [`withdraw_message`].
    pub authorization: Signature,
}

/// A party's settlement of a channel proof.
///
/// The counterparty's marker for the channel is proven against the current
/// balance root; zero means this is the first settlement of the channel.
/// `marker_witness` opens the party's own marker against the balance root
/// *after* the final balance is written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementRequest {
    pub asset: AssetId,
    pub party: PartyKey,
    pub balance_witness: MerkleWitness,
    pub balance_before: Decimal,
    pub counterparty_marker: Decimal,
    pub counterparty_witness: MerkleWitness,
    pub marker_before: Decimal,
    pub marker_witness: MerkleWitness,
    pub proof: ChannelProof,
}

/// Single-use permission to release exactly `amount` of `asset` to `party`.
///
/// Only the controller creates one, only after nullifying the party's
/// leaves; the custody holder consumes it by value.
#[derive(Debug)]
pub struct CustodyCapability {
    ledger: LedgerId,
    asset: AssetId,
    party: PartyKey,
    amount: Decimal,
}

impl CustodyCapability {
    /// Ledger whose controller issued the capability.
    #[must_use]
    pub fn ledger(&self) -> LedgerId {
        self.ledger
    }

    /// Asset to release.
    #[must_use]
    pub fn asset(&self) -> AssetId {
        self.asset
    }

    /// Party whose leaves were nullified; the release goes to its account.
    #[must_use]
    pub fn party(&self) -> PartyKey {
        self.party
    }

    /// The nullified balance, which is exactly what may leave custody.
    #[must_use]
    pub fn amount(&self) -> Decimal {
        self.amount
    }
}

/// Message a party signs to authorize a withdrawal.
///
/// Binding the current balance root makes the signature useless after any
/// later commit.
#[must_use]
pub fn withdraw_message(
    ledger: &LedgerId,
    asset: &AssetId,
    balance_root: &Digest32,
    lock_value: BlockHeight,
    balance_value: Decimal,
) -> Vec<u8> {
    let mut msg = Vec::with_capacity(160);
    msg.extend_from_slice(WITHDRAW_DOMAIN);
    msg.extend_from_slice(ledger.as_bytes());
    msg.extend_from_slice(asset.as_bytes());
    msg.extend_from_slice(balance_root);
    msg.extend_from_slice(&lock_value.0.to_le_bytes());
    msg.extend_from_slice(balance_value.normalize().to_string().as_bytes());
    msg
}

/// Final balance of `party` and the marker value its settlement records.
///
/// A marker holds party1's settled balance plus one, so any nonzero marker
/// pins the channel's split. The first settlement takes its balance from
/// the proof's latest snapshot. Once the counterparty has settled,
/// `counterparty_marker` is nonzero and the party gets the complement of
/// the recorded split, whatever state its own proof reaches.
///
/// # Errors
/// - `AuthorizationFailure` if `party` is not in the channel
/// - `ConservationViolation` if the recorded split lies outside the
///   channel's total
pub fn settlement_outcome(
    proof: &ChannelProof,
    party: &PartyKey,
    counterparty_marker: Decimal,
) -> Result<(Decimal, Decimal)> {
    let base = proof.base();
    let role = base
        .role_of(party)
        .ok_or_else(|| LockchannelError::AuthorizationFailure {
            reason: format!("{party} is not a party to this channel"),
        })?;

    if counterparty_marker.is_zero() {
        let latest = proof.latest();
        let marker = latest
            .balance1
            .checked_add(Decimal::ONE)
            .ok_or_else(|| LockchannelError::ConservationViolation {
                reason: format!("split {} cannot be recorded", latest.balance1),
            })?;
        return Ok((latest.balance(role), marker));
    }

    let total = base.balance1.checked_add(base.balance2);
    let split1 = counterparty_marker.checked_sub(Decimal::ONE);
    match (total, split1) {
        (Some(total), Some(split1)) if split1 >= Decimal::ZERO && split1 <= total => {
            let final_balance = match role {
                Role::Party1 => split1,
                Role::Party2 => total - split1,
            };
            Ok((final_balance, counterparty_marker))
        }
        _ => Err(LockchannelError::ConservationViolation {
            reason: format!("recorded marker {counterparty_marker} is outside the channel total"),
        }),
    }
}

/// One escrow ledger instance.
#[derive(Debug)]
pub struct EscrowController {
    id: LedgerId,
    address: AccountId,
    config: EscrowConfig,
    state: Option<LedgerState>,
    supply: EscrowSupply,
}

impl Lifecycle for EscrowController {
    fn deploy(config: EscrowConfig) -> Result<Self> {
        config.validate()?;
        let id = LedgerId::new();
        let mut hasher = Sha256::new();
        hasher.update(LEDGER_ADDRESS_DOMAIN);
        hasher.update(id.as_bytes());
        let mut address = [0u8; 32];
        address.copy_from_slice(&hasher.finalize());

        tracing::info!(ledger = %id, "Escrow ledger deployed");
        Ok(Self {
            id,
            address: AccountId(address),
            config,
            state: None,
            supply: EscrowSupply::new(),
        })
    }

    fn initialize(&mut self, roots: LedgerRoots) -> Result<()> {
        if self.state.is_some() {
            return Err(LockchannelError::AlreadyInitialized);
        }
        self.state = Some(LedgerState::new(roots, self.config.root_history_size));
        tracing::info!(
            ledger = %self.id,
            time_lock_root = hex::encode(roots.time_lock_root),
            balance_root = hex::encode(roots.balance_root),
            "Escrow ledger initialized"
        );
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.state.is_some()
    }
}

impl EscrowController {
    /// Random identity assigned at deploy.
    #[must_use]
    pub fn id(&self) -> LedgerId {
        self.id
    }

    /// Address derived from the id; custody accounts derive from it.
    #[must_use]
    pub fn address(&self) -> AccountId {
        self.address
    }

    /// Configuration the ledger was deployed with.
    #[must_use]
    pub fn config(&self) -> &EscrowConfig {
        &self.config
    }

    /// Running deposit and withdrawal totals per asset.
    #[must_use]
    pub fn supply(&self) -> &EscrowSupply {
        &self.supply
    }

    /// The two committed roots.
    pub fn roots(&self) -> Result<LedgerRoots> {
        self.state().map(LedgerState::roots)
    }

    /// Token account holding this ledger's deposits of `asset`.
    #[must_use]
    pub fn custody_account(&self, asset: &AssetId) -> AccountId {
        let mut hasher = Sha256::new();
        hasher.update(CUSTODY_DOMAIN);
        hasher.update(self.address.as_bytes());
        hasher.update(asset.as_bytes());
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        AccountId(out)
    }

    /// Move `amount` into custody and raise the party's lock and balance.
    ///
    /// # Errors
    /// - `NotInitialized`
    /// - `TimeLockViolation` if `requested_lock < height + min_lock_margin`
    /// - `InvalidAmount` if `amount <= 0`
    /// - `AuthorizationFailure` if `token` is not the request asset's ledger
    /// - `StaleRoot` / `WitnessMismatch` / `MalformedWitness` on witness checks
    /// - any token transfer error (`InsufficientFunds`, ...)
    pub fn deposit<C: HostChain>(
        &mut self,
        token: &mut TokenLedger,
        chain: &C,
        request: DepositRequest,
    ) -> Result<LedgerReceipt> {
        let state = self.state()?;
        let height = chain.height();
        let earliest = height.saturating_add(self.config.min_lock_margin);
        if request.requested_lock < earliest {
            return Err(LockchannelError::TimeLockViolation {
                reason: format!(
                    "lock {} is before {earliest} (height {height} + margin {})",
                    request.requested_lock, self.config.min_lock_margin
                ),
            });
        }
        if request.amount <= Decimal::ZERO {
            return Err(LockchannelError::InvalidAmount {
                amount: request.amount,
            });
        }
        ensure_token(token, &request.asset)?;

        let lock_key = key(&request.party, &request.asset, KeyTag::TimeLock);
        let balance_key = key(&request.party, &request.asset, KeyTag::Balance);
        state.check_witness(MapKind::TimeLock, &lock_key, &request.lock_before, &request.lock_witness)?;
        state.check_witness(
            MapKind::Balance,
            &balance_key,
            &request.balance_before,
            &request.balance_witness,
        )?;

        let new_balance = request
            .balance_before
            .checked_add(request.amount)
            .ok_or(LockchannelError::InvalidAmount {
                amount: request.amount,
            })?;
        let next = LedgerRoots::new(
            update(&request.lock_witness, &request.requested_lock)?,
            update(&request.balance_witness, &new_balance)?,
        );

        let custody = self.custody_account(&request.asset);
        token.transfer(request.party.account(), custody, request.amount)?;

        let before = self.commit(next)?;
        self.supply.record_deposit(request.asset, request.amount);

        tracing::info!(
            ledger = %self.id,
            party = %request.party,
            asset = %request.asset,
            amount = %request.amount,
            lock = %request.requested_lock,
            time_lock_root = hex::encode(next.time_lock_root),
            balance_root = hex::encode(next.balance_root),
            "Deposit committed"
        );
        Ok(self.receipt(ReceiptKind::Deposit, request.party, request.asset, request.amount, before, next))
    }

    /// Check a withdrawal and zero the party's lock and balance leaves.
    ///
    /// Returns the capability the custody holder needs to release funds. No
    /// tokens move here.
    ///
    /// # Errors
    /// - `NotInitialized`
    /// - `ReplaySuppressed` if the balance is zero or already nullified
    /// - `StaleRoot` / `WitnessMismatch` / `MalformedWitness` on witness checks
    /// - `TimeLockViolation` if `height <= lock_value`
    /// - `AuthorizationFailure` if the party did not sign the request
    pub fn validate_withdraw_and_nullify<C: HostChain>(
        &mut self,
        chain: &C,
        request: &WithdrawRequest,
    ) -> Result<CustodyCapability> {
        let state = self.state()?;
        if request.balance_value.is_zero() {
            return Err(LockchannelError::ReplaySuppressed {
                reason: format!("{} has nothing to withdraw", request.party),
            });
        }
        if request.balance_value < Decimal::ZERO {
            return Err(LockchannelError::InvalidAmount {
                amount: request.balance_value,
            });
        }

        let lock_key = key(&request.party, &request.asset, KeyTag::TimeLock);
        let balance_key = key(&request.party, &request.asset, KeyTag::Balance);
        if let Err(err) = state.check_witness(
            MapKind::Balance,
            &balance_key,
            &request.balance_value,
            &request.balance_witness,
        ) {
            let nullified = state
                .check_witness(MapKind::Balance, &balance_key, &Decimal::ZERO, &request.balance_witness)
                .is_ok();
            if nullified {
                tracing::warn!(
                    ledger = %self.id,
                    party = %request.party,
                    asset = %request.asset,
                    "Withdrawal of a nullified balance rejected"
                );
                return Err(LockchannelError::ReplaySuppressed {
                    reason: format!("balance of {} is already nullified", request.party),
                });
            }
            return Err(err);
        }
        state.check_witness(MapKind::TimeLock, &lock_key, &request.lock_value, &request.lock_witness)?;

        let height = chain.height();
        if height <= request.lock_value {
            return Err(LockchannelError::TimeLockViolation {
                reason: format!("funds locked until {}, height is {height}", request.lock_value),
            });
        }

        let current = state.roots();
        let msg = withdraw_message(
            &self.id,
            &request.asset,
            &current.balance_root,
            request.lock_value,
            request.balance_value,
        );
        request.party.verify(&msg, &request.authorization)?;

        let next = LedgerRoots::new(
            update(&request.lock_witness, &BlockHeight(0))?,
            update(&request.balance_witness, &Decimal::ZERO)?,
        );
        self.commit(next)?;

        tracing::info!(
            ledger = %self.id,
            party = %request.party,
            asset = %request.asset,
            amount = %request.balance_value,
            time_lock_root = hex::encode(next.time_lock_root),
            balance_root = hex::encode(next.balance_root),
            "Withdrawal nullified"
        );
        Ok(CustodyCapability {
            ledger: self.id,
            asset: request.asset,
            party: request.party,
            amount: request.balance_value,
        })
    }

    /// Nullify through `holder` and release the funds from custody.
    ///
    /// Atomic: if the holder or the token ledger refuses, the roots are
    /// restored to their state before the call.
    ///
    /// # Errors
    /// Any error of [`Self::validate_withdraw_and_nullify`],
    /// [`CustodyHolder::prepare_withdraw`] or
    /// [`TokenLedger::approve_and_credit`].
    pub fn withdraw<C: HostChain>(
        &mut self,
        token: &mut TokenLedger,
        chain: &C,
        holder: &CustodyHolder,
        request: WithdrawRequest,
    ) -> Result<LedgerReceipt> {
        let checkpoint = self.state()?.clone();
        let before = checkpoint.roots();

        let released = holder
            .prepare_withdraw(self, token, chain, &request)
            .and_then(|change| token.approve_and_credit(&change, request.party.account(), request.balance_value));
        if let Err(err) = released {
            let nullified = self.roots().is_ok_and(|roots| roots != before);
            self.state = Some(checkpoint);
            if nullified {
                tracing::warn!(
                    ledger = %self.id,
                    party = %request.party,
                    error = %err,
                    "Custody release failed; nullification rolled back"
                );
            }
            return Err(err);
        }

        let after = self.roots()?;
        self.supply.record_withdrawal(request.asset, request.balance_value);
        tracing::info!(
            ledger = %self.id,
            party = %request.party,
            asset = %request.asset,
            amount = %request.balance_value,
            "Withdrawal released"
        );
        Ok(self.receipt(
            ReceiptKind::Withdrawal,
            request.party,
            request.asset,
            request.balance_value,
            before,
            after,
        ))
    }

    /// Settle a channel proof for one party.
    ///
    /// Writes the party's final channel balance (see [`settlement_outcome`])
    /// and records the channel's split in the party's settlement marker, in a
    /// single balance-root commit. Anyone may post either party's settlement.
    ///
    /// # Errors
    /// - `NotInitialized`
    /// - any error of `proof.verify()`
    /// - `ChannelMismatch` if the proof is for another asset
    /// - `WitnessMismatch` if the channel was opened on a balance root this
    ///   ledger does not remember
    /// - `AuthorizationFailure` if the party is not in the channel
    /// - `StaleRoot` / `WitnessMismatch` on the balance, counterparty or
    ///   marker witness
    /// - `ReplaySuppressed` if the party already settled this channel
    /// - `ConservationViolation` if the party's balance changed since the
    ///   channel opened, or a first settlement would raise it
    pub fn post_proof(&mut self, request: SettlementRequest) -> Result<LedgerReceipt> {
        let state = self.state()?;
        let proof = &request.proof;
        proof.verify()?;
        if proof.asset() != request.asset {
            return Err(LockchannelError::ChannelMismatch {
                reason: format!("proof is for {}, request for {}", proof.asset(), request.asset),
            });
        }
        let base = proof.base();
        let current = state.roots();
        let known_base = base.balance_root == current.balance_root
            || state.is_superseded(MapKind::Balance, &base.balance_root);
        if !known_base {
            tracing::warn!(
                ledger = %self.id,
                base_root = hex::encode(base.balance_root),
                "Channel opened on an unknown balance root"
            );
            return Err(LockchannelError::WitnessMismatch {
                map: MapKind::Balance,
                reason: format!(
                    "channel opened on balance root {} this ledger does not remember",
                    hex::encode(base.balance_root)
                ),
            });
        }
        let role = base
            .role_of(&request.party)
            .ok_or_else(|| LockchannelError::AuthorizationFailure {
                reason: format!("{} is not a party to this channel", request.party),
            })?;
        let opening_balance = base.balance(role);
        let counterparty = base.party(role.opposite());
        let channel = proof.channel_digest();

        let balance_key = key(&request.party, &request.asset, KeyTag::Balance);
        state.check_witness(
            MapKind::Balance,
            &balance_key,
            &request.balance_before,
            &request.balance_witness,
        )?;
        state.check_witness(
            MapKind::Balance,
            &settlement_key(&counterparty, &channel),
            &request.counterparty_marker,
            &request.counterparty_witness,
        )?;

        let (final_balance, marker) = settlement_outcome(proof, &request.party, request.counterparty_marker)?;
        let intermediate = update(&request.balance_witness, &final_balance)?;

        let marker_key = settlement_key(&request.party, &channel);
        if request.marker_witness.key() != &marker_key {
            return Err(LockchannelError::WitnessMismatch {
                map: MapKind::Balance,
                reason: format!(
                    "marker witness opens {} but {marker_key} was expected",
                    request.marker_witness.key()
                ),
            });
        }
        let (proven, _) = request.marker_witness.compute_root_and_key(&request.marker_before)?;
        if proven != intermediate {
            return Err(LockchannelError::WitnessMismatch {
                map: MapKind::Balance,
                reason: "marker witness does not follow the balance update".into(),
            });
        }
        if !request.marker_before.is_zero() {
            tracing::warn!(
                ledger = %self.id,
                party = %request.party,
                channel = hex::encode(&channel[..8]),
                "Second settlement of a channel rejected"
            );
            return Err(LockchannelError::ReplaySuppressed {
                reason: format!("{} already settled this channel", request.party),
            });
        }
        if request.balance_before != opening_balance {
            return Err(LockchannelError::ConservationViolation {
                reason: format!(
                    "{} holds {} but opened the channel with {opening_balance}",
                    request.party, request.balance_before
                ),
            });
        }
        if request.counterparty_marker.is_zero() && final_balance > opening_balance {
            return Err(LockchannelError::ConservationViolation {
                reason: format!(
                    "{} would gain {} before {counterparty} settles",
                    request.party,
                    final_balance - opening_balance
                ),
            });
        }

        let next = current.with_root(MapKind::Balance, update(&request.marker_witness, &marker)?);
        let before = self.commit(next)?;

        tracing::info!(
            ledger = %self.id,
            party = %request.party,
            asset = %request.asset,
            channel = hex::encode(&channel[..8]),
            steps = proof.steps(),
            final_balance = %final_balance,
            balance_root = hex::encode(next.balance_root),
            "Channel settled"
        );
        Ok(self.receipt(
            ReceiptKind::Settlement,
            request.party,
            request.asset,
            final_balance,
            before,
            next,
        ))
    }

    /// Check custody for the token's asset against deposits - withdrawals.
    ///
    /// # Errors
    /// Returns `ConservationViolation` if they differ.
    pub fn verify_custody(&self, token: &TokenLedger) -> Result<()> {
        let asset = token.asset();
        let held = token.balance_of(&self.custody_account(&asset));
        self.supply.verify(&asset, held)
    }

    fn state(&self) -> Result<&LedgerState> {
        self.state.as_ref().ok_or(LockchannelError::NotInitialized)
    }

    /// Replace the roots; returns the ones replaced.
    fn commit(&mut self, next: LedgerRoots) -> Result<LedgerRoots> {
        let state = self.state.as_mut().ok_or(LockchannelError::NotInitialized)?;
        let before = state.roots();
        state.commit(next);
        Ok(before)
    }

    fn receipt(
        &self,
        kind: ReceiptKind,
        party: PartyKey,
        asset: AssetId,
        amount: Decimal,
        roots_before: LedgerRoots,
        roots_after: LedgerRoots,
    ) -> LedgerReceipt {
        LedgerReceipt {
            kind,
            ledger: self.id,
            party,
            asset,
            amount,
            roots_before,
            roots_after,
            issued_at: Utc::now(),
        }
    }
}

fn ensure_token(token: &TokenLedger, asset: &AssetId) -> Result<()> {
    if token.asset() != *asset {
        return Err(LockchannelError::AuthorizationFailure {
            reason: format!("token ledger for {} cannot move {asset}", token.asset()),
        });
    }
    Ok(())
}
