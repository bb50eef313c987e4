//! The token ledger for one asset.
//!
//! Tracks per-account balances and the circulating supply. Every asset is
//! its own authorization domain: one admin key mints and installs custody
//! authorities, and custody accounts can only be debited through a change
//! signed by their registered authority.
//!
//! All mutations are atomic: either the operation succeeds in full or no
//! balance, nonce or supply figure changes.

use std::collections::HashMap;

use lockchannel_types::{AccountId, AssetId, LockchannelError, PartyKey, Result, Signature};
use rust_decimal::Decimal;

use crate::authorization::{PreparedChange, custody_authority_message, mint_message};

/// Registered signer for a custody account, with its replay counter.
#[derive(Debug, Clone)]
struct CustodyAuthority {
    key: PartyKey,
    next_nonce: u64,
}

/// Balances and supply for a single asset.
#[derive(Debug, Clone)]
pub struct TokenLedger {
    asset: AssetId,
    admin: PartyKey,
    balances: HashMap<AccountId, Decimal>,
    circulating: Decimal,
    mint_nonce: u64,
    custody: HashMap<AccountId, CustodyAuthority>,
}

impl TokenLedger {
    /// Create an empty ledger for `asset`, administered by `admin`.
    #[must_use]
    pub fn new(asset: AssetId, admin: PartyKey) -> Self {
        Self {
            asset,
            admin,
            balances: HashMap::new(),
            circulating: Decimal::ZERO,
            mint_nonce: 0,
            custody: HashMap::new(),
        }
    }

    /// The asset this ledger issues.
    #[must_use]
    pub fn asset(&self) -> AssetId {
        self.asset
    }

    /// Key that signs mints and custody registrations.
    #[must_use]
    pub fn admin(&self) -> PartyKey {
        self.admin
    }

    /// Balance of `account`; zero if it never held tokens.
    #[must_use]
    pub fn balance_of(&self, account: &AccountId) -> Decimal {
        self.balances.get(account).copied().unwrap_or_default()
    }

    /// Total minted so far.
    #[must_use]
    pub fn circulating(&self) -> Decimal {
        self.circulating
    }

    /// Nonce the next mint authorization must sign over.
    #[must_use]
    pub fn mint_nonce(&self) -> u64 {
        self.mint_nonce
    }

    /// Whether `account` has a registered custody authority.
    #[must_use]
    pub fn is_custody(&self, account: &AccountId) -> bool {
        self.custody.contains_key(account)
    }

    /// Nonce the next prepared change for a custody account must carry.
    #[must_use]
    pub fn custody_nonce(&self, account: &AccountId) -> Option<u64> {
        self.custody.get(account).map(|a| a.next_nonce)
    }

    /// Mint new tokens to `receiver`.
    ///
    /// # Errors
    /// - `InvalidAmount` if `amount <= 0`
    /// - `AuthorizationFailure` if `authorization` is not the admin's
    ///   signature over the current mint message (including replays of an
    ///   earlier, already consumed authorization)
    pub fn mint(&mut self, receiver: AccountId, amount: Decimal, authorization: &Signature) -> Result<()> {
        ensure_positive(amount)?;
        let msg = mint_message(&self.asset, &receiver, amount, self.mint_nonce);
        self.admin.verify(&msg, authorization)?;
        let circulating = checked_credit(self.circulating, amount)?;
        let credited = checked_credit(self.balance_of(&receiver), amount)?;

        self.set_balance(receiver, credited);
        self.circulating = circulating;
        self.mint_nonce += 1;

        tracing::info!(
            asset = %self.asset,
            receiver = %receiver,
            amount = %amount,
            circulating = %self.circulating,
            "Tokens minted"
        );
        Ok(())
    }

    /// Move tokens between ordinary accounts.
    ///
    /// # Errors
    /// - `InvalidAmount` if `amount <= 0`
    /// - `AuthorizationFailure` if `from` is a custody account
    /// - `InsufficientFunds` if `from` holds less than `amount`
    pub fn transfer(&mut self, from: AccountId, to: AccountId, amount: Decimal) -> Result<()> {
        ensure_positive(amount)?;
        if self.is_custody(&from) {
            return Err(LockchannelError::AuthorizationFailure {
                reason: format!("{from} is a custody account and needs a prepared change"),
            });
        }
        self.move_funds(from, to, amount)?;

        tracing::debug!(
            asset = %self.asset,
            from = %from,
            to = %to,
            amount = %amount,
            "Tokens transferred"
        );
        Ok(())
    }

    /// Install `key` as the only authority that can debit `address`.
    ///
    /// # Errors
    /// - `AuthorizationFailure` if the admin did not sign the registration or
    ///   `address` already has an authority
    pub fn register_custody_authority(
        &mut self,
        address: AccountId,
        key: PartyKey,
        authorization: &Signature,
    ) -> Result<()> {
        if self.is_custody(&address) {
            return Err(LockchannelError::AuthorizationFailure {
                reason: format!("{address} already has a custody authority"),
            });
        }
        let msg = custody_authority_message(&self.asset, &address, &key);
        self.admin.verify(&msg, authorization)?;

        self.custody.insert(
            address,
            CustodyAuthority {
                key,
                next_nonce: 0,
            },
        );

        tracing::info!(
            asset = %self.asset,
            account = %address,
            authority = %key,
            "Custody authority registered"
        );
        Ok(())
    }

    /// Apply a custody debit of exactly `amount` and credit it to `to`.
    ///
    /// # Errors
    /// - `InvalidAmount` if `amount <= 0`
    /// - `AuthorizationFailure` if the change is for another asset, the
    ///   account has no custody authority, or the signature does not verify
    /// - `ReplaySuppressed` if the nonce is not the account's next nonce
    /// - `ConservationViolation` if `balance_change != -amount`
    /// - `InsufficientFunds` if custody holds less than `amount`
    pub fn approve_and_credit(
        &mut self,
        prepared: &PreparedChange,
        to: AccountId,
        amount: Decimal,
    ) -> Result<()> {
        ensure_positive(amount)?;
        if prepared.asset != self.asset {
            return Err(LockchannelError::AuthorizationFailure {
                reason: format!(
                    "prepared change is for {}, this ledger is {}",
                    prepared.asset, self.asset
                ),
            });
        }
        let (key, expected_nonce) = self
            .custody
            .get(&prepared.account)
            .map(|a| (a.key, a.next_nonce))
            .ok_or_else(|| LockchannelError::AuthorizationFailure {
                reason: format!("{} has no custody authority", prepared.account),
            })?;
        key.verify(&prepared.signing_payload(), &prepared.signature)?;
        if prepared.nonce != expected_nonce {
            return Err(LockchannelError::ReplaySuppressed {
                reason: format!(
                    "custody nonce {} already used or out of order (next is {expected_nonce})",
                    prepared.nonce
                ),
            });
        }
        if prepared.balance_change != -amount {
            return Err(LockchannelError::ConservationViolation {
                reason: format!(
                    "custody change {} does not offset credit {amount}",
                    prepared.balance_change
                ),
            });
        }

        self.move_funds(prepared.account, to, amount)?;
        if let Some(authority) = self.custody.get_mut(&prepared.account) {
            authority.next_nonce += 1;
        }

        tracing::info!(
            asset = %self.asset,
            custody = %prepared.account,
            to = %to,
            amount = %amount,
            nonce = prepared.nonce,
            "Custody release approved"
        );
        Ok(())
    }

    /// Check that account balances sum to the circulating supply.
    ///
    /// # Errors
    /// Returns `ConservationViolation` if they differ.
    pub fn verify_supply(&self) -> Result<()> {
        let total: Decimal = self.balances.values().copied().sum();
        if total != self.circulating {
            return Err(LockchannelError::ConservationViolation {
                reason: format!(
                    "{}: balances sum to {total}, circulating is {}",
                    self.asset, self.circulating
                ),
            });
        }
        Ok(())
    }

    /// Debit `from` and credit `to`; nothing changes unless both succeed.
    fn move_funds(&mut self, from: AccountId, to: AccountId, amount: Decimal) -> Result<()> {
        let available = self.balance_of(&from);
        if available < amount {
            return Err(LockchannelError::InsufficientFunds {
                needed: amount,
                available,
            });
        }
        if from == to {
            return Ok(());
        }
        let credited = checked_credit(self.balance_of(&to), amount)?;
        self.set_balance(from, available - amount);
        self.set_balance(to, credited);
        Ok(())
    }

    fn set_balance(&mut self, account: AccountId, balance: Decimal) {
        if balance.is_zero() {
            self.balances.remove(&account);
        } else {
            self.balances.insert(account, balance);
        }
    }
}

/// `current + amount`, or `InvalidAmount` if the sum leaves `Decimal` range.
fn checked_credit(current: Decimal, amount: Decimal) -> Result<Decimal> {
    current
        .checked_add(amount)
        .ok_or(LockchannelError::InvalidAmount { amount })
}

fn ensure_positive(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(LockchannelError::InvalidAmount { amount });
    }
    Ok(())
}
