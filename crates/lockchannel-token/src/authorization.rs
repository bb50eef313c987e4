//! Signed payloads accepted by a token ledger.
//!
//! Each message is domain-separated and bound to the asset, so a signature
//! valid for one token ledger is worthless on another.

use ed25519_dalek::{Signer, SigningKey};
use lockchannel_types::{AccountId, AssetId, PartyKey, Signature};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const MINT_DOMAIN: &[u8] = b"lockchannel:mint:v1:";
const CUSTODY_AUTHORITY_DOMAIN: &[u8] = b"lockchannel:custody_authority:v1:";
const PREPARED_CHANGE_DOMAIN: &[u8] = b"lockchannel:prepared_change:v1:";

/// Message the token admin signs to mint `amount` to `receiver`.
///
/// The mint nonce makes every authorization single-use.
#[must_use]
pub fn mint_message(asset: &AssetId, receiver: &AccountId, amount: Decimal, nonce: u64) -> Vec<u8> {
    let mut msg = Vec::with_capacity(128);
    msg.extend_from_slice(MINT_DOMAIN);
    msg.extend_from_slice(asset.as_bytes());
    msg.extend_from_slice(receiver.as_bytes());
    msg.extend_from_slice(&nonce.to_le_bytes());
    msg.extend_from_slice(amount.normalize().to_string().as_bytes());
    msg
}

/// Message the token admin signs to install `key` as the authority over `address`.
#[must_use]
pub fn custody_authority_message(asset: &AssetId, address: &AccountId, key: &PartyKey) -> Vec<u8> {
    let mut msg = Vec::with_capacity(128);
    msg.extend_from_slice(CUSTODY_AUTHORITY_DOMAIN);
    msg.extend_from_slice(asset.as_bytes());
    msg.extend_from_slice(address.as_bytes());
    msg.extend_from_slice(key.as_bytes());
    msg
}

/// A balance change on a custody account, signed by its authority.
///
/// The token ledger applies it only together with a matching credit, so the
/// change must be exactly the negation of the credited amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedChange {
    pub asset: AssetId,
    pub account: AccountId,
    pub balance_change: Decimal,
    pub nonce: u64,
    pub signature: Signature,
}

impl PreparedChange {
    /// Sign a change with the custody authority's key.
    #[must_use]
    pub fn sign(
        key: &SigningKey,
        asset: AssetId,
        account: AccountId,
        balance_change: Decimal,
        nonce: u64,
    ) -> Self {
        let payload = Self::payload(&asset, &account, balance_change, nonce);
        Self {
            asset,
            account,
            balance_change,
            nonce,
            signature: key.sign(&payload),
        }
    }

    /// The bytes covered by `signature`.
    #[must_use]
    pub fn signing_payload(&self) -> Vec<u8> {
        Self::payload(&self.asset, &self.account, self.balance_change, self.nonce)
    }

    fn payload(asset: &AssetId, account: &AccountId, balance_change: Decimal, nonce: u64) -> Vec<u8> {
        let mut msg = Vec::with_capacity(128);
        msg.extend_from_slice(PREPARED_CHANGE_DOMAIN);
        msg.extend_from_slice(asset.as_bytes());
        msg.extend_from_slice(account.as_bytes());
        msg.extend_from_slice(&nonce.to_le_bytes());
        msg.extend_from_slice(balance_change.normalize().to_string().as_bytes());
        msg
    }
}
