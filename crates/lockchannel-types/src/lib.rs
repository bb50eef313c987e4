//! # lockchannel-types
//!
//! Shared types, errors, and configuration for the **lockchannel** escrow
//! ledger.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`PartyKey`], [`AssetId`], [`AccountId`], [`LedgerId`], [`BlockHeight`]
//! - **Commitments**: [`LedgerKey`], [`KeyTag`], [`MapKind`], [`LedgerRoots`], [`Digest32`]
//! - **Receipts**: [`LedgerReceipt`], [`ReceiptKind`]
//! - **Configuration**: [`EscrowConfig`]
//! - **Errors**: [`LockchannelError`] with `LC_ERR_` prefix codes
//! - **Constants**: depth and defaults

pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod receipt;
pub mod roots;

pub use config::*;
pub use error::*;
pub use ids::*;
pub use receipt::*;
pub use roots::*;

// Signatures are plain ed25519 throughout.
pub use ed25519_dalek::Signature;

// Constants are accessed via `lockchannel_types::constants::FOO`.
