//! # lockchannel-channel
//!
//! **Off-chain two-party channels over the escrow ledger.**
//!
//! A channel opens on two balances proven against the ledger's balance root,
//! absorbs any number of signed transfers off-chain, and is settled with one
//! [`ChannelProof`] whose size and verification cost do not grow with the
//! number of transfers.
//!
//! ```text
//! base_case(snapshot, w1, w2) -> step -> step -> ... -> post_proof (escrow)
//! ```
//!
//! Rules every step enforces:
//! - balances stay non-negative
//! - the paying party signs (either party for a zero transfer)
//! - `balance1 + balance2` never changes

pub mod proof;
pub mod snapshot;

pub use proof::{ChannelProof, Endorsement, VerifiableAccumulator};
pub use snapshot::{ChannelSnapshot, Role, endorsement_message};
