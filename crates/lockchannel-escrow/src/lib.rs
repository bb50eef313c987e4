//! # lockchannel-escrow
//!
//! **Custodial escrow over a pair of committed maps.**
//!
//! The [`EscrowController`] stores two roots and nothing else. Every
//! operation arrives with witnesses for the leaves it touches, is checked
//! against the current roots and, if accepted, replaces both roots at once.
//!
//! ## Operations
//!
//! 1. **Deposit**: tokens move into custody; lock and balance leaves rise
//! 2. **Withdraw**: after the lock expires, the leaves are nullified and the
//!    [`CustodyHolder`] releases exactly the nullified balance
//! 3. **Post proof**: a verified channel proof rewrites one party's balance
//!    and records the channel's split in that party's settlement marker; the
//!    second party to settle gets the complement of the first one's split
//!
//! ## Failure classes
//!
//! - A witness against a recently replaced root is `StaleRoot`: refresh and
//!   retry
//! - A witness that never matched is `WitnessMismatch`
//! - A withdrawal whose balance is already zero is `ReplaySuppressed`
//!
//! [`LedgerMirror`] is the client-side store that builds requests.

pub mod chain;
pub mod controller;
pub mod custody;
pub mod mirror;
pub mod root_history;
pub mod state;
pub mod supply;

pub use chain::{HostChain, SimulatedChain};
pub use controller::{
    CustodyCapability, DepositRequest, EscrowController, Lifecycle, SettlementRequest,
    WithdrawRequest, settlement_outcome, withdraw_message,
};
pub use custody::CustodyHolder;
pub use mirror::LedgerMirror;
pub use root_history::RootHistory;
pub use state::LedgerState;
pub use supply::EscrowSupply;
