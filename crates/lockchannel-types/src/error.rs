//! Error types for the lockchannel escrow ledger.
//!
//! All errors use the `LC_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Ledger / witness errors
//! - 2xx: Time-lock errors
//! - 3xx: Authorization and replay errors
//! - 4xx: Channel errors
//! - 5xx: Token and conservation errors
//! - 9xx: Lifecycle / general errors
//!
//! Every failure is detected before any state is mutated, so retrying after
//! refreshing witnesses is always safe.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::MapKind;

/// Central error enum for all lockchannel operations.
#[derive(Debug, Error)]
pub enum LockchannelError {
    // =================================================================
    // Ledger Errors (1xx)
    // =================================================================
    /// The witness was built against a root that has since been replaced.
    /// Refresh the witness against the current root and resubmit.
    #[error("LC_ERR_100: Stale {map} root: witness computes {witness_root}, current is {current_root}")]
    StaleRoot {
        map: MapKind,
        witness_root: String,
        current_root: String,
    },

    /// The witness and claimed value do not reproduce the committed root,
    /// or the witness addresses a different key.
    #[error("LC_ERR_101: Witness mismatch in {map} map: {reason}")]
    WitnessMismatch { map: MapKind, reason: String },

    /// The witness has the wrong number of siblings.
    #[error("LC_ERR_102: Malformed witness: expected {expected} siblings, got {actual}")]
    MalformedWitness { expected: usize, actual: usize },

    // =================================================================
    // Time-lock Errors (2xx)
    // =================================================================
    /// Withdrawal before lock expiry, or a deposit lock inside the margin.
    #[error("LC_ERR_200: Time-lock violation: {reason}")]
    TimeLockViolation { reason: String },

    // =================================================================
    // Authorization Errors (3xx)
    // =================================================================
    /// Missing or invalid signature, or custody authority not recognised.
    #[error("LC_ERR_300: Authorization failure: {reason}")]
    AuthorizationFailure { reason: String },

    /// A nullified leaf, used nonce, or settled channel was presented again.
    #[error("LC_ERR_301: Replay suppressed: {reason}")]
    ReplaySuppressed { reason: String },

    // =================================================================
    // Channel Errors (4xx)
    // =================================================================
    /// A channel step would drive a balance below zero.
    #[error("LC_ERR_400: Negative balance violation: {party} would hold {balance}")]
    NegativeBalanceViolation { party: String, balance: Decimal },

    /// The snapshot does not belong to this channel or the base is malformed.
    #[error("LC_ERR_401: Channel mismatch: {reason}")]
    ChannelMismatch { reason: String },

    // =================================================================
    // Token Errors (5xx)
    // =================================================================
    /// Amounts failed to net to zero (mint, transfer, custody release or channel step).
    #[error("LC_ERR_500: Conservation violation: {reason}")]
    ConservationViolation { reason: String },

    /// A token account does not hold enough funds.
    #[error("LC_ERR_501: Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    /// Zero or negative amount where a positive one is required.
    #[error("LC_ERR_502: Invalid amount: {amount}")]
    InvalidAmount { amount: Decimal },

    // =================================================================
    // Lifecycle / General (9xx)
    // =================================================================
    /// The ledger has been deployed but not initialized.
    #[error("LC_ERR_900: Ledger not initialized")]
    NotInitialized,

    /// `initialize` was called twice.
    #[error("LC_ERR_901: Ledger already initialized")]
    AlreadyInitialized,

    /// Configuration error (invalid JSON, out-of-range values).
    #[error("LC_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// Serialization / deserialization error.
    #[error("LC_ERR_903: Serialization error: {0}")]
    Serialization(String),
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, LockchannelError>;

impl From<serde_json::Error> for LockchannelError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
