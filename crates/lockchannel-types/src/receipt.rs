//! Receipts returned by every committed ledger operation.
//!
//! A receipt records which roots were replaced by which, so a client can
//! follow the ledger and refresh its witnesses.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{AssetId, LedgerId, LedgerRoots, PartyKey};

/// The operation a receipt records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReceiptKind {
    /// Tokens moved into custody; lock and balance leaves raised.
    Deposit,
    /// Leaves nullified and tokens released from custody.
    Withdrawal,
    /// A channel proof was posted and a final balance committed.
    Settlement,
}

impl std::fmt::Display for ReceiptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deposit => write!(f, "DEPOSIT"),
            Self::Withdrawal => write!(f, "WITHDRAWAL"),
            Self::Settlement => write!(f, "SETTLEMENT"),
        }
    }
}

/// Record of one committed root transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerReceipt {
    pub kind: ReceiptKind,
    pub ledger: LedgerId,
    pub party: PartyKey,
    pub asset: AssetId,
    /// Deposited, withdrawn or settled amount.
    pub amount: Decimal,
    pub roots_before: LedgerRoots,
    pub roots_after: LedgerRoots,
    pub issued_at: DateTime<Utc>,
}
