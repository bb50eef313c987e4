//! # lockchannel-token
//!
//! **Token ledger collaborator for lockchannel.**
//!
//! One [`TokenLedger`] per asset. It is the authorization domain the escrow
//! ledger's custody holder is installed under:
//!
//! 1. **Mint**: admin-signed, nonce-bound; raises circulating supply
//! 2. **Transfer**: between ordinary accounts; custody accounts are refused
//! 3. **Custody authority**: admin installs the key that may debit a
//!    custody account
//! 4. **Approve and credit**: applies a custody-signed [`PreparedChange`]
//!    together with the matching credit
//!
//! ```text
//! party --transfer--> custody --PreparedChange + approve_and_credit--> party
//! ```

pub mod authorization;
pub mod token_ledger;

pub use authorization::{PreparedChange, custody_authority_message, mint_message};
pub use token_ledger::TokenLedger;
