//! Custody conservation checker.
//!
//! Invariant after every committed deposit and withdrawal:
//! ```text
//! ∀ asset: custody balance == Σ(deposits) - Σ(withdrawals)
//! ```
//!
//! Settlements move value between leaves of the balance map only, so they
//! never touch these totals.

use std::collections::{HashMap, HashSet};

use lockchannel_types::{AssetId, LockchannelError, Result};
use rust_decimal::Decimal;

/// Per-asset deposit and withdrawal totals of one escrow ledger.
#[derive(Debug, Clone, Default)]
pub struct EscrowSupply {
    deposits: HashMap<AssetId, Decimal>,
    withdrawals: HashMap<AssetId, Decimal>,
}

impl EscrowSupply {
    /// Empty totals.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a committed deposit to the asset's total.
    pub fn record_deposit(&mut self, asset: AssetId, amount: Decimal) {
        *self.deposits.entry(asset).or_insert(Decimal::ZERO) += amount;
    }

    /// Add a released withdrawal to the asset's total.
    pub fn record_withdrawal(&mut self, asset: AssetId, amount: Decimal) {
        *self.withdrawals.entry(asset).or_insert(Decimal::ZERO) += amount;
    }

    /// Everything ever deposited in `asset`.
    #[must_use]
    pub fn total_deposits(&self, asset: &AssetId) -> Decimal {
        self.deposits.get(asset).copied().unwrap_or(Decimal::ZERO)
    }

    /// Everything ever released in `asset`.
    #[must_use]
    pub fn total_withdrawals(&self, asset: &AssetId) -> Decimal {
        self.withdrawals.get(asset).copied().unwrap_or(Decimal::ZERO)
    }

    /// Amount custody should hold for an asset: deposits - withdrawals.
    #[must_use]
    pub fn expected_custody(&self, asset: &AssetId) -> Decimal {
        self.total_deposits(asset) - self.total_withdrawals(asset)
    }

    /// Check an observed custody balance against the expected one.
    ///
    /// # Errors
    /// Returns [`LockchannelError::ConservationViolation`] if they differ.
    pub fn verify(&self, asset: &AssetId, actual_custody: Decimal) -> Result<()> {
        let expected = self.expected_custody(asset);
        if actual_custody != expected {
            return Err(LockchannelError::ConservationViolation {
                reason: format!(
                    "{asset}: custody holds {actual_custody}, expected {expected} \
                     (deposits={}, withdrawals={})",
                    self.total_deposits(asset),
                    self.total_withdrawals(asset),
                ),
            });
        }
        Ok(())
    }

    /// Every asset with at least one recorded movement.
    #[must_use]
    pub fn tracked_assets(&self) -> Vec<AssetId> {
        let mut assets: HashSet<AssetId> = self.deposits.keys().copied().collect();
        assets.extend(self.withdrawals.keys().copied());
        let mut out: Vec<AssetId> = assets.into_iter().collect();
        out.sort();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokyo() -> AssetId {
        AssetId::from_symbol("TOKYO")
    }

    #[test]
    fn empty_expects_zero() {
        let supply = EscrowSupply::new();
        assert_eq!(supply.expected_custody(&tokyo()), Decimal::ZERO);
        assert!(supply.verify(&tokyo(), Decimal::ZERO).is_ok());
    }

    #[test]
    fn deposits_minus_withdrawals() {
        let mut supply = EscrowSupply::new();
        supply.record_deposit(tokyo(), Decimal::new(100, 0));
        supply.record_deposit(tokyo(), Decimal::new(50, 0));
        supply.record_withdrawal(tokyo(), Decimal::new(30, 0));
        assert_eq!(supply.expected_custody(&tokyo()), Decimal::new(120, 0));
        assert!(supply.verify(&tokyo(), Decimal::new(120, 0)).is_ok());
    }

    #[test]
    fn imbalance_detected() {
        let mut supply = EscrowSupply::new();
        supply.record_deposit(tokyo(), Decimal::new(10, 0));
        let err = supply.verify(&tokyo(), Decimal::new(11, 0)).unwrap_err();
        assert!(matches!(err, LockchannelError::ConservationViolation { .. }));
    }

    #[test]
    fn assets_independent() {
        let osaka = AssetId::from_symbol("OSAKA");
        let mut supply = EscrowSupply::new();
        supply.record_deposit(tokyo(), Decimal::new(5, 0));
        supply.record_withdrawal(osaka, Decimal::new(0, 0));
        assert_eq!(supply.expected_custody(&osaka), Decimal::ZERO);
        assert_eq!(supply.tracked_assets().len(), 2);
    }
}
