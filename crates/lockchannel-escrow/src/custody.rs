//! The custody holder: the only signer that can move escrowed tokens.
//!
//! A holder is bound to one (ledger, asset) pair. It is registered with that
//! asset's token ledger as the authority over the ledger's custody account,
//! and it signs a release only for a capability the controller issued after
//! nullifying the withdrawing party's leaves.

use ed25519_dalek::SigningKey;
use lockchannel_token::{PreparedChange, TokenLedger};
use lockchannel_types::{AccountId, AssetId, LedgerId, LockchannelError, PartyKey, Result, Signature};

use crate::chain::HostChain;
use crate::controller::{CustodyCapability, EscrowController, WithdrawRequest};

pub struct CustodyHolder {
    ledger: LedgerId,
    asset: AssetId,
    account: AccountId,
    signing_key: SigningKey,
}

impl std::fmt::Debug for CustodyHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustodyHolder")
            .field("ledger", &self.ledger)
            .field("asset", &self.asset)
            .field("account", &self.account)
            .field("authority", &self.authority())
            .finish_non_exhaustive()
    }
}

impl CustodyHolder {
    /// Register `signing_key` as custody authority for `controller`'s
    /// account in `token`'s asset.
    ///
    /// # Errors
    /// `AuthorizationFailure` if the token admin did not sign the
    /// registration or the account already has an authority.
    pub fn install(
        controller: &EscrowController,
        token: &mut TokenLedger,
        signing_key: SigningKey,
        admin_authorization: &Signature,
    ) -> Result<Self> {
        let asset = token.asset();
        let account = controller.custody_account(&asset);
        let authority = PartyKey::from(signing_key.verifying_key());
        token.register_custody_authority(account, authority, admin_authorization)?;

        tracing::info!(
            ledger = %controller.id(),
            asset = %asset,
            account = %account,
            authority = %authority,
            "Custody holder installed"
        );
        Ok(Self {
            ledger: controller.id(),
            asset,
            account,
            signing_key,
        })
    }

    /// The only asset this holder releases.
    #[must_use]
    pub fn asset(&self) -> AssetId {
        self.asset
    }

    /// Custody account on the token ledger, derived from the ledger address and asset.
    #[must_use]
    pub fn account(&self) -> AccountId {
        self.account
    }

    /// The key registered with the token ledger.
    #[must_use]
    pub fn authority(&self) -> PartyKey {
        PartyKey::from(self.signing_key.verifying_key())
    }

    /// Nullify the request's leaves and sign the matching custody debit.
    ///
    /// # Errors
    /// - `AuthorizationFailure` if the request, controller or token ledger
    ///   belongs to another ledger or asset
    /// - `InsufficientFunds` if custody cannot cover the withdrawal
    /// - any error of [`EscrowController::validate_withdraw_and_nullify`]
    pub fn prepare_withdraw<C: HostChain>(
        &self,
        controller: &mut EscrowController,
        token: &TokenLedger,
        chain: &C,
        request: &WithdrawRequest,
    ) -> Result<PreparedChange> {
        if controller.id() != self.ledger {
            return Err(LockchannelError::AuthorizationFailure {
                reason: format!("holder serves {}, not {}", self.ledger, controller.id()),
            });
        }
        if request.asset != self.asset || token.asset() != self.asset {
            return Err(LockchannelError::AuthorizationFailure {
                reason: format!("holder for {} cannot release {}", self.asset, request.asset),
            });
        }
        let available = token.balance_of(&self.account);
        if available < request.balance_value {
            return Err(LockchannelError::InsufficientFunds {
                needed: request.balance_value,
                available,
            });
        }

        let capability = controller.validate_withdraw_and_nullify(chain, request)?;
        self.sign_release(capability, token)
    }

    fn sign_release(&self, capability: CustodyCapability, token: &TokenLedger) -> Result<PreparedChange> {
        if capability.ledger() != self.ledger || capability.asset() != self.asset {
            return Err(LockchannelError::AuthorizationFailure {
                reason: "capability issued for another ledger or asset".into(),
            });
        }
        let nonce = token
            .custody_nonce(&self.account)
            .ok_or_else(|| LockchannelError::AuthorizationFailure {
                reason: format!("{} is not registered as custody", self.account),
            })?;

        tracing::debug!(
            asset = %self.asset,
            party = %capability.party(),
            amount = %capability.amount(),
            nonce,
            "Custody release signed"
        );
        Ok(PreparedChange::sign(
            &self.signing_key,
            self.asset,
            self.account,
            -capability.amount(),
            nonce,
        ))
    }
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::Signer;
    use lockchannel_ledger::empty_roots;
    use lockchannel_token::custody_authority_message;
    use lockchannel_types::{BlockHeight, EscrowConfig, test_keys};
    use rust_decimal::Decimal;

    use super::*;
    use crate::chain::SimulatedChain;
    use crate::controller::Lifecycle;
    use crate::mirror::LedgerMirror;

    fn tokyo() -> AssetId {
        AssetId::from_symbol("TOKYO")
    }

    fn setup() -> (EscrowController, TokenLedger, SigningKey) {
        let controller = EscrowController::deploy(EscrowConfig::default()).unwrap();
        let (admin, admin_party) = test_keys::party(200);
        let token = TokenLedger::new(tokyo(), admin_party);
        (controller, token, admin)
    }

    fn install(controller: &EscrowController, token: &mut TokenLedger, admin: &SigningKey, seed: u8) -> Result<CustodyHolder> {
        let (key, party) = test_keys::party(seed);
        let msg = custody_authority_message(&token.asset(), &controller.custody_account(&token.asset()), &party);
        CustodyHolder::install(controller, token, key, &admin.sign(&msg))
    }

    #[test]
    fn install_registers_authority() {
        let (controller, mut token, admin) = setup();
        let holder = install(&controller, &mut token, &admin, 201).unwrap();
        assert_eq!(holder.asset(), tokyo());
        assert_eq!(holder.account(), controller.custody_account(&tokyo()));
        assert_eq!(holder.authority(), test_keys::party(201).1);
        assert!(token.is_custody(&holder.account()));
        assert_eq!(token.custody_nonce(&holder.account()), Some(0));
    }

    #[test]
    fn second_install_rejected() {
        let (controller, mut token, admin) = setup();
        install(&controller, &mut token, &admin, 201).unwrap();
        let err = install(&controller, &mut token, &admin, 202).unwrap_err();
        assert!(matches!(err, LockchannelError::AuthorizationFailure { .. }));
    }

    #[test]
    fn install_needs_admin_signature() {
        let (controller, mut token, _) = setup();
        let impostor = test_keys::party(99).0;
        let err = install(&controller, &mut token, &impostor, 201).unwrap_err();
        assert!(matches!(err, LockchannelError::AuthorizationFailure { .. }));
        assert!(!token.is_custody(&controller.custody_account(&tokyo())));
    }

    #[test]
    fn underfunded_custody_refuses_before_nullifying() {
        // Roots that credit alice with 50 although custody holds nothing.
        let (mut controller, mut token, admin) = setup();
        let holder = install(&controller, &mut token, &admin, 201).unwrap();
        let (alice_key, alice) = test_keys::party(1);
        let mut mirror = LedgerMirror::new(controller.id());
        let deposit = mirror.deposit_request(alice, tokyo(), Decimal::new(50, 0), BlockHeight(5));
        mirror.apply_deposit(&deposit);
        controller.initialize(mirror.roots()).unwrap();

        let chain = SimulatedChain::new(BlockHeight(10));
        let request = mirror.withdraw_request(&alice_key, tokyo());
        let err = holder
            .prepare_withdraw(&mut controller, &token, &chain, &request)
            .unwrap_err();
        assert!(matches!(err, LockchannelError::InsufficientFunds { .. }));
        assert_eq!(controller.roots().unwrap(), mirror.roots());
    }

    #[test]
    fn foreign_asset_request_refused() {
        let (mut controller, mut token, admin) = setup();
        controller.initialize(empty_roots()).unwrap();
        let holder = install(&controller, &mut token, &admin, 201).unwrap();
        let (alice_key, _) = test_keys::party(1);
        let mirror = LedgerMirror::new(controller.id());
        let request = mirror.withdraw_request(&alice_key, AssetId::from_symbol("OSAKA"));
        let err = holder
            .prepare_withdraw(&mut controller, &token, &SimulatedChain::default(), &request)
            .unwrap_err();
        assert!(matches!(err, LockchannelError::AuthorizationFailure { .. }));
    }

    #[test]
    fn holder_bound_to_its_ledger() {
        let (controller, mut token, admin) = setup();
        let holder = install(&controller, &mut token, &admin, 201).unwrap();
        let mut other = EscrowController::deploy(EscrowConfig::default()).unwrap();
        other.initialize(empty_roots()).unwrap();
        let (alice_key, _) = test_keys::party(1);
        let request = LedgerMirror::new(other.id()).withdraw_request(&alice_key, tokyo());
        let err = holder
            .prepare_withdraw(&mut other, &token, &SimulatedChain::default(), &request)
            .unwrap_err();
        assert!(matches!(err, LockchannelError::AuthorizationFailure { .. }));
    }
}
