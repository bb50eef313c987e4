//! Integration test: supply conservation under random activity
//!
//! Mints, transfers and custody releases in random order must never change
//! the relation Σ balances == circulating, and failed operations must leave
//! every balance untouched.

use ed25519_dalek::{Signer, SigningKey};
use lockchannel_token::{PreparedChange, TokenLedger, custody_authority_message, mint_message};
use lockchannel_types::{AccountId, AssetId, LockchannelError, test_keys};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

struct Fixture {
    ledger: TokenLedger,
    admin: SigningKey,
    custody: AccountId,
    custody_key: SigningKey,
    users: Vec<AccountId>,
}

impl Fixture {
    fn new() -> Self {
        let (admin, admin_party) = test_keys::party(250);
        let mut ledger = TokenLedger::new(AssetId::from_symbol("TOKYO"), admin_party);
        let (custody_key, custody_party) = test_keys::party(251);
        let custody = AccountId([0xCC; 32]);
        let msg = custody_authority_message(&ledger.asset(), &custody, &custody_party);
        ledger
            .register_custody_authority(custody, custody_party, &admin.sign(&msg))
            .expect("admin registration should succeed");
        let users = (1..=6).map(|s| test_keys::party(s).1.account()).collect();
        Self {
            ledger,
            admin,
            custody,
            custody_key,
            users,
        }
    }

    fn mint(&mut self, to: AccountId, amount: Decimal) {
        let msg = mint_message(&self.ledger.asset(), &to, amount, self.ledger.mint_nonce());
        self.ledger
            .mint(to, amount, &self.admin.sign(&msg))
            .expect("admin mint should succeed");
    }

    fn release(&mut self, to: AccountId, amount: Decimal) -> Result<(), LockchannelError> {
        let nonce = self
            .ledger
            .custody_nonce(&self.custody)
            .expect("custody registered");
        let change = PreparedChange::sign(&self.custody_key, self.ledger.asset(), self.custody, -amount, nonce);
        self.ledger.approve_and_credit(&change, to, amount)
    }
}

#[test]
fn random_activity_conserves_supply() {
    let mut fx = Fixture::new();
    let mut rng = StdRng::seed_from_u64(42);
    let mut minted = Decimal::ZERO;

    for _ in 0..500 {
        let amount = Decimal::new(rng.gen_range(1..5_000), 2);
        let user = fx.users[rng.gen_range(0..fx.users.len())];
        match rng.gen_range(0..4) {
            0 => {
                fx.mint(user, amount);
                minted += amount;
            }
            1 => {
                let other = fx.users[rng.gen_range(0..fx.users.len())];
                let before = fx.ledger.balance_of(&user);
                match fx.ledger.transfer(user, other, amount) {
                    Ok(()) => {}
                    Err(LockchannelError::InsufficientFunds { .. }) => {
                        assert_eq!(fx.ledger.balance_of(&user), before);
                    }
                    Err(e) => panic!("unexpected transfer error: {e}"),
                }
            }
            2 => {
                let custody = fx.custody;
                let before = fx.ledger.balance_of(&user);
                if fx.ledger.transfer(user, custody, amount).is_err() {
                    assert_eq!(fx.ledger.balance_of(&user), before);
                }
            }
            _ => {
                let before = fx.ledger.balance_of(&fx.custody);
                match fx.release(user, amount) {
                    Ok(()) => assert_eq!(fx.ledger.balance_of(&fx.custody), before - amount),
                    Err(LockchannelError::InsufficientFunds { .. }) => {
                        assert_eq!(fx.ledger.balance_of(&fx.custody), before);
                    }
                    Err(e) => panic!("unexpected release error: {e}"),
                }
            }
        }
        fx.ledger.verify_supply().expect("supply must be conserved");
        assert_eq!(fx.ledger.circulating(), minted);
    }
}

#[test]
fn failed_release_keeps_nonce() {
    let mut fx = Fixture::new();
    let user = fx.users[0];
    let custody = fx.custody;
    fx.mint(user, Decimal::new(50, 0));
    fx.ledger.transfer(user, custody, Decimal::new(50, 0)).unwrap();

    assert!(fx.release(user, Decimal::new(80, 0)).is_err());
    assert_eq!(fx.ledger.custody_nonce(&custody), Some(0));
    fx.release(user, Decimal::new(50, 0)).unwrap();
    assert_eq!(fx.ledger.custody_nonce(&custody), Some(1));
    assert_eq!(fx.ledger.balance_of(&user), Decimal::new(50, 0));
}
