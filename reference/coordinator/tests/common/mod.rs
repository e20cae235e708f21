//! A two-ledger market: Alice holds UTXOs on "zeto", Bob holds confidential
//! balance on "fhe-erc20".

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;

use dvp_common::{Address, Digest, LockId, LockOutcome, LockView};
use dvp_coordinator::{AtomOperation, Coordinator, CoordinatorConfig};
use dvp_crypto::{DigestProver, DigestVerifier, PartyKeys, Statement, Utxo};
use dvp_ledger::{
    AccountLockRequest, ConfidentialAccountLedger, ConfidentialArithmetic, LockCommitment,
    LockableLedger, MockFheOracle, UtxoLedger, UtxoLockRequest, UtxoTransfer, UtxoTransition,
};

pub const PROOF_DOMAIN: &str = "zeto-e2e";
pub const ALICE_LOCK: LockId = LockId::from_bytes([0xa1; 32]);
pub const BOB_LOCK: LockId = LockId::from_bytes([0xb0; 32]);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Alice's locked leg, with the outputs of both outcomes.
pub struct AliceLeg {
    pub view: LockView,
    pub locked: Utxo,
    pub to_bob: Utxo,
    pub change: Utxo,
    pub refund: Utxo,
}

pub struct Market {
    pub coordinator: Coordinator,
    pub prover: DigestProver,
    pub oracle: Arc<MockFheOracle>,
    pub zeto: Arc<Mutex<UtxoLedger>>,
    pub token: Arc<Mutex<ConfidentialAccountLedger>>,
    pub minter: Address,
    pub alice: PartyKeys,
    pub bob: PartyKeys,
    pub alice_funds: Utxo,
}

impl Market {
    /// Alice starts with one 100-unit UTXO, Bob with 1000 confidential units.
    pub fn new() -> Self {
        init_tracing();
        let mut config = CoordinatorConfig::default();
        config.utxo.merkle_depth = 16;
        let coordinator = Coordinator::new(config).unwrap();

        let minter = Address::from_label("minter");
        let oracle = Arc::new(MockFheOracle::new());
        let zeto = coordinator.add_utxo_ledger(
            Address::from_label("zeto"),
            minter,
            Arc::new(DigestVerifier::new(PROOF_DOMAIN)),
        );
        let token = coordinator.add_account_ledger(
            Address::from_label("fhe-erc20"),
            minter,
            oracle.clone(),
        );

        let alice = PartyKeys::from_label("alice");
        let bob = PartyKeys::from_label("bob");
        let alice_funds = Utxo::new(100, alice.owner_pk());
        zeto.lock().mint(minter, &[alice_funds.commitment()]).unwrap();

        let token_address = token.lock().address();
        let input = oracle.encrypt_input(1000, token_address, minter);
        token.lock().mint(minter, bob.address(), &input).unwrap();

        Self {
            coordinator,
            prover: DigestProver::new(PROOF_DOMAIN),
            oracle,
            zeto,
            token,
            minter,
            alice,
            bob,
            alice_funds,
        }
    }

    pub fn zeto_address(&self) -> Address {
        self.zeto.lock().address()
    }

    pub fn token_address(&self) -> Address {
        self.token.lock().address()
    }

    /// The two legs of the standard trade.
    pub fn operations(&self) -> Vec<AtomOperation> {
        vec![
            AtomOperation::new(self.zeto_address(), ALICE_LOCK, self.alice.address()),
            AtomOperation::new(self.token_address(), BOB_LOCK, self.bob.address()),
        ]
    }

    fn outcome(&self, locked: &Utxo, outputs: &[&Utxo], delegate: Address) -> LockOutcome<UtxoTransition> {
        let outputs: Vec<Digest> = outputs.iter().map(|u| u.commitment()).collect();
        let statement = Statement::LockedTransfer {
            lock_id: ALICE_LOCK,
            inputs: vec![locked.commitment()],
            outputs: outputs.clone(),
            delegate,
        };
        LockOutcome::new(UtxoTransition::new(outputs), self.prover.prove(&statement), vec![])
    }

    /// Alice locks her 100 units: 75 to Bob and 25 change on settle, 100
    /// back to her on refund.
    pub fn alice_locks(&self, delegate: Address) -> dvp_common::Result<AliceLeg> {
        let alice_pk = self.alice.owner_pk();
        let locked = Utxo::new(100, alice_pk);
        let to_bob = Utxo::new(75, self.bob.owner_pk());
        let change = Utxo::new(25, alice_pk);
        let refund = Utxo::new(100, alice_pk);

        let mut zeto = self.zeto.lock();
        let nullifier = self.alice_funds.nullifier(&self.alice.spending_secret());
        let root = zeto.root();
        let statement = Statement::Lock {
            root,
            nullifiers: vec![nullifier],
            outputs: vec![],
            locked_outputs: vec![locked.commitment()],
            owner: self.alice.address(),
        };
        let request = UtxoLockRequest {
            lock_id: ALICE_LOCK,
            root,
            nullifiers: vec![nullifier],
            outputs: vec![],
            locked_outputs: vec![locked.commitment()],
            proof: self.prover.prove(&statement),
            approver: None,
            data: b"trade-42".to_vec(),
        };
        let commitment = LockCommitment {
            delegate,
            settle: self.outcome(&locked, &[&to_bob, &change], delegate),
            refund: self.outcome(&locked, &[&refund], delegate),
        };
        let view = zeto.create_lock(self.alice.address(), request, commitment)?;
        Ok(AliceLeg {
            view,
            locked,
            to_bob,
            change,
            refund,
        })
    }

    /// Bob locks 50 confidential units for Alice.
    pub fn bob_locks(&self, delegate: Address) -> dvp_common::Result<LockView> {
        let mut token = self.token.lock();
        let request = AccountLockRequest {
            lock_id: BOB_LOCK,
            receiver: self.alice.address(),
            amount: self
                .oracle
                .encrypt_input(50, token.address(), self.bob.address()),
            approver: None,
            data: vec![],
        };
        token.create_lock(self.bob.address(), request, delegate)
    }

    pub fn balance(&self, who: &PartyKeys) -> u64 {
        let handle = self.token.lock().balance_of(&who.address());
        match handle {
            Some(handle) => self.oracle.decrypt_for(&handle, who.address()).unwrap(),
            None => 0,
        }
    }

    /// Spend `utxo` owned by `owner` into a fresh output, proving it is
    /// spendable on the current tree.
    pub fn spend(&self, owner: &PartyKeys, utxo: &Utxo) -> dvp_common::Result<()> {
        let mut zeto = self.zeto.lock();
        let root = zeto.root();
        let nullifier = utxo.nullifier(&owner.spending_secret());
        let output = Utxo::new(utxo.value, owner.owner_pk()).commitment();
        let proof = self.prover.prove(&Statement::Transfer {
            root,
            nullifiers: vec![nullifier],
            outputs: vec![output],
        });
        zeto.transfer(
            owner.address(),
            UtxoTransfer {
                root,
                nullifiers: vec![nullifier],
                outputs: vec![output],
                proof,
            },
        )
    }
}
