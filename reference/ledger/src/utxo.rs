//! Confidential UTXO ledger.
//!
//! Value lives in commitments `H(value, salt, owner_pk)`. Spending reveals
//! nullifiers and a proof checked by an injected [`ProofVerifier`]. A lock
//! spends inputs into locked outputs held in a separate set; its outcomes
//! spend those locked outputs into pre-agreed new outputs.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use dvp_common::{
    Address, Digest, DvpError, LedgerEvent, LockAction, LockId, LockOutcome, LockStatus, LockView,
    LockedValue, OutcomeEffect, Result, Transition,
};
use dvp_crypto::{ProofVerifier, Statement};

use crate::journal::Journal;
use crate::lock::{LockBook, LockCommitment, LockRecord};
use crate::lockable::{LockableLedger, Savepoints};
use crate::nullifier::CommitmentSet;

/// UTXO ledger settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UtxoLedgerConfig {
    /// Depth of the commitment tree.
    pub merkle_depth: usize,
    /// Number of recent roots accepted for proofs.
    pub root_history: usize,
}

impl Default for UtxoLedgerConfig {
    fn default() -> Self {
        Self {
            merkle_depth: 32,
            root_history: 32,
        }
    }
}

/// Outcome transition: the lock's locked commitments are spent into
/// `outputs`. An outcome with no outputs and no proof releases the locked
/// commitments unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UtxoTransition {
    pub outputs: Vec<Digest>,
}

impl UtxoTransition {
    pub fn new(outputs: Vec<Digest>) -> Self {
        Self { outputs }
    }
}

impl Transition for UtxoTransition {
    fn encode(&self, out: &mut Vec<u8>) {
        for output in &self.outputs {
            out.extend_from_slice(output.as_bytes());
        }
    }
}

/// An outcome that hands the locked commitments back to the spendable set.
pub fn release_outcome() -> LockOutcome<UtxoTransition> {
    LockOutcome::new(UtxoTransition::default(), vec![], vec![])
}

fn is_release(outcome: &LockOutcome<UtxoTransition>) -> bool {
    outcome.transition.outputs.is_empty() && outcome.proof.is_empty()
}

fn non_zero(outputs: &[Digest]) -> Vec<Digest> {
    outputs.iter().copied().filter(|o| !o.is_zero()).collect()
}

/// Plain transfer of nullified inputs into new outputs.
#[derive(Debug, Clone)]
pub struct UtxoTransfer {
    pub root: Digest,
    pub nullifiers: Vec<Digest>,
    pub outputs: Vec<Digest>,
    pub proof: Vec<u8>,
}

/// Transfer of nullified inputs into unlocked and locked outputs.
#[derive(Debug, Clone)]
pub struct UtxoLockRequest {
    pub lock_id: LockId,
    pub root: Digest,
    pub nullifiers: Vec<Digest>,
    /// Unlocked outputs, usually change.
    pub outputs: Vec<Digest>,
    pub locked_outputs: Vec<Digest>,
    pub proof: Vec<u8>,
    /// Defaults to the owner.
    pub approver: Option<Address>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
struct UtxoState {
    set: CommitmentSet,
    locks: LockBook<UtxoTransition>,
    journal: Journal,
}

/// Nullifier-based UTXO ledger with locking.
pub struct UtxoLedger {
    address: Address,
    minter: Address,
    verifier: Arc<dyn ProofVerifier>,
    state: UtxoState,
    savepoints: Savepoints<UtxoState>,
}

impl UtxoLedger {
    pub fn new(
        address: Address,
        minter: Address,
        verifier: Arc<dyn ProofVerifier>,
        config: &UtxoLedgerConfig,
    ) -> Self {
        Self {
            address,
            minter,
            verifier,
            state: UtxoState {
                set: CommitmentSet::new(config.merkle_depth, config.root_history),
                locks: LockBook::new(address),
                journal: Journal::new(address),
            },
            savepoints: Savepoints::new(),
        }
    }

    pub fn root(&self) -> Digest {
        self.state.set.root()
    }

    pub fn locked_root(&self) -> Digest {
        self.state.set.locked_root()
    }

    pub fn is_known_root(&self, root: &Digest) -> bool {
        self.state.set.is_known_root(root)
    }

    pub fn is_spent(&self, nullifier: &Digest) -> bool {
        self.state.set.is_spent(nullifier)
    }

    pub fn is_locked(&self, commitment: &Digest) -> bool {
        self.state.set.is_locked(commitment)
    }

    pub fn commitments(&self) -> &CommitmentSet {
        &self.state.set
    }

    pub fn lock(&self, lock_id: &LockId) -> Option<&LockRecord<UtxoTransition>> {
        self.state.locks.get(lock_id)
    }

    fn verify(&self, statement: &Statement, proof: &[u8], what: &str) -> Result<()> {
        if !self.verifier.verify_statement(statement, proof) {
            warn!(ledger = %self.address, circuit = %statement.circuit(), "Proof rejected");
            return Err(DvpError::ProofInvalid(what.to_string()));
        }
        Ok(())
    }

    fn check_root(&self, root: &Digest) -> Result<()> {
        if !self.state.set.is_known_root(root) {
            return Err(DvpError::UnknownRoot(*root));
        }
        Ok(())
    }

    /// Mint new commitments. Minter only.
    #[instrument(skip(self, outputs), fields(ledger = %self.address))]
    pub fn mint(&mut self, caller: Address, outputs: &[Digest]) -> Result<()> {
        if caller != self.minter {
            return Err(DvpError::NotMinter(caller));
        }
        self.state.set.check_fresh(outputs)?;
        self.state.set.add_outputs(outputs)?;
        let outputs = non_zero(outputs);
        info!(count = outputs.len(), "UTXOs minted");
        self.state.journal.record(LedgerEvent::UtxoMinted { outputs });
        Ok(())
    }

    /// Spend inputs into new outputs.
    #[instrument(skip(self, transfer), fields(ledger = %self.address))]
    pub fn transfer(&mut self, caller: Address, transfer: UtxoTransfer) -> Result<()> {
        self.state.set.check_nullifiers(&transfer.nullifiers)?;
        self.check_root(&transfer.root)?;
        self.state.set.check_fresh(&transfer.outputs)?;
        let statement = Statement::Transfer {
            root: transfer.root,
            nullifiers: transfer.nullifiers.clone(),
            outputs: transfer.outputs.clone(),
        };
        self.verify(&statement, &transfer.proof, "transfer")?;
        self.state.set.check_capacity(non_zero(&transfer.outputs).len())?;

        self.state.set.spend(&transfer.nullifiers);
        self.state.set.add_outputs(&transfer.outputs)?;
        info!(from = %caller, inputs = transfer.nullifiers.len(), "UTXO transfer");
        self.state.journal.record(LedgerEvent::UtxoTransferred {
            inputs: transfer.nullifiers,
            outputs: non_zero(&transfer.outputs),
        });
        Ok(())
    }

    /// Validate outcome proofs against the lock and its delegate.
    fn check_commitment(
        &self,
        lock_id: LockId,
        locked: &[Digest],
        commitment: &LockCommitment<UtxoTransition>,
    ) -> Result<()> {
        if commitment.delegate.is_zero() {
            return Err(DvpError::UnauthorizedDelegate {
                lock_id,
                caller: commitment.delegate,
                action: LockAction::Settle,
            });
        }
        for (action, outcome) in [
            (LockAction::Settle, &commitment.settle),
            (LockAction::Refund, &commitment.refund),
        ] {
            if action == LockAction::Refund && is_release(outcome) {
                continue;
            }
            let statement = Statement::LockedTransfer {
                lock_id,
                inputs: locked.to_vec(),
                outputs: outcome.transition.outputs.clone(),
                delegate: commitment.delegate,
            };
            self.verify(&statement, &outcome.proof, &format!("{action} outcome"))?;
        }
        Ok(())
    }

    /// Validate the lock transfer without touching state.
    fn check_request(&self, caller: Address, request: &UtxoLockRequest) -> Result<()> {
        self.state.locks.ensure_unused(&request.lock_id)?;
        self.state.set.check_nullifiers(&request.nullifiers)?;
        self.check_root(&request.root)?;
        self.state
            .set
            .check_fresh(request.outputs.iter().chain(request.locked_outputs.iter()))?;
        // locked outputs may be released into the tree later
        self.state.set.check_capacity(
            non_zero(&request.outputs).len() + non_zero(&request.locked_outputs).len(),
        )?;
        let statement = Statement::Lock {
            root: request.root,
            nullifiers: request.nullifiers.clone(),
            outputs: request.outputs.clone(),
            locked_outputs: request.locked_outputs.clone(),
            owner: caller,
        };
        self.verify(&statement, &request.proof, "lock")
    }

    /// Apply a checked lock transfer, returning the prepared record.
    fn stage(&mut self, caller: Address, request: &UtxoLockRequest) -> Result<LockRecord<UtxoTransition>> {
        self.state.set.spend(&request.nullifiers);
        self.state.set.add_outputs(&request.outputs)?;
        self.state
            .set
            .lock_outputs(&request.locked_outputs, request.lock_id);

        Ok(LockRecord::prepared(
            request.lock_id,
            caller,
            request.approver,
            None,
            LockedValue::Commitments(non_zero(&request.locked_outputs)),
            request.data.clone(),
        ))
    }

    /// Lock inputs with delegate and both outcomes in one step.
    #[instrument(skip(self, request, commitment), fields(ledger = %self.address, lock_id = %request.lock_id))]
    pub fn create_lock(
        &mut self,
        caller: Address,
        request: UtxoLockRequest,
        commitment: LockCommitment<UtxoTransition>,
    ) -> Result<LockView> {
        let locked = non_zero(&request.locked_outputs);
        self.check_request(caller, &request)?;
        self.check_commitment(request.lock_id, &locked, &commitment)?;
        let delegate = commitment.delegate;

        let mut record = self.stage(caller, &request)?;
        record.bind(commitment)?;
        record.transition(LockStatus::Delegated)?;
        let view = record.view(self.address);
        self.state.locks.insert(record)?;
        self.state.journal.record(LedgerEvent::LockCreated {
            view: view.clone(),
            outputs: non_zero(&request.outputs),
        });
        info!(owner = %caller, delegate = %delegate, locked = locked.len(), "Lock created");
        Ok(view)
    }

    /// Lock inputs without naming a delegate yet.
    #[instrument(skip(self, request), fields(ledger = %self.address, lock_id = %request.lock_id))]
    pub fn prepare_lock(&mut self, caller: Address, request: UtxoLockRequest) -> Result<LockView> {
        self.check_request(caller, &request)?;
        let record = self.stage(caller, &request)?;
        let view = record.view(self.address);
        self.state.locks.insert(record)?;
        self.state.journal.record(LedgerEvent::LockPrepared {
            view: view.clone(),
            outputs: non_zero(&request.outputs),
        });
        info!(owner = %caller, "Lock prepared");
        Ok(view)
    }

    /// Bind a delegate and outcomes to a prepared lock.
    #[instrument(skip(self, commitment), fields(ledger = %self.address))]
    pub fn commit_lock(
        &mut self,
        caller: Address,
        lock_id: LockId,
        commitment: LockCommitment<UtxoTransition>,
    ) -> Result<LockView> {
        let locked = match self.state.locks.owned_by(&lock_id, caller)?.locked.clone() {
            LockedValue::Commitments(c) => c,
            LockedValue::Encrypted(_) => Vec::new(),
        };
        self.check_commitment(lock_id, &locked, &commitment)?;

        let record = self.state.locks.owned_by(&lock_id, caller)?;
        record.bind(commitment)?;
        let view = record.view(self.address);
        self.state.journal.record(LedgerEvent::LockCommitted(view.clone()));
        info!(lock_id = %lock_id, delegate = %view.delegate, "Lock committed");
        Ok(view)
    }

    /// Confirm the committed delegate.
    #[instrument(skip(self), fields(ledger = %self.address))]
    pub fn delegate_lock(&mut self, caller: Address, lock_id: LockId, delegate: Address) -> Result<()> {
        let record = self.state.locks.owned_by(&lock_id, caller)?;
        if record.status == LockStatus::Committed && record.delegate != delegate {
            return Err(DvpError::DelegateMismatch {
                lock_id,
                expected: record.delegate,
                actual: delegate,
            });
        }
        record.transition(LockStatus::Delegated)?;
        self.state
            .journal
            .record(LedgerEvent::LockDelegated { lock_id, delegate });
        info!(lock_id = %lock_id, delegate = %delegate, "Lock delegated");
        Ok(())
    }

    /// Owner takes back a lock that was never delegated.
    #[instrument(skip(self), fields(ledger = %self.address))]
    pub fn withdraw_lock(&mut self, caller: Address, lock_id: LockId) -> Result<()> {
        let record = self.state.locks.owned_by(&lock_id, caller)?;
        if !record.status.is_withdrawable() {
            return Err(DvpError::LockNotActive {
                lock_id,
                status: record.status,
            });
        }
        let released = match &record.locked {
            LockedValue::Commitments(c) => c.clone(),
            LockedValue::Encrypted(_) => Vec::new(),
        };
        self.state.set.check_capacity(released.len())?;
        record.transition(LockStatus::RolledBack)?;
        self.state.set.release_locked(&released)?;
        self.state.journal.record(LedgerEvent::LockWithdrawn {
            lock_id,
            owner: caller,
            released,
        });
        info!(lock_id = %lock_id, "Lock withdrawn");
        Ok(())
    }

    fn finish(&mut self, caller: Address, lock_id: LockId, action: LockAction) -> Result<()> {
        let (outcome, locked) = {
            let record = self.state.locks.delegated_to(&lock_id, caller, action)?;
            let outcome = record.outcome(action).cloned().ok_or(DvpError::LockNotActive {
                lock_id,
                status: record.status,
            })?;
            let locked = match &record.locked {
                LockedValue::Commitments(c) => c.clone(),
                LockedValue::Encrypted(_) => Vec::new(),
            };
            (outcome, locked)
        };

        self.state.set.check_locked_by(&locked, &lock_id)?;
        let release = is_release(&outcome);
        if release {
            self.state.set.check_capacity(locked.len())?;
        } else {
            self.state.set.check_fresh(&outcome.transition.outputs)?;
            self.state
                .set
                .check_capacity(non_zero(&outcome.transition.outputs).len())?;
        }

        let next = match action {
            LockAction::Settle => LockStatus::Settled,
            LockAction::Refund => LockStatus::RolledBack,
        };
        self.state
            .locks
            .delegated_to(&lock_id, caller, action)?
            .transition(next)?;

        let effect = if release {
            self.state.set.release_locked(&locked)?;
            OutcomeEffect::Released(locked)
        } else {
            self.state.set.consume_locked(&locked);
            self.state.set.add_outputs(&outcome.transition.outputs)?;
            OutcomeEffect::Outputs(non_zero(&outcome.transition.outputs))
        };

        let outcome_hash = outcome.hash();
        let event = match action {
            LockAction::Settle => LedgerEvent::LockSettled {
                lock_id,
                delegate: caller,
                outcome_hash,
                effect,
            },
            LockAction::Refund => LedgerEvent::LockRefunded {
                lock_id,
                delegate: caller,
                outcome_hash,
                effect,
            },
        };
        self.state.journal.record(event);
        info!(lock_id = %lock_id, action = %action, release, "Lock finished");
        Ok(())
    }
}

impl LockableLedger for UtxoLedger {
    fn address(&self) -> Address {
        self.address
    }

    fn settle_lock(&mut self, caller: Address, lock_id: LockId) -> Result<()> {
        self.finish(caller, lock_id, LockAction::Settle)
    }

    fn refund_lock(&mut self, caller: Address, lock_id: LockId) -> Result<()> {
        self.finish(caller, lock_id, LockAction::Refund)
    }

    fn lock_view(&self, lock_id: &LockId) -> Option<LockView> {
        self.state.locks.view(lock_id)
    }

    fn journal(&self) -> &Journal {
        &self.state.journal
    }

    fn begin(&mut self) {
        self.savepoints.begin(&self.state);
    }

    fn commit(&mut self) {
        self.savepoints.commit();
    }

    fn rollback(&mut self) {
        self.savepoints.rollback(&mut self.state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dvp_crypto::{DigestProver, DigestVerifier, MerkleTree, PartyKeys, Utxo};

    const DOMAIN: &str = "zeto-test";

    struct Fixture {
        ledger: UtxoLedger,
        prover: DigestProver,
        minter: Address,
        alice: PartyKeys,
        bob: PartyKeys,
        atom: Address,
        funds: Utxo,
    }

    fn fixture() -> Fixture {
        fixture_with_depth(10)
    }

    fn fixture_with_depth(merkle_depth: usize) -> Fixture {
        let minter = Address::from_label("minter");
        let mut ledger = UtxoLedger::new(
            Address::from_label("zeto"),
            minter,
            Arc::new(DigestVerifier::new(DOMAIN)),
            &UtxoLedgerConfig {
                merkle_depth,
                root_history: 8,
            },
        );
        let alice = PartyKeys::from_label("alice");
        let funds = Utxo::new(100, alice.owner_pk());
        ledger.mint(minter, &[funds.commitment()]).unwrap();
        Fixture {
            ledger,
            prover: DigestProver::new(DOMAIN),
            minter,
            alice,
            bob: PartyKeys::from_label("bob"),
            atom: Address::from_label("atom"),
            funds,
        }
    }

    impl Fixture {
        fn lock_request(&self, id: u8, locked: &Utxo) -> UtxoLockRequest {
            let nullifier = self.funds.nullifier(&self.alice.spending_secret());
            let root = self.ledger.root();
            let statement = Statement::Lock {
                root,
                nullifiers: vec![nullifier],
                outputs: vec![],
                locked_outputs: vec![locked.commitment()],
                owner: self.alice.address(),
            };
            UtxoLockRequest {
                lock_id: LockId::from_bytes([id; 32]),
                root,
                nullifiers: vec![nullifier],
                outputs: vec![],
                locked_outputs: vec![locked.commitment()],
                proof: self.prover.prove(&statement),
                approver: None,
                data: vec![],
            }
        }

        fn outcome(&self, id: u8, locked: &Utxo, outputs: &[Utxo], delegate: Address) -> LockOutcome<UtxoTransition> {
            let outputs: Vec<Digest> = outputs.iter().map(Utxo::commitment).collect();
            let statement = Statement::LockedTransfer {
                lock_id: LockId::from_bytes([id; 32]),
                inputs: vec![locked.commitment()],
                outputs: outputs.clone(),
                delegate,
            };
            LockOutcome::new(UtxoTransition::new(outputs), self.prover.prove(&statement), vec![])
        }
    }

    #[test]
    fn test_mint_and_transfer() {
        let mut f = fixture();
        assert!(matches!(
            f.ledger.mint(f.alice.address(), &[Digest::from_u64(1)]),
            Err(DvpError::NotMinter(_))
        ));

        let to_bob = Utxo::new(100, f.bob.owner_pk());
        let nullifier = f.funds.nullifier(&f.alice.spending_secret());
        let root = f.ledger.root();
        let proof = f.prover.prove(&Statement::Transfer {
            root,
            nullifiers: vec![nullifier],
            outputs: vec![to_bob.commitment()],
        });
        let transfer = UtxoTransfer {
            root,
            nullifiers: vec![nullifier],
            outputs: vec![to_bob.commitment()],
            proof,
        };
        f.ledger.transfer(f.alice.address(), transfer.clone()).unwrap();
        assert!(f.ledger.is_spent(&nullifier));

        // replaying the same spend fails on the nullifier
        assert!(matches!(
            f.ledger.transfer(f.alice.address(), transfer),
            Err(DvpError::InputAlreadySpentOrLocked(_))
        ));

        // outputs can never be minted twice
        assert!(matches!(
            f.ledger.mint(f.minter, &[to_bob.commitment()]),
            Err(DvpError::DuplicateCommitment(_))
        ));
    }

    #[test]
    fn test_bad_proof_and_unknown_root() {
        let mut f = fixture();
        let locked = Utxo::new(100, f.alice.owner_pk());
        let mut request = f.lock_request(1, &locked);
        request.proof[0] ^= 1;
        let commitment = LockCommitment {
            delegate: f.atom,
            settle: f.outcome(1, &locked, &[Utxo::new(100, f.bob.owner_pk())], f.atom),
            refund: release_outcome(),
        };
        assert!(matches!(
            f.ledger.create_lock(f.alice.address(), request, commitment.clone()),
            Err(DvpError::ProofInvalid(_))
        ));

        let mut request = f.lock_request(1, &locked);
        request.root = Digest::from_u64(42);
        assert!(matches!(
            f.ledger.create_lock(f.alice.address(), request, commitment),
            Err(DvpError::UnknownRoot(_))
        ));
    }

    #[test]
    fn test_outcome_proof_bound_to_delegate() {
        let mut f = fixture();
        let locked = Utxo::new(100, f.alice.owner_pk());
        let request = f.lock_request(1, &locked);
        let other_atom = Address::from_label("other-atom");
        let commitment = LockCommitment {
            delegate: f.atom,
            settle: f.outcome(1, &locked, &[Utxo::new(100, f.bob.owner_pk())], other_atom),
            refund: release_outcome(),
        };
        assert!(matches!(
            f.ledger.create_lock(f.alice.address(), request, commitment),
            Err(DvpError::ProofInvalid(_))
        ));
    }

    #[test]
    fn test_settle_spends_locked_into_outcome() {
        let mut f = fixture();
        let locked = Utxo::new(100, f.alice.owner_pk());
        let to_bob = Utxo::new(75, f.bob.owner_pk());
        let change = Utxo::new(25, f.alice.owner_pk());
        let request = f.lock_request(1, &locked);
        let commitment = LockCommitment {
            delegate: f.atom,
            settle: f.outcome(1, &locked, &[to_bob, change], f.atom),
            refund: f.outcome(1, &locked, &[Utxo::new(100, f.alice.owner_pk())], f.atom),
        };
        let view = f
            .ledger
            .create_lock(f.alice.address(), request, commitment.clone())
            .unwrap();
        assert_eq!(view.status, LockStatus::Delegated);
        assert_eq!(view.settle_hash, Some(commitment.settle.hash()));
        assert!(f.ledger.is_locked(&locked.commitment()));

        // double lock of the same input
        let again = f.lock_request(2, &Utxo::new(100, f.alice.owner_pk()));
        assert!(matches!(
            f.ledger.create_lock(f.alice.address(), again, commitment.clone()),
            Err(DvpError::InputAlreadySpentOrLocked(_))
        ));

        assert!(matches!(
            f.ledger.settle_lock(f.alice.address(), view.lock_id),
            Err(DvpError::UnauthorizedDelegate { .. })
        ));
        f.ledger.settle_lock(f.atom, view.lock_id).unwrap();
        assert!(!f.ledger.is_locked(&locked.commitment()));
        assert!(f.ledger.commitments().contains(&to_bob.commitment()));
        assert!(matches!(
            f.ledger.settle_lock(f.atom, view.lock_id),
            Err(DvpError::LockNotActive { .. })
        ));
    }

    #[test]
    fn test_empty_refund_releases_locked() {
        let mut f = fixture();
        let locked = Utxo::new(100, f.alice.owner_pk());
        let request = f.lock_request(1, &locked);
        let commitment = LockCommitment {
            delegate: f.atom,
            settle: f.outcome(1, &locked, &[Utxo::new(100, f.bob.owner_pk())], f.atom),
            refund: release_outcome(),
        };
        let view = f.ledger.create_lock(f.alice.address(), request, commitment).unwrap();
        let locked_root = f.ledger.locked_root();

        f.ledger.refund_lock(f.atom, view.lock_id).unwrap();
        assert!(!f.ledger.is_locked(&locked.commitment()));
        assert_ne!(f.ledger.locked_root(), locked_root);

        // the mirror fed from events tracks the ledger root
        let mut mirror = MerkleTree::new(10);
        for entry in f.ledger.journal().entries() {
            for c in entry.event.spendable_commitments() {
                mirror.insert(*c).unwrap();
            }
        }
        assert_eq!(mirror.root(), f.ledger.root());
        let proof = mirror.proof(&locked.commitment()).unwrap();
        assert!(dvp_crypto::verify_path(&f.ledger.root(), &locked.commitment(), &proof));
    }

    #[test]
    fn test_prepare_commit_delegate() {
        let mut f = fixture();
        let locked = Utxo::new(100, f.alice.owner_pk());
        let request = f.lock_request(3, &locked);
        let alice = f.alice.address();
        let view = f.ledger.prepare_lock(alice, request).unwrap();
        assert_eq!(view.status, LockStatus::Prepared);
        assert!(view.delegate.is_zero());

        // not yet delegated, nobody can settle
        assert!(matches!(
            f.ledger.settle_lock(f.atom, view.lock_id),
            Err(DvpError::UnauthorizedDelegate { .. })
        ));

        let commitment = LockCommitment {
            delegate: f.atom,
            settle: f.outcome(3, &locked, &[Utxo::new(100, f.bob.owner_pk())], f.atom),
            refund: release_outcome(),
        };
        assert!(matches!(
            f.ledger.commit_lock(f.bob.address(), view.lock_id, commitment.clone()),
            Err(DvpError::NotLockOwner { .. })
        ));
        f.ledger.commit_lock(alice, view.lock_id, commitment).unwrap();
        assert!(matches!(
            f.ledger.delegate_lock(alice, view.lock_id, f.bob.address()),
            Err(DvpError::DelegateMismatch { .. })
        ));
        f.ledger.delegate_lock(alice, view.lock_id, f.atom).unwrap();
        assert_eq!(f.ledger.lock_status(&view.lock_id), Some(LockStatus::Delegated));
        f.ledger.settle_lock(f.atom, view.lock_id).unwrap();
    }

    #[test]
    fn test_withdraw_before_delegation() {
        let mut f = fixture();
        let locked = Utxo::new(100, f.alice.owner_pk());
        let request = f.lock_request(4, &locked);
        let alice = f.alice.address();
        let view = f.ledger.prepare_lock(alice, request).unwrap();
        f.ledger.withdraw_lock(alice, view.lock_id).unwrap();
        assert!(!f.ledger.is_locked(&locked.commitment()));
        assert_eq!(f.ledger.lock_status(&view.lock_id), Some(LockStatus::RolledBack));
        assert_eq!(f.ledger.commitments().spendable_count(), 2);
    }

    #[test]
    fn test_rollback_undoes_settle() {
        let mut f = fixture();
        let locked = Utxo::new(100, f.alice.owner_pk());
        let request = f.lock_request(5, &locked);
        let commitment = LockCommitment {
            delegate: f.atom,
            settle: f.outcome(5, &locked, &[Utxo::new(100, f.bob.owner_pk())], f.atom),
            refund: release_outcome(),
        };
        let view = f.ledger.create_lock(f.alice.address(), request, commitment).unwrap();
        let root = f.ledger.root();

        f.ledger.begin();
        f.ledger.settle_lock(f.atom, view.lock_id).unwrap();
        f.ledger.rollback();

        assert_eq!(f.ledger.root(), root);
        assert!(f.ledger.is_locked(&locked.commitment()));
        assert_eq!(f.ledger.lock_status(&view.lock_id), Some(LockStatus::Delegated));
    }

    #[test]
    fn test_lock_rejected_when_tree_full() {
        // depth 1 holds two leaves and the funds already take one
        let mut f = fixture_with_depth(1);
        let alice_pk = f.alice.owner_pk();
        let locked = Utxo::new(60, alice_pk);
        let change = Utxo::new(40, alice_pk);
        let nullifier = f.funds.nullifier(&f.alice.spending_secret());
        let root = f.ledger.root();
        let statement = Statement::Lock {
            root,
            nullifiers: vec![nullifier],
            outputs: vec![change.commitment()],
            locked_outputs: vec![locked.commitment()],
            owner: f.alice.address(),
        };
        let request = UtxoLockRequest {
            lock_id: LockId::from_bytes([6; 32]),
            root,
            nullifiers: vec![nullifier],
            outputs: vec![change.commitment()],
            locked_outputs: vec![locked.commitment()],
            proof: f.prover.prove(&statement),
            approver: None,
            data: vec![],
        };
        let err = f.ledger.prepare_lock(f.alice.address(), request).unwrap_err();
        assert_eq!(err.error_code(), "CRYPTO_ERROR");

        // nothing moved: the input is unspent and the lock id unused
        assert!(!f.ledger.is_spent(&nullifier));
        assert!(!f.ledger.is_locked(&locked.commitment()));
        assert_eq!(f.ledger.lock_status(&LockId::from_bytes([6; 32])), None);
        assert_eq!(f.ledger.root(), root);

        let output = Utxo::new(100, f.bob.owner_pk()).commitment();
        let proof = f.prover.prove(&Statement::Transfer {
            root,
            nullifiers: vec![nullifier],
            outputs: vec![output],
        });
        f.ledger
            .transfer(
                f.alice.address(),
                UtxoTransfer {
                    root,
                    nullifiers: vec![nullifier],
                    outputs: vec![output],
                    proof,
                },
            )
            .unwrap();
        assert!(matches!(
            f.ledger.mint(f.minter, &[Digest::from_u64(9)]),
            Err(DvpError::Crypto(_))
        ));
    }
}
