//! Confidential account-based token ledger.
//!
//! Balances are encrypted handles; all arithmetic goes through an injected
//! [`ConfidentialArithmetic`]. A lock debits an encrypted amount from the
//! owner's balance. Its settle outcome credits the receiver and its refund
//! outcome credits the owner.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use dvp_common::{
    Address, Digest, DvpError, LedgerEvent, LockAction, LockId, LockOutcome, LockStatus, LockView,
    LockedValue, OutcomeEffect, Result, Transition,
};

use crate::confidential::{ConfidentialArithmetic, EncryptedInput};
use crate::journal::Journal;
use crate::lock::{LockBook, LockCommitment, LockRecord};
use crate::lockable::{LockableLedger, Savepoints};

/// State transition of an account lock outcome: credit `amount` to `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credit {
    pub to: Address,
    pub amount: Digest,
}

impl Transition for Credit {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.to.as_bytes());
        out.extend_from_slice(self.amount.as_bytes());
    }
}

/// Request to lock an encrypted amount.
#[derive(Debug, Clone)]
pub struct AccountLockRequest {
    pub lock_id: LockId,
    /// Party credited by the settle outcome.
    pub receiver: Address,
    pub amount: EncryptedInput,
    /// Defaults to the owner.
    pub approver: Option<Address>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
struct AccountState {
    balances: HashMap<Address, Digest>,
    consumed_inputs: HashSet<Digest>,
    locks: LockBook<Credit>,
    journal: Journal,
}

/// Account ledger holding encrypted balances.
pub struct ConfidentialAccountLedger {
    address: Address,
    minter: Address,
    oracle: Arc<dyn ConfidentialArithmetic>,
    state: AccountState,
    savepoints: Savepoints<AccountState>,
}

impl ConfidentialAccountLedger {
    pub fn new(address: Address, minter: Address, oracle: Arc<dyn ConfidentialArithmetic>) -> Self {
        Self {
            address,
            minter,
            oracle,
            state: AccountState {
                balances: HashMap::new(),
                consumed_inputs: HashSet::new(),
                locks: LockBook::new(address),
                journal: Journal::new(address),
            },
            savepoints: Savepoints::new(),
        }
    }

    pub fn minter(&self) -> Address {
        self.minter
    }

    pub fn oracle(&self) -> &Arc<dyn ConfidentialArithmetic> {
        &self.oracle
    }

    /// Encrypted balance handle of an account, if it ever held funds.
    pub fn balance_of(&self, account: &Address) -> Option<Digest> {
        self.state.balances.get(account).copied()
    }

    pub fn lock(&self, lock_id: &LockId) -> Option<&LockRecord<Credit>> {
        self.state.locks.get(lock_id)
    }

    /// Verify an input submitted by `user` and mark it consumed.
    fn take_input(&mut self, input: &EncryptedInput, user: Address) -> Result<Digest> {
        if self.state.consumed_inputs.contains(&input.handle) {
            return Err(DvpError::InputAlreadySpentOrLocked(format!(
                "encrypted input {}",
                input.handle
            )));
        }
        let handle = self.oracle.verify_input(input, self.address, user)?;
        self.state.consumed_inputs.insert(input.handle);
        Ok(handle)
    }

    fn balance_or_zero(&self, account: &Address) -> Digest {
        self.balance_of(account)
            .unwrap_or_else(|| self.oracle.constant(0))
    }

    fn credit(&mut self, to: Address, amount: &Digest) -> Result<()> {
        let balance = self.balance_or_zero(&to);
        let updated = self.oracle.add(&balance, amount)?;
        self.oracle.allow(&updated, to);
        self.state.balances.insert(to, updated);
        Ok(())
    }

    /// Debit up to `amount`. Moves `amount` if the balance covers it and
    /// zero otherwise, without revealing which. Returns the moved amount.
    fn debit(&mut self, from: Address, amount: &Digest) -> Result<Digest> {
        let balance = self.balance_or_zero(&from);
        let zero = self.oracle.constant(0);
        let covered = self.oracle.le(amount, &balance)?;
        let moved = self.oracle.select(&covered, amount, &zero)?;
        let updated = self.oracle.sub(&balance, &moved)?;
        self.oracle.allow(&updated, from);
        self.oracle.allow(&moved, from);
        self.state.balances.insert(from, updated);
        Ok(moved)
    }

    /// Mint an encrypted amount. Minter only.
    #[instrument(skip(self, amount), fields(ledger = %self.address))]
    pub fn mint(&mut self, caller: Address, to: Address, amount: &EncryptedInput) -> Result<()> {
        if caller != self.minter {
            return Err(DvpError::NotMinter(caller));
        }
        let handle = self.take_input(amount, caller)?;
        self.credit(to, &handle)?;
        self.oracle.allow(&handle, to);
        self.state
            .journal
            .record(LedgerEvent::ConfidentialMinted { to, amount: handle });
        info!(to = %to, "Confidential mint");
        Ok(())
    }

    /// Transfer an encrypted amount from `caller` to `to`. Returns the
    /// handle of the amount actually moved.
    #[instrument(skip(self, amount), fields(ledger = %self.address))]
    pub fn confidential_transfer(
        &mut self,
        caller: Address,
        to: Address,
        amount: &EncryptedInput,
    ) -> Result<Digest> {
        let handle = self.take_input(amount, caller)?;
        let moved = self.debit(caller, &handle)?;
        self.credit(to, &moved)?;
        self.oracle.allow(&moved, to);
        self.state.journal.record(LedgerEvent::ConfidentialTransferred {
            from: caller,
            to,
            amount: moved,
        });
        info!(from = %caller, to = %to, "Confidential transfer");
        Ok(moved)
    }

    fn stage(&mut self, caller: Address, request: AccountLockRequest) -> Result<LockRecord<Credit>> {
        self.state.locks.ensure_unused(&request.lock_id)?;
        let handle = self.take_input(&request.amount, caller)?;
        let locked = self.debit(caller, &handle)?;
        self.oracle.allow(&locked, request.receiver);
        Ok(LockRecord::prepared(
            request.lock_id,
            caller,
            request.approver,
            Some(request.receiver),
            LockedValue::Encrypted(locked),
            request.data,
        ))
    }

    fn commitment_for(record: &LockRecord<Credit>, delegate: Address) -> Result<LockCommitment<Credit>> {
        let amount = match &record.locked {
            LockedValue::Encrypted(handle) => *handle,
            LockedValue::Commitments(_) => {
                return Err(DvpError::InvalidEncryptedInput(
                    "account lock holds commitments".to_string(),
                ))
            }
        };
        let receiver = record.receiver.unwrap_or(record.owner);
        Ok(LockCommitment {
            delegate,
            settle: LockOutcome::new(Credit { to: receiver, amount }, vec![], vec![]),
            refund: LockOutcome::new(
                Credit {
                    to: record.owner,
                    amount,
                },
                vec![],
                vec![],
            ),
        })
    }

    /// Lock an amount and delegate it in one step.
    #[instrument(skip(self, request), fields(ledger = %self.address, lock_id = %request.lock_id))]
    pub fn create_lock(
        &mut self,
        caller: Address,
        request: AccountLockRequest,
        delegate: Address,
    ) -> Result<LockView> {
        let mut record = self.stage(caller, request)?;
        let commitment = Self::commitment_for(&record, delegate)?;
        record.bind(commitment)?;
        record.transition(LockStatus::Delegated)?;
        if let LockedValue::Encrypted(handle) = &record.locked {
            self.oracle.allow(handle, delegate);
        }

        let view = record.view(self.address);
        self.state.locks.insert(record)?;
        self.state.journal.record(LedgerEvent::LockCreated {
            view: view.clone(),
            outputs: vec![],
        });
        info!(owner = %caller, delegate = %delegate, "Lock created");
        Ok(view)
    }

    /// Stage a lock without naming a delegate.
    #[instrument(skip(self, request), fields(ledger = %self.address, lock_id = %request.lock_id))]
    pub fn prepare_lock(&mut self, caller: Address, request: AccountLockRequest) -> Result<LockView> {
        let record = self.stage(caller, request)?;
        let view = record.view(self.address);
        self.state.locks.insert(record)?;
        self.state.journal.record(LedgerEvent::LockPrepared {
            view: view.clone(),
            outputs: vec![],
        });
        info!(owner = %caller, "Lock prepared");
        Ok(view)
    }

    /// Bind the outcomes of a prepared lock to the delegate that will run them.
    #[instrument(skip(self), fields(ledger = %self.address))]
    pub fn commit_lock(&mut self, caller: Address, lock_id: LockId, delegate: Address) -> Result<LockView> {
        let record = self.state.locks.owned_by(&lock_id, caller)?;
        let commitment = Self::commitment_for(record, delegate)?;
        record.bind(commitment)?;
        let view = record.view(self.address);
        self.state.journal.record(LedgerEvent::LockCommitted(view.clone()));
        info!(lock_id = %lock_id, delegate = %delegate, "Lock committed");
        Ok(view)
    }

    /// Hand settle/refund authority to the committed delegate.
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
        if let LockedValue::Encrypted(handle) = &record.locked {
            self.oracle.allow(handle, delegate);
        }
        self.state
            .journal
            .record(LedgerEvent::LockDelegated { lock_id, delegate });
        info!(lock_id = %lock_id, delegate = %delegate, "Lock delegated");
        Ok(())
    }

    /// Owner takes a not-yet-delegated lock back.
    #[instrument(skip(self), fields(ledger = %self.address))]
    pub fn withdraw_lock(&mut self, caller: Address, lock_id: LockId) -> Result<()> {
        let record = self.state.locks.owned_by(&lock_id, caller)?;
        if !record.status.is_withdrawable() {
            return Err(DvpError::LockNotActive {
                lock_id,
                status: record.status,
            });
        }
        record.transition(LockStatus::RolledBack)?;
        let locked = record.locked.clone();
        if let LockedValue::Encrypted(handle) = locked {
            self.credit(caller, &handle)?;
        }
        self.state.journal.record(LedgerEvent::LockWithdrawn {
            lock_id,
            owner: caller,
            released: vec![],
        });
        info!(lock_id = %lock_id, "Lock withdrawn");
        Ok(())
    }

    fn finish(&mut self, caller: Address, lock_id: LockId, action: LockAction) -> Result<()> {
        let record = self.state.locks.delegated_to(&lock_id, caller, action)?;
        let credit = record
            .outcome(action)
            .map(|o| o.transition.clone())
            .ok_or(DvpError::LockNotActive {
                lock_id,
                status: record.status,
            })?;
        let outcome_hash = record
            .outcome(action)
            .map(LockOutcome::hash)
            .unwrap_or_default();
        let next = match action {
            LockAction::Settle => LockStatus::Settled,
            LockAction::Refund => LockStatus::RolledBack,
        };
        record.transition(next)?;

        self.credit(credit.to, &credit.amount)?;

        let effect = OutcomeEffect::Credit {
            to: credit.to,
            amount: credit.amount,
        };
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
        info!(lock_id = %lock_id, action = %action, to = %credit.to, "Lock finished");
        Ok(())
    }
}

impl LockableLedger for ConfidentialAccountLedger {
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
