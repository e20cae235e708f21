//! Per-ledger lock records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use dvp_common::{
    Address, DvpError, LockAction, LockId, LockOutcome, LockStatus, LockView, LockedValue, Result,
    Transition,
};

/// Delegate plus the two outcomes bound to a lock when it is committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockCommitment<T> {
    pub delegate: Address,
    pub settle: LockOutcome<T>,
    pub refund: LockOutcome<T>,
}

/// A hold on value maintained by the ledger that owns it.
#[derive(Debug, Clone)]
pub struct LockRecord<T> {
    pub lock_id: LockId,
    pub owner: Address,
    /// Zero until the lock is committed.
    pub delegate: Address,
    pub approver: Address,
    pub receiver: Option<Address>,
    pub status: LockStatus,
    pub locked: LockedValue,
    pub settle: Option<LockOutcome<T>>,
    pub refund: Option<LockOutcome<T>>,
    pub data: Vec<u8>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<T: Transition> LockRecord<T> {
    /// New record in `Prepared` with no delegate or outcomes.
    pub fn prepared(
        lock_id: LockId,
        owner: Address,
        approver: Option<Address>,
        receiver: Option<Address>,
        locked: LockedValue,
        data: Vec<u8>,
    ) -> Self {
        let now = Utc::now();
        Self {
            lock_id,
            owner,
            delegate: Address::ZERO,
            approver: approver.unwrap_or(owner),
            receiver,
            status: LockStatus::Prepared,
            locked,
            settle: None,
            refund: None,
            data,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next`, enforcing the lifecycle.
    pub fn transition(&mut self, next: LockStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(DvpError::InvalidLockTransition {
                lock_id: self.lock_id,
                from: self.status,
                to: next,
            });
        }
        debug!(lock_id = %self.lock_id, from = ?self.status, to = ?next, "Lock transition");
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Bind delegate and outcomes, moving `Prepared` to `Committed`.
    pub fn bind(&mut self, commitment: LockCommitment<T>) -> Result<()> {
        self.transition(LockStatus::Committed)?;
        self.delegate = commitment.delegate;
        self.settle = Some(commitment.settle);
        self.refund = Some(commitment.refund);
        Ok(())
    }

    /// Outcome for an action. Present on every committed lock.
    pub fn outcome(&self, action: LockAction) -> Option<&LockOutcome<T>> {
        match action {
            LockAction::Settle => self.settle.as_ref(),
            LockAction::Refund => self.refund.as_ref(),
        }
    }

    pub fn view(&self, ledger: Address) -> LockView {
        LockView {
            lock_id: self.lock_id,
            ledger,
            owner: self.owner,
            delegate: self.delegate,
            approver: self.approver,
            receiver: self.receiver,
            status: self.status,
            locked: self.locked.clone(),
            settle_hash: self.settle.as_ref().map(LockOutcome::hash),
            refund_hash: self.refund.as_ref().map(LockOutcome::hash),
            data: self.data.clone(),
        }
    }
}

/// All locks a ledger has ever created, keyed by id.
///
/// Lock ids are never reused, even after a lock reaches a final state.
#[derive(Debug, Clone)]
pub struct LockBook<T> {
    ledger: Address,
    locks: BTreeMap<LockId, LockRecord<T>>,
}

impl<T: Transition> LockBook<T> {
    pub fn new(ledger: Address) -> Self {
        Self {
            ledger,
            locks: BTreeMap::new(),
        }
    }

    /// Fail with `LockIdCollision` if the id was ever used.
    pub fn ensure_unused(&self, lock_id: &LockId) -> Result<()> {
        if self.locks.contains_key(lock_id) {
            return Err(DvpError::LockIdCollision(*lock_id));
        }
        Ok(())
    }

    pub fn insert(&mut self, record: LockRecord<T>) -> Result<()> {
        self.ensure_unused(&record.lock_id)?;
        self.locks.insert(record.lock_id, record);
        Ok(())
    }

    pub fn get(&self, lock_id: &LockId) -> Option<&LockRecord<T>> {
        self.locks.get(lock_id)
    }

    pub fn view(&self, lock_id: &LockId) -> Option<LockView> {
        self.locks.get(lock_id).map(|r| r.view(self.ledger))
    }

    /// Lock owned by `caller`.
    pub fn owned_by(&mut self, lock_id: &LockId, caller: Address) -> Result<&mut LockRecord<T>> {
        let record = self
            .locks
            .get_mut(lock_id)
            .ok_or(DvpError::LockNotFound(*lock_id))?;
        if record.owner != caller {
            return Err(DvpError::NotLockOwner {
                lock_id: *lock_id,
                caller,
            });
        }
        Ok(record)
    }

    /// Delegated lock whose delegate is `caller`.
    ///
    /// A missing lock has no delegate, so any caller is unauthorized for it.
    pub fn delegated_to(
        &mut self,
        lock_id: &LockId,
        caller: Address,
        action: LockAction,
    ) -> Result<&mut LockRecord<T>> {
        let unauthorized = DvpError::UnauthorizedDelegate {
            lock_id: *lock_id,
            caller,
            action,
        };
        let record = self.locks.get_mut(lock_id).ok_or_else(|| unauthorized.clone())?;
        if record.delegate.is_zero() || record.delegate != caller {
            return Err(unauthorized);
        }
        if !record.status.is_active() {
            return Err(DvpError::LockNotActive {
                lock_id: *lock_id,
                status: record.status,
            });
        }
        Ok(record)
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    pub fn count_by_status(&self, status: LockStatus) -> usize {
        self.locks.values().filter(|r| r.status == status).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LockRecord<T>> {
        self.locks.values()
    }
}
