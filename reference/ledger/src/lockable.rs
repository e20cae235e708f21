//! The capability every ledger exposes to a coordinator.

use std::sync::Arc;

use dvp_common::{Address, LockId, LockStatus, LockView, Result};
use parking_lot::Mutex;

use crate::journal::Journal;

/// A ledger able to hold value under a lock and release it through one of
/// two pre-committed outcomes.
///
/// Coordinators only ever reach a ledger through this trait. Lock creation
/// is ledger-specific and happens on the concrete type.
pub trait LockableLedger: Send {
    /// Address of this ledger.
    fn address(&self) -> Address;

    /// Apply the settle outcome of a delegated lock. `caller` must be the
    /// lock's delegate.
    fn settle_lock(&mut self, caller: Address, lock_id: LockId) -> Result<()>;

    /// Apply the refund outcome of a delegated lock. `caller` must be the
    /// lock's delegate.
    fn refund_lock(&mut self, caller: Address, lock_id: LockId) -> Result<()>;

    /// Observable description of a lock.
    fn lock_view(&self, lock_id: &LockId) -> Option<LockView>;

    fn lock_status(&self, lock_id: &LockId) -> Option<LockStatus> {
        self.lock_view(lock_id).map(|view| view.status)
    }

    /// Events recorded by this ledger.
    fn journal(&self) -> &Journal;

    /// Open a savepoint. Savepoints nest.
    fn begin(&mut self);

    /// Keep everything done since the innermost savepoint.
    fn commit(&mut self);

    /// Discard everything done since the innermost savepoint.
    fn rollback(&mut self);
}

/// A ledger shared between the parties and coordinators that call it.
pub type SharedLedger = Arc<Mutex<dyn LockableLedger>>;

/// Wrap a ledger for sharing.
pub fn shared<L: LockableLedger + 'static>(ledger: L) -> Arc<Mutex<L>> {
    Arc::new(Mutex::new(ledger))
}

/// Stack of state snapshots backing `begin`/`commit`/`rollback`.
#[derive(Debug, Clone)]
pub(crate) struct Savepoints<S> {
    stack: Vec<S>,
}

impl<S: Clone> Savepoints<S> {
    pub(crate) fn new() -> Self {
        Self { stack: Vec::new() }
    }

    pub(crate) fn begin(&mut self, state: &S) {
        self.stack.push(state.clone());
    }

    pub(crate) fn commit(&mut self) {
        self.stack.pop();
    }

    /// Restore the innermost snapshot into `state`. No-op without one.
    pub(crate) fn rollback(&mut self, state: &mut S) {
        if let Some(snapshot) = self.stack.pop() {
            *state = snapshot;
        }
    }

    pub(crate) fn depth(&self) -> usize {
        self.stack.len()
    }
}
