//! Events emitted by atoms and the factory.

use serde::{Deserialize, Serialize};

use dvp_common::{revert, Address, LockId};

/// One leg of a trade: a lock on a ledger and the party allowed to approve it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AtomOperation {
    /// Ledger holding the lock.
    pub ledger: Address,
    pub lock_id: LockId,
    /// Only address permitted to approve this operation.
    pub approver: Address,
}

impl AtomOperation {
    pub fn new(ledger: Address, lock_id: LockId, approver: Address) -> Self {
        Self {
            ledger,
            lock_id,
            approver,
        }
    }
}

/// A structured event emitted by an atom or its factory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AtomEvent {
    /// Factory deployed an atom. `operations` is empty for an atom that
    /// will be initialized later.
    AtomDeployed {
        factory: Address,
        atom: Address,
        operations: Vec<AtomOperation>,
    },
    /// Operations registered on an atom.
    AtomInitialized { atom: Address, operations: usize },
    OperationApproved {
        atom: Address,
        index: usize,
        approver: Address,
    },
    /// Every leg settled.
    AtomSettled { atom: Address, caller: Address },
    /// A leg was refunded during cancellation.
    OperationRolledBack {
        atom: Address,
        index: usize,
        lock_id: LockId,
    },
    /// A leg's refund reverted during cancellation. `reason` holds the
    /// `Error(string)` encoded revert data.
    OperationRollbackFailed {
        atom: Address,
        index: usize,
        lock_id: LockId,
        reason: Vec<u8>,
    },
    /// Cancellation finished, whatever the individual refunds did.
    AtomCancelled { atom: Address, caller: Address },
}

impl AtomEvent {
    /// Atom this event is about.
    pub fn atom(&self) -> Address {
        match self {
            AtomEvent::AtomDeployed { atom, .. }
            | AtomEvent::AtomInitialized { atom, .. }
            | AtomEvent::OperationApproved { atom, .. }
            | AtomEvent::AtomSettled { atom, .. }
            | AtomEvent::OperationRolledBack { atom, .. }
            | AtomEvent::OperationRollbackFailed { atom, .. }
            | AtomEvent::AtomCancelled { atom, .. } => *atom,
        }
    }

    /// Decoded revert reason of a failed rollback.
    pub fn revert_reason(&self) -> Option<String> {
        match self {
            AtomEvent::OperationRollbackFailed { reason, .. } => revert::decode_error(reason),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AtomEvent::AtomDeployed { .. } => "AtomDeployed",
            AtomEvent::AtomInitialized { .. } => "AtomInitialized",
            AtomEvent::OperationApproved { .. } => "OperationApproved",
            AtomEvent::AtomSettled { .. } => "AtomSettled",
            AtomEvent::OperationRolledBack { .. } => "OperationRolledBack",
            AtomEvent::OperationRollbackFailed { .. } => "OperationRollbackFailed",
            AtomEvent::AtomCancelled { .. } => "AtomCancelled",
        }
    }
}
