//! The atom: a coordinator instance that settles or cancels a set of
//! delegated locks as one trade.
//!
//! An atom never holds value. It only knows `(ledger, lock_id)` pairs and
//! calls the ledgers' own settle and refund entry points, as the delegate
//! the locks were handed to.
//!
//! Settlement is strict: every leg settles or none does. Cancellation is
//! best effort: each leg is refunded on its own and a leg that cannot be
//! refunded is reported through [`AtomEvent::OperationRollbackFailed`]
//! without stopping the others.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use dvp_common::{Address, DvpError, LockAction, LockId, Result};

use crate::events::{AtomEvent, AtomOperation};
use crate::metrics::SharedMetrics;
use crate::registry::LedgerRegistry;

/// Lifecycle of an atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AtomStatus {
    /// Deployed without operations.
    Initialized,
    /// Operations registered, collecting approvals.
    Approving,
    Settled,
    Cancelled,
}

impl AtomStatus {
    pub fn is_final(&self) -> bool {
        matches!(self, AtomStatus::Settled | AtomStatus::Cancelled)
    }
}

#[derive(Debug)]
struct AtomState {
    status: AtomStatus,
    operations: Vec<AtomOperation>,
    approvals: Vec<bool>,
    events: Vec<AtomEvent>,
}

impl AtomState {
    fn approved(&self) -> usize {
        self.approvals.iter().filter(|a| **a).count()
    }

    fn emit(&mut self, event: AtomEvent) {
        self.events.push(event);
    }
}

/// A deployed atom.
///
/// Calls are serialized per atom, so of two racing `settle`/`cancel` calls
/// the first to run decides the outcome.
pub struct Atom {
    address: Address,
    deployer: Address,
    max_operations: usize,
    registry: Arc<LedgerRegistry>,
    metrics: SharedMetrics,
    state: Mutex<AtomState>,
}

impl Atom {
    /// Deploy an atom with no operations. Only `deployer` may initialize it.
    pub fn new(
        address: Address,
        deployer: Address,
        max_operations: usize,
        registry: Arc<LedgerRegistry>,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            address,
            deployer,
            max_operations,
            registry,
            metrics,
            state: Mutex::new(AtomState {
                status: AtomStatus::Initialized,
                operations: Vec::new(),
                approvals: Vec::new(),
                events: Vec::new(),
            }),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn deployer(&self) -> Address {
        self.deployer
    }

    pub fn status(&self) -> AtomStatus {
        self.state.lock().status
    }

    pub fn operations(&self) -> Vec<AtomOperation> {
        self.state.lock().operations.clone()
    }

    pub fn operation(&self, index: usize) -> Option<AtomOperation> {
        self.state.lock().operations.get(index).copied()
    }

    pub fn is_approved(&self, index: usize) -> bool {
        self.state
            .lock()
            .approvals
            .get(index)
            .copied()
            .unwrap_or(false)
    }

    pub fn approval_count(&self) -> usize {
        self.state.lock().approved()
    }

    /// Whether every operation is approved and settlement may be triggered.
    pub fn is_ready(&self) -> bool {
        let state = self.state.lock();
        state.status == AtomStatus::Approving && state.approved() == state.operations.len()
    }

    /// Every event this atom emitted, in order.
    pub fn events(&self) -> Vec<AtomEvent> {
        self.state.lock().events.clone()
    }

    /// Register the trade's operations. Allowed once, by the deployer.
    #[instrument(skip(self, operations), fields(atom = %self.address))]
    pub fn initialize(&self, caller: Address, operations: Vec<AtomOperation>) -> Result<()> {
        let mut state = self.state.lock();
        if state.status != AtomStatus::Initialized {
            return Err(DvpError::AlreadyInitialized);
        }
        if caller != self.deployer {
            return Err(DvpError::NotDeployer(caller));
        }
        if operations.is_empty() {
            return Err(DvpError::EmptyOperations);
        }
        if operations.len() > self.max_operations {
            return Err(DvpError::TooManyOperations {
                count: operations.len(),
                max: self.max_operations,
            });
        }

        let count = operations.len();
        state.approvals = vec![false; count];
        state.operations = operations;
        state.status = AtomStatus::Approving;
        state.emit(AtomEvent::AtomInitialized {
            atom: self.address,
            operations: count,
        });
        info!(caller = %caller, operations = count, "Atom initialized");
        Ok(())
    }

    /// Approve operation `index`. Only its approver may call this; a repeat
    /// approval changes nothing.
    #[instrument(skip(self), fields(atom = %self.address))]
    pub fn approve_operation(&self, caller: Address, index: usize) -> Result<()> {
        let mut state = self.state.lock();
        match state.status {
            AtomStatus::Initialized => return Err(DvpError::NotInitialized),
            AtomStatus::Settled => return Err(DvpError::AtomSettled),
            AtomStatus::Cancelled => return Err(DvpError::AtomCancelled),
            AtomStatus::Approving => {}
        }
        let operation = state.operations.get(index).copied().ok_or(
            DvpError::OperationIndexOutOfRange {
                index,
                len: state.operations.len(),
            },
        )?;
        if operation.approver != caller {
            return Err(DvpError::UnauthorizedApprover { index, caller });
        }
        if state.approvals[index] {
            return Ok(());
        }

        state.approvals[index] = true;
        state.emit(AtomEvent::OperationApproved {
            atom: self.address,
            index,
            approver: caller,
        });
        self.metrics.operation_approved();
        info!(
            operation_index = index,
            approved = state.approved(),
            required = state.operations.len(),
            "Operation approved"
        );
        Ok(())
    }

    /// Settle every leg, or revert and leave every lock untouched.
    ///
    /// Anyone may call this once all operations are approved. Calling it
    /// again after success reaches the ledgers, which reject the already
    /// settled locks.
    #[instrument(skip(self), fields(atom = %self.address))]
    pub fn settle(&self, caller: Address) -> Result<()> {
        let mut state = self.state.lock();
        match state.status {
            AtomStatus::Initialized => return Err(DvpError::NotInitialized),
            AtomStatus::Cancelled => return Err(DvpError::AtomCancelled),
            AtomStatus::Approving | AtomStatus::Settled => {}
        }
        let approved = state.approved();
        if approved < state.operations.len() {
            return Err(DvpError::NotFullyApproved {
                approved,
                required: state.operations.len(),
            });
        }

        let locks: Vec<(Address, LockId)> = state
            .operations
            .iter()
            .map(|op| (op.ledger, op.lock_id))
            .collect();
        if let Err(err) = self.registry.apply_all(self.address, LockAction::Settle, &locks) {
            if state.status == AtomStatus::Settled {
                self.metrics.settlement_replayed();
                warn!(caller = %caller, error = %err, "Settlement replay rejected");
            } else {
                self.metrics.settlement_aborted();
                error!(caller = %caller, error = %err, "Settlement reverted");
            }
            return Err(err);
        }

        state.status = AtomStatus::Settled;
        state.emit(AtomEvent::AtomSettled {
            atom: self.address,
            caller,
        });
        self.metrics.settlement_succeeded();
        info!(caller = %caller, legs = locks.len(), "Atom settled");
        Ok(())
    }

    /// Refund every leg that can be refunded and mark the atom cancelled.
    ///
    /// Only an approver of one of the operations may cancel. Returns the
    /// events emitted by this call.
    #[instrument(skip(self), fields(atom = %self.address))]
    pub fn cancel(&self, caller: Address) -> Result<Vec<AtomEvent>> {
        let mut state = self.state.lock();
        match state.status {
            AtomStatus::Initialized => return Err(DvpError::NotInitialized),
            AtomStatus::Settled => return Err(DvpError::AtomSettled),
            AtomStatus::Cancelled => return Err(DvpError::AtomCancelled),
            AtomStatus::Approving => {}
        }
        if !state.operations.iter().any(|op| op.approver == caller) {
            return Err(DvpError::NotParticipant(caller));
        }

        let first_event = state.events.len();
        let operations = state.operations.clone();
        for (index, op) in operations.iter().enumerate() {
            match self
                .registry
                .apply_one(self.address, LockAction::Refund, op.ledger, op.lock_id)
            {
                Ok(()) => {
                    self.metrics.rollback_succeeded();
                    info!(operation_index = index, lock_id = %op.lock_id, "Operation rolled back");
                    state.emit(AtomEvent::OperationRolledBack {
                        atom: self.address,
                        index,
                        lock_id: op.lock_id,
                    });
                }
                Err(err) => {
                    self.metrics.rollback_failed();
                    warn!(
                        operation_index = index,
                        lock_id = %op.lock_id,
                        error = %err,
                        "Operation rollback failed"
                    );
                    state.emit(AtomEvent::OperationRollbackFailed {
                        atom: self.address,
                        index,
                        lock_id: op.lock_id,
                        reason: err.revert_data(),
                    });
                }
            }
        }

        state.status = AtomStatus::Cancelled;
        state.emit(AtomEvent::AtomCancelled {
            atom: self.address,
            caller,
        });
        self.metrics.atom_cancelled();
        info!(caller = %caller, "Atom cancelled");
        Ok(state.events[first_event..].to_vec())
    }
}

impl std::fmt::Debug for Atom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Atom")
            .field("address", &self.address)
            .field("status", &self.status())
            .finish()
    }
}
