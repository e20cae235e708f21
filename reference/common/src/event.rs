//! Events emitted by lockable ledgers.

use serde::{Deserialize, Serialize};

use crate::{Address, Digest, LockId, LockView};

/// Local effect of a lock outcome once applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeEffect {
    /// New UTXO commitments were produced.
    Outputs(Vec<Digest>),
    /// Locked commitments were returned to the spendable set unchanged.
    Released(Vec<Digest>),
    /// An encrypted amount was credited to an account.
    Credit { to: Address, amount: Digest },
}

/// A structured event emitted by a ledger operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    /// New UTXO commitments minted.
    UtxoMinted { outputs: Vec<Digest> },
    /// UTXOs spent (by nullifier) into new commitments.
    UtxoTransferred {
        inputs: Vec<Digest>,
        outputs: Vec<Digest>,
    },
    /// Encrypted amount minted to an account.
    ConfidentialMinted { to: Address, amount: Digest },
    /// Encrypted amount moved between accounts.
    ConfidentialTransferred {
        from: Address,
        to: Address,
        amount: Digest,
    },
    /// Lock created with delegate and both outcomes in one step.
    /// `outputs` are unlocked commitments produced alongside the lock.
    LockCreated { view: LockView, outputs: Vec<Digest> },
    /// Lock staged without outcomes.
    LockPrepared { view: LockView, outputs: Vec<Digest> },
    /// Outcomes bound to a staged lock.
    LockCommitted(LockView),
    /// Delegate authority handed over.
    LockDelegated { lock_id: LockId, delegate: Address },
    /// Settle outcome applied.
    LockSettled {
        lock_id: LockId,
        delegate: Address,
        outcome_hash: Digest,
        effect: OutcomeEffect,
    },
    /// Refund outcome applied.
    LockRefunded {
        lock_id: LockId,
        delegate: Address,
        outcome_hash: Digest,
        effect: OutcomeEffect,
    },
    /// Lock withdrawn by its owner before delegation. `released` lists
    /// commitments returned to the spendable set.
    LockWithdrawn {
        lock_id: LockId,
        owner: Address,
        released: Vec<Digest>,
    },
}

impl LedgerEvent {
    /// Lock this event refers to, if any.
    pub fn lock_id(&self) -> Option<LockId> {
        match self {
            LedgerEvent::LockCreated { view, .. }
            | LedgerEvent::LockPrepared { view, .. }
            | LedgerEvent::LockCommitted(view) => Some(view.lock_id),
            LedgerEvent::LockDelegated { lock_id, .. }
            | LedgerEvent::LockSettled { lock_id, .. }
            | LedgerEvent::LockRefunded { lock_id, .. }
            | LedgerEvent::LockWithdrawn { lock_id, .. } => Some(*lock_id),
            _ => None,
        }
    }

    /// New commitments this event adds to the spendable tree, in order.
    ///
    /// Parties feed these into their off-ledger Merkle mirror.
    pub fn spendable_commitments(&self) -> &[Digest] {
        match self {
            LedgerEvent::UtxoMinted { outputs }
            | LedgerEvent::UtxoTransferred { outputs, .. }
            | LedgerEvent::LockCreated { outputs, .. }
            | LedgerEvent::LockPrepared { outputs, .. }
            | LedgerEvent::LockWithdrawn {
                released: outputs, ..
            } => outputs,
            LedgerEvent::LockSettled { effect, .. } | LedgerEvent::LockRefunded { effect, .. } => {
                match effect {
                    OutcomeEffect::Outputs(outputs) | OutcomeEffect::Released(outputs) => outputs,
                    OutcomeEffect::Credit { .. } => &[],
                }
            }
            _ => &[],
        }
    }

    /// Short event name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::UtxoMinted { .. } => "UtxoMinted",
            LedgerEvent::UtxoTransferred { .. } => "UtxoTransferred",
            LedgerEvent::ConfidentialMinted { .. } => "ConfidentialMinted",
            LedgerEvent::ConfidentialTransferred { .. } => "ConfidentialTransferred",
            LedgerEvent::LockCreated { .. } => "LockCreated",
            LedgerEvent::LockPrepared { .. } => "LockPrepared",
            LedgerEvent::LockCommitted(_) => "LockCommitted",
            LedgerEvent::LockDelegated { .. } => "LockDelegated",
            LedgerEvent::LockSettled { .. } => "LockSettled",
            LedgerEvent::LockRefunded { .. } => "LockRefunded",
            LedgerEvent::LockWithdrawn { .. } => "LockWithdrawn",
        }
    }
}
