//! Lock lifecycle types shared by every lockable ledger.

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};
use std::fmt;

use crate::{Address, Digest, LockId};

/// Lock status representing the lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LockStatus {
    /// State transition staged, value held, no outcomes bound yet.
    Prepared,
    /// Settle and refund outcomes bound, lock discoverable on the ledger.
    Committed,
    /// Delegate authority confirmed; only the delegate may finish the lock.
    Delegated,
    /// Settle outcome applied.
    Settled,
    /// Refund outcome applied, or withdrawn by the owner before delegation.
    RolledBack,
}

impl LockStatus {
    /// Check if this is a final state.
    pub fn is_final(&self) -> bool {
        matches!(self, LockStatus::Settled | LockStatus::RolledBack)
    }

    /// Check if the delegate may settle or refund in this state.
    pub fn is_active(&self) -> bool {
        matches!(self, LockStatus::Delegated)
    }

    /// Check if the owner may still withdraw the lock.
    pub fn is_withdrawable(&self) -> bool {
        matches!(self, LockStatus::Prepared | LockStatus::Committed)
    }

    /// Get valid next states from current state.
    pub fn valid_transitions(&self) -> &[LockStatus] {
        match self {
            LockStatus::Prepared => &[LockStatus::Committed, LockStatus::RolledBack],
            LockStatus::Committed => &[LockStatus::Delegated, LockStatus::RolledBack],
            LockStatus::Delegated => &[LockStatus::Settled, LockStatus::RolledBack],
            LockStatus::Settled => &[],
            LockStatus::RolledBack => &[],
        }
    }

    /// Check if transition to given state is valid.
    pub fn can_transition_to(&self, next: LockStatus) -> bool {
        self.valid_transitions().contains(&next)
    }
}

/// The two delegate-only actions on a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockAction {
    Settle,
    Refund,
}

impl fmt::Display for LockAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockAction::Settle => write!(f, "settle"),
            LockAction::Refund => write!(f, "refund"),
        }
    }
}

/// One pre-agreed outcome of a lock: the state transition to apply, the
/// proof that makes it valid, and auxiliary data.
///
/// Both outcomes of a lock are fixed when the lock is committed, before
/// either is known to happen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOutcome<T> {
    /// Ledger-specific state transition payload.
    pub transition: T,
    /// Opaque proof bytes.
    pub proof: Vec<u8>,
    /// Opaque auxiliary data.
    pub data: Vec<u8>,
}

impl<T> LockOutcome<T> {
    /// Create an outcome.
    pub fn new(transition: T, proof: Vec<u8>, data: Vec<u8>) -> Self {
        Self {
            transition,
            proof,
            data,
        }
    }
}

/// A ledger-specific outcome payload with a canonical byte encoding.
pub trait Transition {
    /// Append the canonical bytes of this transition to `out`.
    fn encode(&self, out: &mut Vec<u8>);
}

impl Transition for Vec<u8> {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self);
    }
}

impl<T: Transition> LockOutcome<T> {
    /// Hash of the full outcome, published in lock events so a counterparty
    /// can compare it against what it was promised.
    ///
    /// Each field is length-prefixed, so bytes cannot move between fields
    /// without changing the hash.
    pub fn hash(&self) -> Digest {
        let mut transition = Vec::new();
        self.transition.encode(&mut transition);

        let mut hasher = Sha256::new();
        for field in [&transition, &self.proof, &self.data] {
            hasher.update((field.len() as u64).to_be_bytes());
            hasher.update(field);
        }
        Digest::new(hasher.finalize().into())
    }
}

/// The value a lock holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockedValue {
    /// UTXO commitments moved into the locked set.
    Commitments(Vec<Digest>),
    /// Handle of an encrypted amount debited from the owner's balance.
    Encrypted(Digest),
}

/// Externally observable description of a lock, carried by lock events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockView {
    /// Lock identifier.
    pub lock_id: LockId,
    /// Ledger holding the lock.
    pub ledger: Address,
    /// Party whose value is held.
    pub owner: Address,
    /// Address authorized to trigger an outcome.
    pub delegate: Address,
    /// Party whose off-band authorization gates the lock's use.
    pub approver: Address,
    /// Intended recipient of the settle outcome, when the ledger knows it.
    pub receiver: Option<Address>,
    /// Current status.
    pub status: LockStatus,
    /// The held value.
    pub locked: LockedValue,
    /// Hash of the settle outcome, once committed.
    pub settle_hash: Option<Digest>,
    /// Hash of the refund outcome, once committed.
    pub refund_hash: Option<Digest>,
    /// Auxiliary data supplied with the lock.
    pub data: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        assert!(LockStatus::Prepared.can_transition_to(LockStatus::Committed));
        assert!(LockStatus::Committed.can_transition_to(LockStatus::Delegated));
        assert!(LockStatus::Delegated.can_transition_to(LockStatus::Settled));
        assert!(LockStatus::Delegated.can_transition_to(LockStatus::RolledBack));
        assert!(!LockStatus::Prepared.can_transition_to(LockStatus::Settled));
        assert!(!LockStatus::Settled.can_transition_to(LockStatus::RolledBack));
        assert!(!LockStatus::RolledBack.can_transition_to(LockStatus::Settled));
    }

    #[test]
    fn test_only_delegated_is_active() {
        assert!(LockStatus::Delegated.is_active());
        assert!(!LockStatus::Committed.is_active());
        assert!(!LockStatus::Settled.is_active());
        assert!(LockStatus::Committed.is_withdrawable());
        assert!(!LockStatus::Delegated.is_withdrawable());
    }

    #[test]
    fn test_outcome_hash_binds_every_field() {
        let a = LockOutcome::new(vec![1u8, 2], vec![9], vec![]);
        let b = LockOutcome::new(vec![1u8, 2], vec![9], vec![0]);
        let c = LockOutcome::new(vec![1u8, 3], vec![9], vec![]);
        assert_eq!(a.hash(), a.clone().hash());
        assert_ne!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());
    }

    #[test]
    fn test_outcome_hash_separates_fields() {
        let a = LockOutcome::new(vec![1u8, 2], vec![3], vec![]);
        let b = LockOutcome::new(vec![1u8], vec![2, 3], vec![]);
        let c = LockOutcome::new(vec![1u8, 2], vec![], vec![3]);
        assert_ne!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());
        assert_ne!(b.hash(), c.hash());
    }

    #[test]
    fn test_action_display() {
        assert_eq!(LockAction::Settle.to_string(), "settle");
        assert_eq!(LockAction::Refund.to_string(), "refund");
    }
}
