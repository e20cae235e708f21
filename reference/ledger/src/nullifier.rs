//! Nullifier, commitment and locked sets of the UTXO ledger.

use std::collections::{BTreeMap, HashSet, VecDeque};

use dvp_common::{Digest, DvpError, LockId, Result};
use dvp_crypto::{CryptoError, MerkleTree};

/// Bookkeeping that prevents double spends and double locks.
///
/// Every commitment ever accepted is remembered, so an output can never be
/// created twice. Spendable commitments live in an append-only Merkle tree;
/// locked commitments live in a separate set with its own root.
#[derive(Debug, Clone)]
pub struct CommitmentSet {
    tree: MerkleTree,
    known_roots: VecDeque<Digest>,
    root_history: usize,
    commitments: HashSet<Digest>,
    nullifiers: HashSet<Digest>,
    locked: BTreeMap<Digest, LockId>,
    merkle_depth: usize,
}

impl CommitmentSet {
    pub fn new(merkle_depth: usize, root_history: usize) -> Self {
        let tree = MerkleTree::new(merkle_depth);
        let mut known_roots = VecDeque::with_capacity(root_history.max(1));
        known_roots.push_back(tree.root());
        Self {
            tree,
            known_roots,
            root_history: root_history.max(1),
            commitments: HashSet::new(),
            nullifiers: HashSet::new(),
            locked: BTreeMap::new(),
            merkle_depth,
        }
    }

    /// Current root of the spendable tree.
    pub fn root(&self) -> Digest {
        self.tree.root()
    }

    /// Whether `root` is the current root or one of the recent ones.
    pub fn is_known_root(&self, root: &Digest) -> bool {
        self.known_roots.contains(root)
    }

    /// Root over the currently locked commitments, in commitment order.
    pub fn locked_root(&self) -> Digest {
        let mut tree = MerkleTree::new(self.merkle_depth);
        for commitment in self.locked.keys() {
            // capacity matches the spendable tree, which bounds the locked set
            if tree.insert(*commitment).is_err() {
                break;
            }
        }
        tree.root()
    }

    pub fn is_spent(&self, nullifier: &Digest) -> bool {
        self.nullifiers.contains(nullifier)
    }

    pub fn is_locked(&self, commitment: &Digest) -> bool {
        self.locked.contains_key(commitment)
    }

    pub fn locked_by(&self, commitment: &Digest) -> Option<LockId> {
        self.locked.get(commitment).copied()
    }

    pub fn contains(&self, commitment: &Digest) -> bool {
        self.commitments.contains(commitment)
    }

    pub fn spendable_count(&self) -> usize {
        self.tree.len()
    }

    pub fn locked_count(&self) -> usize {
        self.locked.len()
    }

    /// Check nullifiers are unused and pairwise distinct.
    pub fn check_nullifiers(&self, nullifiers: &[Digest]) -> Result<()> {
        let mut seen = HashSet::new();
        for nullifier in nullifiers {
            if self.is_spent(nullifier) || !seen.insert(*nullifier) {
                return Err(DvpError::InputAlreadySpentOrLocked(format!(
                    "nullifier {nullifier}"
                )));
            }
        }
        Ok(())
    }

    /// Check new commitments are unseen and pairwise distinct.
    pub fn check_fresh<'a>(&self, outputs: impl IntoIterator<Item = &'a Digest>) -> Result<()> {
        let mut seen = HashSet::new();
        for output in outputs {
            if output.is_zero() {
                continue;
            }
            if self.contains(output) || !seen.insert(*output) {
                return Err(DvpError::DuplicateCommitment(*output));
            }
        }
        Ok(())
    }

    /// Check `commitments` are all held by `lock_id`.
    pub fn check_locked_by(&self, commitments: &[Digest], lock_id: &LockId) -> Result<()> {
        for commitment in commitments {
            if self.locked_by(commitment) != Some(*lock_id) {
                return Err(DvpError::InputAlreadySpentOrLocked(format!(
                    "commitment {commitment} is not locked by {lock_id}"
                )));
            }
        }
        Ok(())
    }

    /// Check the spendable tree has room for `count` more leaves.
    pub fn check_capacity(&self, count: usize) -> Result<()> {
        let free = self.tree.capacity().saturating_sub(self.tree.len());
        if count > free {
            return Err(CryptoError::TreeFull(self.tree.depth()).into());
        }
        Ok(())
    }

    pub fn spend(&mut self, nullifiers: &[Digest]) {
        self.nullifiers.extend(nullifiers.iter().copied());
    }

    /// Append spendable outputs to the tree. Zero commitments are padding
    /// and are skipped.
    pub fn add_outputs(&mut self, outputs: &[Digest]) -> Result<()> {
        let outputs: Vec<Digest> = outputs.iter().copied().filter(|o| !o.is_zero()).collect();
        self.check_capacity(outputs.len())?;
        for output in outputs {
            self.tree.insert(output)?;
            self.commitments.insert(output);
        }
        self.push_root();
        Ok(())
    }

    pub fn lock_outputs(&mut self, outputs: &[Digest], lock_id: LockId) {
        for output in outputs.iter().filter(|o| !o.is_zero()) {
            self.commitments.insert(*output);
            self.locked.insert(*output, lock_id);
        }
    }

    /// Drop commitments from the locked set without making them spendable.
    pub fn consume_locked(&mut self, commitments: &[Digest]) {
        for commitment in commitments {
            self.locked.remove(commitment);
        }
    }

    /// Move commitments from the locked set back into the spendable tree.
    pub fn release_locked(&mut self, commitments: &[Digest]) -> Result<()> {
        let held = commitments.iter().filter(|c| self.is_locked(c)).count();
        self.check_capacity(held)?;
        for commitment in commitments {
            if self.locked.remove(commitment).is_some() {
                self.tree.insert(*commitment)?;
            }
        }
        self.push_root();
        Ok(())
    }

    fn push_root(&mut self) {
        let root = self.tree.root();
        if self.known_roots.back() == Some(&root) {
            return;
        }
        if self.known_roots.len() == self.root_history {
            self.known_roots.pop_front();
        }
        self.known_roots.push_back(root);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn set() -> CommitmentSet {
        CommitmentSet::new(8, 3)
    }

    #[test]
    fn test_double_spend_rejected() {
        let mut set = set();
        let n = Digest::from_u64(1);
        set.check_nullifiers(&[n]).unwrap();
        set.spend(&[n]);
        assert!(matches!(
            set.check_nullifiers(&[n]),
            Err(DvpError::InputAlreadySpentOrLocked(_))
        ));
        assert!(set.check_nullifiers(&[Digest::from_u64(2), Digest::from_u64(2)]).is_err());
    }

    #[test]
    fn test_outputs_never_reused() {
        let mut set = set();
        let c = Digest::from_u64(10);
        set.add_outputs(&[c]).unwrap();
        assert!(matches!(set.check_fresh(&[c]), Err(DvpError::DuplicateCommitment(_))));

        let lock_id = LockId::from_bytes([1; 32]);
        let locked = Digest::from_u64(11);
        set.lock_outputs(&[locked], lock_id);
        set.consume_locked(&[locked]);
        assert!(set.check_fresh(&[locked]).is_err());
    }

    #[test]
    fn test_root_history_window() {
        let mut set = set();
        let initial = set.root();
        assert!(set.is_known_root(&initial));
        for i in 1..=3 {
            set.add_outputs(&[Digest::from_u64(i)]).unwrap();
        }
        assert!(!set.is_known_root(&initial));
        assert!(set.is_known_root(&set.root()));
    }

    #[test]
    fn test_lock_and_release() {
        let mut set = set();
        let lock_id = LockId::from_bytes([1; 32]);
        let c = Digest::from_u64(5);
        let empty_locked = set.locked_root();

        set.lock_outputs(&[c, Digest::ZERO], lock_id);
        assert!(set.is_locked(&c));
        assert_eq!(set.locked_count(), 1);
        assert_ne!(set.locked_root(), empty_locked);
        set.check_locked_by(&[c], &lock_id).unwrap();
        assert!(set
            .check_locked_by(&[c], &LockId::from_bytes([2; 32]))
            .is_err());

        let before = set.root();
        set.release_locked(&[c]).unwrap();
        assert!(!set.is_locked(&c));
        assert_eq!(set.locked_root(), empty_locked);
        assert_ne!(set.root(), before);
        assert_eq!(set.spendable_count(), 1);
    }

    #[test]
    fn test_full_tree_rejects_whole_batch() {
        let mut set = CommitmentSet::new(1, 3);
        set.add_outputs(&[Digest::from_u64(1)]).unwrap();
        let root = set.root();

        let err = set
            .add_outputs(&[Digest::from_u64(2), Digest::from_u64(3)])
            .unwrap_err();
        assert_eq!(err, DvpError::Crypto("Merkle tree is full at depth 1".into()));
        assert_eq!(set.root(), root);
        assert_eq!(set.spendable_count(), 1);
        // nothing was recorded, so the outputs stay fresh
        set.check_fresh(&[Digest::from_u64(2), Digest::from_u64(3)]).unwrap();

        let lock_id = LockId::from_bytes([1; 32]);
        let held = [Digest::from_u64(4), Digest::from_u64(5)];
        set.lock_outputs(&held, lock_id);
        assert!(set.release_locked(&held).is_err());
        assert_eq!(set.locked_count(), 2);
        set.check_capacity(1).unwrap();
        assert!(set.check_capacity(2).is_err());
    }

    proptest! {
        #[test]
        fn no_nullifier_spends_twice(ids in prop::collection::vec(0u64..20, 1..60)) {
            let mut set = set();
            let mut spent = HashSet::new();
            for id in ids {
                let n = Digest::from_u64(id);
                let accepted = set.check_nullifiers(&[n]).is_ok();
                prop_assert_eq!(accepted, spent.insert(n));
                if accepted {
                    set.spend(&[n]);
                }
            }
        }
    }
}
