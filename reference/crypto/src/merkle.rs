//! Fixed-depth append-only Merkle tree over commitments.
//!
//! Ledgers keep one as their on-ledger commitment root; parties keep a
//! mirror fed from ledger events to produce inclusion paths for spending.

use dvp_common::Digest;
use serde::{Deserialize, Serialize};

use crate::hash::hash_pair;
use crate::{CryptoError, Result};

/// Inclusion proof: sibling hashes from leaf level to just below the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Position of the leaf in insertion order.
    pub leaf_index: usize,
    /// Sibling hashes, one per level.
    pub siblings: Vec<Digest>,
}

/// Append-only Merkle tree of fixed depth. Empty slots hash as zero subtrees.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    depth: usize,
    leaves: Vec<Digest>,
    zeros: Vec<Digest>,
}

impl MerkleTree {
    pub fn new(depth: usize) -> Self {
        let mut zeros = Vec::with_capacity(depth + 1);
        zeros.push(Digest::ZERO);
        for level in 0..depth {
            let z = zeros[level];
            zeros.push(hash_pair(&z, &z));
        }
        Self {
            depth,
            leaves: Vec::new(),
            zeros,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Maximum number of leaves.
    pub fn capacity(&self) -> usize {
        1usize.checked_shl(self.depth as u32).unwrap_or(usize::MAX)
    }

    /// Append a leaf, returning its index.
    pub fn insert(&mut self, leaf: Digest) -> Result<usize> {
        if self.leaves.len() >= self.capacity() {
            return Err(CryptoError::TreeFull(self.depth));
        }
        self.leaves.push(leaf);
        Ok(self.leaves.len() - 1)
    }

    pub fn index_of(&self, leaf: &Digest) -> Option<usize> {
        self.leaves.iter().position(|l| l == leaf)
    }

    pub fn contains(&self, leaf: &Digest) -> bool {
        self.index_of(leaf).is_some()
    }

    fn levels(&self) -> Vec<Vec<Digest>> {
        let mut levels = Vec::with_capacity(self.depth + 1);
        levels.push(self.leaves.clone());
        for level in 0..self.depth {
            let next = levels[level]
                .chunks(2)
                .map(|pair| {
                    let right = pair.get(1).copied().unwrap_or(self.zeros[level]);
                    hash_pair(&pair[0], &right)
                })
                .collect();
            levels.push(next);
        }
        levels
    }

    /// Current root.
    pub fn root(&self) -> Digest {
        if self.leaves.is_empty() {
            return self.zeros[self.depth];
        }
        self.levels()[self.depth]
            .first()
            .copied()
            .unwrap_or(self.zeros[self.depth])
    }

    /// Inclusion proof for a leaf already in the tree.
    pub fn proof(&self, leaf: &Digest) -> Result<MerkleProof> {
        let leaf_index = self.index_of(leaf).ok_or(CryptoError::LeafNotFound)?;
        let levels = self.levels();
        let mut index = leaf_index;
        let mut siblings = Vec::with_capacity(self.depth);
        for (level, nodes) in levels.iter().take(self.depth).enumerate() {
            siblings.push(nodes.get(index ^ 1).copied().unwrap_or(self.zeros[level]));
            index >>= 1;
        }
        Ok(MerkleProof {
            leaf_index,
            siblings,
        })
    }
}

/// Recompute the root from a leaf and its path and compare.
pub fn verify_path(root: &Digest, leaf: &Digest, proof: &MerkleProof) -> bool {
    let mut node = *leaf;
    let mut index = proof.leaf_index;
    for sibling in &proof.siblings {
        node = if index & 1 == 0 {
            hash_pair(&node, sibling)
        } else {
            hash_pair(sibling, &node)
        };
        index >>= 1;
    }
    index == 0 && node == *root
}
