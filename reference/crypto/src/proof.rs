//! Proof capability for UTXO state transitions.
//!
//! Ledgers never look inside a proof. They rebuild the public inputs of the
//! statement being claimed and ask an injected [`ProofVerifier`] whether the
//! opaque proof bytes attest to it. [`DigestProver`] and [`DigestVerifier`]
//! are a stand-in proving system: a proof is a keyed digest of the circuit
//! and its public inputs, so any change to an input invalidates it.

use dvp_common::{Address, Digest, LockId};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::hash::{hash_fields, sha256};

/// Circuits the UTXO ledger accepts proofs for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Circuit {
    /// Spend nullified inputs into new outputs.
    Transfer,
    /// Spend nullified inputs into outputs plus locked outputs.
    Lock,
    /// Spend a lock's locked commitments into a pre-agreed outcome.
    LockedTransfer,
}

impl Circuit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Circuit::Transfer => "anon_nullifier_transfer",
            Circuit::Lock => "anon_nullifier_transfer_lock",
            Circuit::LockedTransfer => "anon_locked_transfer",
        }
    }
}

impl fmt::Display for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A claimed state transition, from which public inputs are derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Transfer {
        root: Digest,
        nullifiers: Vec<Digest>,
        outputs: Vec<Digest>,
    },
    Lock {
        root: Digest,
        nullifiers: Vec<Digest>,
        outputs: Vec<Digest>,
        locked_outputs: Vec<Digest>,
        owner: Address,
    },
    /// Outcome of a lock. The delegate is a public input so a proof
    /// prepared for one coordinator is useless under any other.
    LockedTransfer {
        lock_id: LockId,
        inputs: Vec<Digest>,
        outputs: Vec<Digest>,
        delegate: Address,
    },
}

fn push_list(inputs: &mut Vec<Digest>, list: &[Digest]) {
    inputs.push(Digest::from_u64(list.len() as u64));
    inputs.extend_from_slice(list);
}

impl Statement {
    pub fn circuit(&self) -> Circuit {
        match self {
            Statement::Transfer { .. } => Circuit::Transfer,
            Statement::Lock { .. } => Circuit::Lock,
            Statement::LockedTransfer { .. } => Circuit::LockedTransfer,
        }
    }

    /// Ordered public inputs. Lists are length-prefixed.
    pub fn public_inputs(&self) -> Vec<Digest> {
        let mut inputs = Vec::new();
        match self {
            Statement::Transfer {
                root,
                nullifiers,
                outputs,
            } => {
                inputs.push(*root);
                push_list(&mut inputs, nullifiers);
                push_list(&mut inputs, outputs);
            }
            Statement::Lock {
                root,
                nullifiers,
                outputs,
                locked_outputs,
                owner,
            } => {
                inputs.push(*root);
                push_list(&mut inputs, nullifiers);
                push_list(&mut inputs, outputs);
                push_list(&mut inputs, locked_outputs);
                inputs.push(Digest::from_address(owner));
            }
            Statement::LockedTransfer {
                lock_id,
                inputs: locked,
                outputs,
                delegate,
            } => {
                inputs.push(Digest::from(*lock_id));
                push_list(&mut inputs, locked);
                push_list(&mut inputs, outputs);
                inputs.push(Digest::from_address(delegate));
            }
        }
        inputs
    }
}

/// Verification capability injected into a ledger.
pub trait ProofVerifier: Send + Sync {
    /// Check `proof` against a circuit and its public inputs.
    fn verify(&self, circuit: Circuit, proof: &[u8], public_inputs: &[Digest]) -> bool;

    fn verify_statement(&self, statement: &Statement, proof: &[u8]) -> bool {
        self.verify(statement.circuit(), proof, &statement.public_inputs())
    }
}

fn proving_key(domain: &str) -> Digest {
    hash_fields("dvp.proof.key", &[Digest::new(sha256(domain.as_bytes()))])
}

fn digest_proof(key: &Digest, circuit: Circuit, public_inputs: &[Digest]) -> Digest {
    let mut fields = Vec::with_capacity(public_inputs.len() + 1);
    fields.push(*key);
    fields.extend_from_slice(public_inputs);
    hash_fields(circuit.as_str(), &fields)
}

/// Produces digest proofs under a shared domain.
#[derive(Debug, Clone)]
pub struct DigestProver {
    key: Digest,
}

impl DigestProver {
    pub fn new(domain: &str) -> Self {
        Self {
            key: proving_key(domain),
        }
    }

    pub fn prove(&self, statement: &Statement) -> Vec<u8> {
        digest_proof(&self.key, statement.circuit(), &statement.public_inputs())
            .as_bytes()
            .to_vec()
    }
}

/// Verifies proofs made by a [`DigestProver`] of the same domain.
#[derive(Debug, Clone)]
pub struct DigestVerifier {
    key: Digest,
}

impl DigestVerifier {
    pub fn new(domain: &str) -> Self {
        Self {
            key: proving_key(domain),
        }
    }
}

impl ProofVerifier for DigestVerifier {
    fn verify(&self, circuit: Circuit, proof: &[u8], public_inputs: &[Digest]) -> bool {
        proof == digest_proof(&self.key, circuit, public_inputs).as_bytes()
    }
}
