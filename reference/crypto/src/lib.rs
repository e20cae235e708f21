//! DvP Atom Cryptographic Primitives
//!
//! Hashing, UTXO commitments and nullifiers, party keys, the off-ledger
//! Merkle mirror, the proof capability and the counterparty disclosure
//! channel.

pub mod commitment;
pub mod disclosure;
pub mod hash;
pub mod merkle;
pub mod proof;
pub mod signing;

pub use commitment::Utxo;
pub use disclosure::{open_disclosure, seal_disclosure, DisclosureKey, SealedDisclosure};
pub use hash::{hash_fields, sha256};
pub use merkle::{verify_path, MerkleProof, MerkleTree};
pub use proof::{Circuit, DigestProver, DigestVerifier, ProofVerifier, Statement};
pub use signing::{address_of, verify_signature, PartyKeys, Signature};

use dvp_common::DvpError;

/// Errors from cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("Merkle tree is full at depth {0}")]
    TreeFull(usize),

    #[error("Leaf not in tree")]
    LeafNotFound,

    #[error("Disclosed opening does not match commitment")]
    CommitmentMismatch,
}

pub type Result<T> = std::result::Result<T, CryptoError>;

impl From<CryptoError> for DvpError {
    fn from(err: CryptoError) -> Self {
        DvpError::Crypto(err.to_string())
    }
}
