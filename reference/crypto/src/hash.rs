//! Cryptographic hash functions.

use dvp_common::Digest;
use sha2::{Digest as _, Sha256};

/// Compute SHA-256 hash.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash an ordered list of field elements under a domain tag.
///
/// The tag is length-prefixed so no two (domain, fields) pairs share a
/// preimage.
pub fn hash_fields(domain: &str, fields: &[Digest]) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update((domain.len() as u32).to_be_bytes());
    hasher.update(domain.as_bytes());
    for field in fields {
        hasher.update(field.as_bytes());
    }
    Digest::new(hasher.finalize().into())
}

/// Hash two Merkle nodes.
pub fn hash_pair(left: &Digest, right: &Digest) -> Digest {
    hash_fields("dvp.merkle.node", &[*left, *right])
}
