//! Party key material.
//!
//! A party holds one seed from which it derives an Ed25519 signing key (its
//! UTXO owner key and ledger address), an X25519 key for the disclosure
//! channel and the secret that feeds its nullifiers.

use dvp_common::{Address, Digest};
use ed25519_dalek::{
    Signer, SigningKey as Ed25519SigningKey, Verifier, VerifyingKey as Ed25519VerifyingKey,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use crate::hash::{hash_fields, sha256};
use crate::{CryptoError, Result};

/// Key material of a trading party.
pub struct PartyKeys {
    signing: Ed25519SigningKey,
    exchange: StaticSecret,
    key_id: String,
}

impl PartyKeys {
    /// Generate fresh random keys.
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);
        Self::from_seed(seed)
    }

    /// Derive keys deterministically from a 32-byte seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing = Ed25519SigningKey::from_bytes(&seed);
        let exchange = StaticSecret::from(sha256(&[b"dvp.x25519".as_slice(), &seed].concat()));
        let key_id = hex::encode(&signing.verifying_key().as_bytes()[..8]);
        Self {
            signing,
            exchange,
            key_id,
        }
    }

    /// Derive keys from a human-readable label. Test and simulation use only.
    pub fn from_label(label: &str) -> Self {
        Self::from_seed(sha256(label.as_bytes()))
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Public key that owns UTXO commitments.
    pub fn owner_pk(&self) -> Digest {
        Digest::new(self.signing.verifying_key().to_bytes())
    }

    /// Ledger address of the party.
    pub fn address(&self) -> Address {
        address_of(&self.owner_pk())
    }

    /// Secret mixed into nullifiers of UTXOs this party spends.
    pub fn spending_secret(&self) -> Digest {
        hash_fields(
            "dvp.party.spending",
            &[Digest::new(self.signing.to_bytes())],
        )
    }

    /// Public half of the disclosure-channel key.
    pub fn exchange_public(&self) -> [u8; 32] {
        X25519PublicKey::from(&self.exchange).to_bytes()
    }

    /// Raw X25519 shared secret with a counterparty.
    pub(crate) fn shared_secret(&self, peer_public: &[u8; 32]) -> [u8; 32] {
        let peer = X25519PublicKey::from(*peer_public);
        self.exchange.diffie_hellman(&peer).to_bytes()
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        let sig = self.signing.sign(message);
        Signature {
            bytes: sig.to_bytes().to_vec(),
            key_id: self.key_id.clone(),
        }
    }
}

/// Ledger address bound to an owner public key.
pub fn address_of(owner_pk: &Digest) -> Address {
    Address::from_preimage(owner_pk.as_bytes())
}

/// Verify a signature made by the holder of `owner_pk`.
pub fn verify_signature(owner_pk: &Digest, message: &[u8], signature: &Signature) -> Result<()> {
    let key = Ed25519VerifyingKey::from_bytes(owner_pk.as_bytes())
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

    let sig_bytes: [u8; 64] = signature
        .bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidSignature)?;
    let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);

    key.verify(message, &sig)
        .map_err(|_| CryptoError::InvalidSignature)
}

/// An Ed25519 signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Raw signature bytes.
    pub bytes: Vec<u8>,
    /// ID of the key that created this signature.
    pub key_id: String,
}

impl Signature {
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let keys = PartyKeys::generate();
        let message = b"approve operation 0";
        let signature = keys.sign(message);

        assert!(verify_signature(&keys.owner_pk(), message, &signature).is_ok());
        assert!(verify_signature(&keys.owner_pk(), b"approve operation 1", &signature).is_err());
    }

    #[test]
    fn test_invalid_signature() {
        let keys = PartyKeys::generate();
        let mut signature = keys.sign(b"msg");
        signature.bytes[0] ^= 0xff;
        assert!(verify_signature(&keys.owner_pk(), b"msg", &signature).is_err());
    }

    #[test]
    fn test_label_keys_are_deterministic() {
        let a = PartyKeys::from_label("alice");
        let b = PartyKeys::from_label("alice");
        assert_eq!(a.owner_pk(), b.owner_pk());
        assert_eq!(a.address(), b.address());
        assert_eq!(a.spending_secret(), b.spending_secret());
        assert_eq!(a.key_id(), b.key_id());
        assert_ne!(a.address(), PartyKeys::from_label("bob").address());
    }

    #[test]
    fn test_key_agreement_is_symmetric() {
        let alice = PartyKeys::from_label("alice");
        let bob = PartyKeys::from_label("bob");
        assert_eq!(
            alice.shared_secret(&bob.exchange_public()),
            bob.shared_secret(&alice.exchange_public())
        );
    }
}
