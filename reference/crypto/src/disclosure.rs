//! Off-ledger disclosure channel between trade counterparties.
//!
//! The sender of a UTXO seals its opening (value, salt, owner key) to the
//! recipient: X25519 agreement, HKDF-SHA256 key derivation and AES-256-GCM
//! with the commitment as associated data. The recipient opens it and checks
//! the opening against the commitment it saw on the ledger.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use dvp_common::Digest;
use hkdf::Hkdf;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::commitment::Utxo;
use crate::signing::PartyKeys;
use crate::{CryptoError, Result};

const HKDF_INFO: &[u8] = b"dvp.disclosure.v1";

/// Symmetric key for one sender/recipient pair.
pub struct DisclosureKey([u8; 32]);

impl DisclosureKey {
    /// Derive the key shared between `local` and the holder of `peer_public`.
    pub fn derive(local: &PartyKeys, peer_public: &[u8; 32]) -> Result<Self> {
        let shared = local.shared_secret(peer_public);
        let hk = Hkdf::<Sha256>::new(Some(HKDF_INFO), &shared);
        let mut key = [0u8; 32];
        hk.expand(HKDF_INFO, &mut key)
            .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;
        Ok(Self(key))
    }
}

/// A sealed UTXO opening.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SealedDisclosure {
    /// Commitment the opening belongs to; bound as associated data.
    pub commitment: Digest,
    /// Nonce (12 bytes for AES-GCM).
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

/// Seal the opening of `utxo` from `sender` to the holder of `recipient_public`.
pub fn seal_disclosure(
    sender: &PartyKeys,
    recipient_public: &[u8; 32],
    utxo: &Utxo,
) -> Result<SealedDisclosure> {
    let key = DisclosureKey::derive(sender, recipient_public)?;
    let cipher = Aes256Gcm::new_from_slice(&key.0)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let mut nonce_bytes = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let plaintext =
        serde_json::to_vec(utxo).map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    let commitment = utxo.commitment();
    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: &plaintext,
                aad: commitment.as_bytes(),
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    Ok(SealedDisclosure {
        commitment,
        nonce: nonce_bytes.to_vec(),
        ciphertext,
    })
}

/// Open a disclosure from the holder of `sender_public` and check it
/// against `expected_commitment`.
pub fn open_disclosure(
    recipient: &PartyKeys,
    sender_public: &[u8; 32],
    sealed: &SealedDisclosure,
    expected_commitment: &Digest,
) -> Result<Utxo> {
    if sealed.commitment != *expected_commitment {
        return Err(CryptoError::CommitmentMismatch);
    }
    let key = DisclosureKey::derive(recipient, sender_public)?;
    let cipher = Aes256Gcm::new_from_slice(&key.0)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;

    let nonce_bytes: [u8; 12] = sealed
        .nonce
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::DecryptionFailed("Invalid nonce length".to_string()))?;

    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&nonce_bytes),
            Payload {
                msg: &sealed.ciphertext,
                aad: sealed.commitment.as_bytes(),
            },
        )
        .map_err(|_| CryptoError::DecryptionFailed("Decryption failed".to_string()))?;

    let utxo: Utxo = serde_json::from_slice(&plaintext)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;
    if utxo.commitment() != *expected_commitment {
        return Err(CryptoError::CommitmentMismatch);
    }
    Ok(utxo)
}
