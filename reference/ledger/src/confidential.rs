//! Confidential arithmetic capability for the account ledger.
//!
//! The ledger only handles opaque 32-byte handles. Every operation on the
//! amounts behind them goes through [`ConfidentialArithmetic`], so an FHE
//! coprocessor and its decryption oracle can sit behind the trait.
//! [`MockFheOracle`] keeps plaintexts in memory behind random-looking
//! handles, with an access list per handle.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use dvp_common::{Address, Digest, DvpError, Result};
use dvp_crypto::hash_fields;

/// Client-encrypted amount plus the proof that it was encrypted for a
/// given contract and user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedInput {
    pub handle: Digest,
    pub proof: Vec<u8>,
}

/// Arithmetic over encrypted unsigned 64-bit amounts.
pub trait ConfidentialArithmetic: Send + Sync {
    /// Encrypt `value` as an input for `contract` submitted by `user`.
    fn encrypt_input(&self, value: u64, contract: Address, user: Address) -> EncryptedInput;

    /// Check an input's proof for `contract` and `user`, returning the
    /// handle to compute with. An unknown handle is `InvalidEncryptedInput`;
    /// a proof made for another contract or user is `ProofInvalid`.
    fn verify_input(&self, input: &EncryptedInput, contract: Address, user: Address)
        -> Result<Digest>;

    /// Encrypt a public constant.
    fn constant(&self, value: u64) -> Digest;

    /// Wrapping addition.
    fn add(&self, a: &Digest, b: &Digest) -> Result<Digest>;

    /// Wrapping subtraction.
    fn sub(&self, a: &Digest, b: &Digest) -> Result<Digest>;

    /// Encrypted boolean `a <= b`.
    fn le(&self, a: &Digest, b: &Digest) -> Result<Digest>;

    /// `if cond { a } else { b }` without revealing `cond`.
    fn select(&self, cond: &Digest, a: &Digest, b: &Digest) -> Result<Digest>;

    /// Grant `who` the right to decrypt `handle`.
    fn allow(&self, handle: &Digest, who: Address);

    fn is_allowed(&self, handle: &Digest, who: Address) -> bool;

    /// Decrypt for a party on the handle's access list.
    fn decrypt_for(&self, handle: &Digest, who: Address) -> Result<u64>;
}

/// In-memory stand-in for an FHE coprocessor.
pub struct MockFheOracle {
    values: DashMap<Digest, u64>,
    acl: DashMap<Digest, HashSet<Address>>,
    input_origins: Mutex<HashMap<Digest, (Address, Address)>>,
    nonce: AtomicU64,
    domain: Digest,
}

impl MockFheOracle {
    pub fn new() -> Self {
        Self {
            values: DashMap::new(),
            acl: DashMap::new(),
            input_origins: Mutex::new(HashMap::new()),
            nonce: AtomicU64::new(0),
            domain: Digest::new(dvp_crypto::sha256(b"dvp.fhe.mock")),
        }
    }

    fn store(&self, value: u64) -> Digest {
        let nonce = self.nonce.fetch_add(1, Ordering::Relaxed);
        let handle = hash_fields("dvp.fhe.handle", &[self.domain, Digest::from_u64(nonce)]);
        self.values.insert(handle, value);
        handle
    }

    fn value(&self, handle: &Digest) -> Result<u64> {
        self.values
            .get(handle)
            .map(|v| *v)
            .ok_or_else(|| DvpError::InvalidEncryptedInput(format!("unknown handle {handle}")))
    }

    fn input_proof(&self, handle: &Digest, contract: Address, user: Address) -> Vec<u8> {
        hash_fields(
            "dvp.fhe.input",
            &[
                self.domain,
                *handle,
                Digest::from_address(&contract),
                Digest::from_address(&user),
            ],
        )
        .as_bytes()
        .to_vec()
    }

    /// Number of live handles.
    pub fn handle_count(&self) -> usize {
        self.values.len()
    }
}

impl Default for MockFheOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfidentialArithmetic for MockFheOracle {
    fn encrypt_input(&self, value: u64, contract: Address, user: Address) -> EncryptedInput {
        let handle = self.store(value);
        self.input_origins.lock().insert(handle, (contract, user));
        EncryptedInput {
            handle,
            proof: self.input_proof(&handle, contract, user),
        }
    }

    fn verify_input(
        &self,
        input: &EncryptedInput,
        contract: Address,
        user: Address,
    ) -> Result<Digest> {
        self.value(&input.handle)?;
        if input.proof != self.input_proof(&input.handle, contract, user) {
            return Err(DvpError::ProofInvalid(
                "input proof does not match contract and user".to_string(),
            ));
        }
        Ok(input.handle)
    }

    fn constant(&self, value: u64) -> Digest {
        self.store(value)
    }

    fn add(&self, a: &Digest, b: &Digest) -> Result<Digest> {
        Ok(self.store(self.value(a)?.wrapping_add(self.value(b)?)))
    }

    fn sub(&self, a: &Digest, b: &Digest) -> Result<Digest> {
        Ok(self.store(self.value(a)?.wrapping_sub(self.value(b)?)))
    }

    fn le(&self, a: &Digest, b: &Digest) -> Result<Digest> {
        Ok(self.store(u64::from(self.value(a)? <= self.value(b)?)))
    }

    fn select(&self, cond: &Digest, a: &Digest, b: &Digest) -> Result<Digest> {
        let picked = if self.value(cond)? != 0 { a } else { b };
        Ok(self.store(self.value(picked)?))
    }

    fn allow(&self, handle: &Digest, who: Address) {
        self.acl.entry(*handle).or_default().insert(who);
    }

    fn is_allowed(&self, handle: &Digest, who: Address) -> bool {
        self.acl
            .get(handle)
            .map(|set| set.contains(&who))
            .unwrap_or(false)
    }

    fn decrypt_for(&self, handle: &Digest, who: Address) -> Result<u64> {
        let origin_user = self.input_origins.lock().get(handle).map(|(_, user)| *user);
        if !self.is_allowed(handle, who) && origin_user != Some(who) {
            return Err(DvpError::InvalidEncryptedInput(format!(
                "{who} may not decrypt {handle}"
            )));
        }
        self.value(handle)
    }
}
