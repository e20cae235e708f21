//! UTXO commitments and nullifiers.

use dvp_common::Digest;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::hash::hash_fields;

const COMMITMENT_DOMAIN: &str = "dvp.utxo.commitment";
const NULLIFIER_DOMAIN: &str = "dvp.utxo.nullifier";

/// Plaintext opening of a UTXO commitment.
///
/// Only the commitment is ever published; the opening is kept by the owner
/// and disclosed to a counterparty over the off-ledger channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub value: u64,
    pub salt: Digest,
    pub owner_pk: Digest,
}

impl Utxo {
    /// New UTXO with a random salt.
    pub fn new(value: u64, owner_pk: Digest) -> Self {
        let mut salt = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut salt);
        Self::with_salt(value, Digest::new(salt), owner_pk)
    }

    pub fn with_salt(value: u64, salt: Digest, owner_pk: Digest) -> Self {
        Self {
            value,
            salt,
            owner_pk,
        }
    }

    /// `H(value, salt, owner_pk)`
    pub fn commitment(&self) -> Digest {
        hash_fields(
            COMMITMENT_DOMAIN,
            &[Digest::from_u64(self.value), self.salt, self.owner_pk],
        )
    }

    /// `H(commitment, spender_secret)`, revealed once when the UTXO is spent.
    pub fn nullifier(&self, spender_secret: &Digest) -> Digest {
        hash_fields(NULLIFIER_DOMAIN, &[self.commitment(), *spender_secret])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_random_salt_hides_value() {
        let owner = Digest::from_u64(1);
        let a = Utxo::new(100, owner);
        let b = Utxo::new(100, owner);
        assert_ne!(a.commitment(), b.commitment());
    }

    #[test]
    fn test_nullifier_depends_on_secret() {
        let utxo = Utxo::with_salt(100, Digest::from_u64(9), Digest::from_u64(1));
        let n1 = utxo.nullifier(&Digest::from_u64(11));
        let n2 = utxo.nullifier(&Digest::from_u64(12));
        assert_ne!(n1, n2);
        assert_ne!(n1, utxo.commitment());
    }

    proptest! {
        #[test]
        fn commitment_binds_every_field(v1 in any::<u64>(), v2 in any::<u64>(), s in any::<[u8; 32]>(), o in any::<[u8; 32]>()) {
            let a = Utxo::with_salt(v1, Digest::new(s), Digest::new(o));
            let b = Utxo::with_salt(v2, Digest::new(s), Digest::new(o));
            prop_assert_eq!(v1 == v2, a.commitment() == b.commitment());
        }
    }
}
