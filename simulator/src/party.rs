//! Simulated trading parties.

use dvp_common::{Address, Digest};
use dvp_crypto::{PartyKeys, Utxo};
use dvp_ledger::UtxoLedger;
use serde::{Deserialize, Serialize};

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Delivers UTXO value.
    Seller,
    /// Pays with confidential balance.
    Buyer,
}

/// A party with keys and the openings of the UTXOs it knows it owns.
pub struct Party {
    pub name: String,
    pub keys: PartyKeys,
    wallet: Vec<Utxo>,
}

impl Party {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            keys: PartyKeys::from_label(&name),
            name,
            wallet: Vec::new(),
        }
    }

    pub fn address(&self) -> Address {
        self.keys.address()
    }

    pub fn owner_pk(&self) -> Digest {
        self.keys.owner_pk()
    }

    pub fn receive(&mut self, utxo: Utxo) {
        self.wallet.push(utxo);
    }

    /// First UTXO worth at least `value` that is still spendable.
    pub fn find_spendable(&self, ledger: &UtxoLedger, value: u64) -> Option<Utxo> {
        self.wallet
            .iter()
            .find(|u| u.value >= value && self.is_spendable(ledger, u))
            .copied()
    }

    /// Total value of this party's unspent, unlocked UTXOs.
    pub fn utxo_balance(&self, ledger: &UtxoLedger) -> u64 {
        self.wallet
            .iter()
            .filter(|u| self.is_spendable(ledger, u))
            .map(|u| u.value)
            .sum()
    }

    fn is_spendable(&self, ledger: &UtxoLedger, utxo: &Utxo) -> bool {
        let commitment = utxo.commitment();
        ledger.commitments().contains(&commitment)
            && !ledger.is_locked(&commitment)
            && !ledger.is_spent(&utxo.nullifier(&self.keys.spending_secret()))
    }
}

/// Creates the two parties of a trade.
pub struct PartyFactory;

impl PartyFactory {
    pub fn create_pair() -> (Party, Party) {
        (Party::new("alice"), Party::new("bob"))
    }
}
