//! DvP Atom Ledgers
//!
//! Two lockable ledgers: a confidential account ledger whose balances are
//! encrypted handles, and a UTXO ledger of hidden commitments spent by
//! nullifier. Both hold value under locks whose settle and refund outcomes
//! are fixed up front, and both expose the [`LockableLedger`] capability a
//! coordinator drives.

pub mod account;
pub mod confidential;
pub mod journal;
pub mod lock;
pub mod lockable;
pub mod nullifier;
pub mod utxo;

pub use account::{AccountLockRequest, ConfidentialAccountLedger, Credit};
pub use confidential::{ConfidentialArithmetic, EncryptedInput, MockFheOracle};
pub use journal::{Journal, JournalEntry};
pub use lock::{LockBook, LockCommitment, LockRecord};
pub use lockable::{shared, LockableLedger, SharedLedger};
pub use nullifier::CommitmentSet;
pub use utxo::{release_outcome, UtxoLedger, UtxoLedgerConfig, UtxoLockRequest, UtxoTransfer, UtxoTransition};
