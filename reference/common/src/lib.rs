//! DvP Atom Common Types
//!
//! This crate contains shared types used across the DvP atom protocol,
//! including identifiers, the lock lifecycle, ledger events and the error
//! taxonomy shared by ledgers and coordinators.

pub mod identifiers;
pub mod lock;
pub mod event;
pub mod error;
pub mod revert;

pub use identifiers::*;
pub use lock::*;
pub use event::*;
pub use error::*;
