//! DvP atom coordinator
//!
//! Atoms settle a set of locks held on independent ledgers as one trade:
//! every leg settles together, or the trade is cancelled and each leg is
//! refunded on its own. The factory fixes an atom's address either before or
//! after the parties lock, and the registry gives atoms access to ledgers.

pub mod atom;
pub mod config;
pub mod coordinator;
pub mod events;
pub mod factory;
pub mod flows;
pub mod metrics;
pub mod registry;

pub use atom::{Atom, AtomStatus};
pub use config::{CoordinatorConfig, FactoryConfig};
pub use coordinator::Coordinator;
pub use events::{AtomEvent, AtomOperation};
pub use factory::AtomFactory;
pub use flows::{PendingTrade, TradeSetup};
pub use metrics::{Metrics, MetricsSnapshot, SharedMetrics};
pub use registry::LedgerRegistry;
