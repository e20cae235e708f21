//! Trade setup strategies.
//!
//! Every strategy ends with the same [`Atom`]; they differ only in when its
//! address is fixed relative to the parties creating their locks.
//!
//! ```text
//! ProposeFirst      create(ops) ──► parties lock ──► finish
//! OfferFirst        predict(seq, ops) ─► parties lock ──► deploy(seq, ops)
//! DirectInitialize  deploy(seq) ──► parties lock ──► initialize(ops)
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use dvp_common::{Address, Result};

use crate::atom::Atom;
use crate::events::AtomOperation;
use crate::factory::AtomFactory;

/// How the atom for a trade comes into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSetup {
    /// Deploy with all operations before anyone locks.
    ProposeFirst,
    /// Agree on a predicted address, deploy once both locks exist.
    OfferFirst,
    /// Deploy an empty atom, initialize once both locks exist.
    DirectInitialize,
}

impl TradeSetup {
    /// Fix the delegate address for a trade over `operations`.
    pub fn begin(
        self,
        factory: &AtomFactory,
        caller: Address,
        operations: Vec<AtomOperation>,
    ) -> Result<PendingTrade> {
        let (delegate, atom, sequence) = match self {
            TradeSetup::ProposeFirst => {
                let atom = factory.create(caller, operations.clone())?;
                (atom.address(), Some(atom), None)
            }
            TradeSetup::OfferFirst => {
                let sequence = factory.reserve_sequence();
                let delegate = factory.predict_address(sequence, &operations);
                (delegate, None, Some(sequence))
            }
            TradeSetup::DirectInitialize => {
                let sequence = factory.reserve_sequence();
                let atom = factory.deploy(caller, sequence, vec![])?;
                (atom.address(), Some(atom), Some(sequence))
            }
        };
        info!(setup = ?self, delegate = %delegate, "Trade setup started");
        Ok(PendingTrade {
            setup: self,
            caller,
            delegate,
            sequence,
            atom,
            operations,
        })
    }
}

/// A trade whose delegate address is known but whose atom may not be
/// ready yet.
#[derive(Debug)]
pub struct PendingTrade {
    setup: TradeSetup,
    caller: Address,
    delegate: Address,
    sequence: Option<u64>,
    atom: Option<Arc<Atom>>,
    operations: Vec<AtomOperation>,
}

impl PendingTrade {
    pub fn setup(&self) -> TradeSetup {
        self.setup
    }

    /// Address both parties must name as their locks' delegate.
    pub fn delegate(&self) -> Address {
        self.delegate
    }

    /// Factory sequence the atom is or will be deployed at, if any.
    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    pub fn operations(&self) -> &[AtomOperation] {
        &self.operations
    }

    /// Make the atom ready for approvals.
    pub fn finish(self, factory: &AtomFactory) -> Result<Arc<Atom>> {
        match (self.setup, self.atom, self.sequence) {
            (TradeSetup::DirectInitialize, Some(atom), _) => {
                atom.initialize(self.caller, self.operations)?;
                Ok(atom)
            }
            (_, Some(atom), _) => Ok(atom),
            (_, None, Some(sequence)) => factory.deploy(self.caller, sequence, self.operations),
            (_, None, None) => factory.atom(&self.delegate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::AtomStatus;
    use crate::config::FactoryConfig;
    use crate::metrics::Metrics;
    use crate::registry::LedgerRegistry;
    use dvp_common::LockId;

    fn factory() -> AtomFactory {
        AtomFactory::new(
            FactoryConfig::default(),
            Arc::new(LedgerRegistry::new()),
            Arc::new(Metrics::new()),
        )
    }

    fn ops() -> Vec<AtomOperation> {
        vec![
            AtomOperation::new(
                Address::from_label("zeto"),
                LockId::from_bytes([1; 32]),
                Address::from_label("alice"),
            ),
            AtomOperation::new(
                Address::from_label("fhe-erc20"),
                LockId::from_bytes([2; 32]),
                Address::from_label("bob"),
            ),
        ]
    }

    #[test]
    fn test_every_setup_yields_same_atom_shape() {
        let factory = factory();
        let alice = Address::from_label("alice");
        for setup in [
            TradeSetup::ProposeFirst,
            TradeSetup::OfferFirst,
            TradeSetup::DirectInitialize,
        ] {
            let pending = setup.begin(&factory, alice, ops()).unwrap();
            let delegate = pending.delegate();
            let atom = pending.finish(&factory).unwrap();
            assert_eq!(atom.address(), delegate, "{setup:?}");
            assert_eq!(atom.status(), AtomStatus::Approving);
            assert_eq!(atom.operations(), ops());
        }
        assert_eq!(factory.atom_count(), 3);
    }

    #[test]
    fn test_offer_first_defers_deployment() {
        let factory = factory();
        let pending = TradeSetup::OfferFirst
            .begin(&factory, Address::from_label("alice"), ops())
            .unwrap();
        assert!(!factory.is_deployed(&pending.delegate()));
        let atom = pending.finish(&factory).unwrap();
        assert!(factory.is_deployed(&atom.address()));
    }
}
