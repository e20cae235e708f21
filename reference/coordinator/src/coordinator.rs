//! Coordinator facade: ledgers, factory and metrics wired together.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, instrument};

use dvp_common::{Address, DvpError, Result};
use dvp_crypto::ProofVerifier;
use dvp_ledger::{ConfidentialAccountLedger, ConfidentialArithmetic, UtxoLedger};

use crate::atom::Atom;
use crate::config::CoordinatorConfig;
use crate::events::{AtomEvent, AtomOperation};
use crate::factory::AtomFactory;
use crate::flows::{PendingTrade, TradeSetup};
use crate::metrics::{Metrics, SharedMetrics};
use crate::registry::LedgerRegistry;

/// Entry point for hosting ledgers and running trades between them.
pub struct Coordinator {
    config: CoordinatorConfig,
    registry: Arc<LedgerRegistry>,
    factory: Arc<AtomFactory>,
    metrics: SharedMetrics,
}

impl Coordinator {
    /// Create a coordinator after validating `config`.
    pub fn new(config: CoordinatorConfig) -> Result<Self> {
        config.validate().map_err(DvpError::Configuration)?;

        let registry = Arc::new(LedgerRegistry::new());
        let metrics = Arc::new(Metrics::with_enabled(config.metrics_enabled));
        let factory = Arc::new(AtomFactory::new(
            config.factory.clone(),
            registry.clone(),
            metrics.clone(),
        ));
        info!(factory = %factory.address(), "Coordinator created");

        Ok(Self {
            config,
            registry,
            factory,
            metrics,
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<LedgerRegistry> {
        &self.registry
    }

    pub fn factory(&self) -> &Arc<AtomFactory> {
        &self.factory
    }

    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    /// Create and register a UTXO ledger using the configured tree shape.
    pub fn add_utxo_ledger(
        &self,
        address: Address,
        minter: Address,
        verifier: Arc<dyn ProofVerifier>,
    ) -> Arc<Mutex<UtxoLedger>> {
        self.registry
            .register_typed(UtxoLedger::new(address, minter, verifier, &self.config.utxo))
    }

    /// Create and register a confidential account ledger.
    pub fn add_account_ledger(
        &self,
        address: Address,
        minter: Address,
        oracle: Arc<dyn ConfidentialArithmetic>,
    ) -> Arc<Mutex<ConfidentialAccountLedger>> {
        self.registry
            .register_typed(ConfidentialAccountLedger::new(address, minter, oracle))
    }

    /// Start a trade with the given setup strategy.
    #[instrument(skip(self, operations))]
    pub fn begin_trade(
        &self,
        setup: TradeSetup,
        caller: Address,
        operations: Vec<AtomOperation>,
    ) -> Result<PendingTrade> {
        setup.begin(&self.factory, caller, operations)
    }

    pub fn atom(&self, address: &Address) -> Result<Arc<Atom>> {
        self.factory.atom(address)
    }

    pub fn approve(&self, atom: &Address, caller: Address, index: usize) -> Result<()> {
        self.atom(atom)?.approve_operation(caller, index)
    }

    pub fn settle(&self, atom: &Address, caller: Address) -> Result<()> {
        self.atom(atom)?.settle(caller)
    }

    pub fn cancel(&self, atom: &Address, caller: Address) -> Result<Vec<AtomEvent>> {
        self.atom(atom)?.cancel(caller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dvp_common::LockId;

    #[test]
    fn test_coordinator_creation() {
        let coordinator = Coordinator::new(CoordinatorConfig::default()).unwrap();
        assert!(coordinator.registry().is_empty());
        assert_eq!(coordinator.factory().atom_count(), 0);
        assert_eq!(coordinator.metrics().snapshot().atoms_deployed, 0);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = CoordinatorConfig::default();
        config.factory.max_operations = 0;
        assert!(matches!(
            Coordinator::new(config),
            Err(DvpError::Configuration(_))
        ));
    }

    #[test]
    fn test_unknown_atom_calls() {
        let coordinator = Coordinator::new(CoordinatorConfig::default()).unwrap();
        let nowhere = Address::from_label("nowhere");
        let alice = Address::from_label("alice");
        assert_eq!(coordinator.settle(&nowhere, alice), Err(DvpError::UnknownAtom(nowhere)));

        let pending = coordinator
            .begin_trade(
                TradeSetup::ProposeFirst,
                alice,
                vec![AtomOperation::new(
                    Address::from_label("zeto"),
                    LockId::from_bytes([1; 32]),
                    alice,
                )],
            )
            .unwrap();
        let atom = pending.finish(coordinator.factory()).unwrap();
        coordinator.approve(&atom.address(), alice, 0).unwrap();
        assert!(atom.is_ready());
        assert_eq!(coordinator.metrics().snapshot().operations_approved, 1);
    }

    #[test]
    fn test_metrics_can_be_disabled() {
        let config = CoordinatorConfig {
            metrics_enabled: false,
            ..CoordinatorConfig::default()
        };
        let coordinator = Coordinator::new(config).unwrap();
        assert!(!coordinator.metrics().is_enabled());

        let alice = Address::from_label("alice");
        let pending = coordinator
            .begin_trade(
                TradeSetup::ProposeFirst,
                alice,
                vec![AtomOperation::new(
                    Address::from_label("zeto"),
                    LockId::from_bytes([1; 32]),
                    alice,
                )],
            )
            .unwrap();
        let atom = pending.finish(coordinator.factory()).unwrap();
        coordinator.approve(&atom.address(), alice, 0).unwrap();
        let snapshot = coordinator.metrics().snapshot();
        assert_eq!(snapshot.atoms_deployed, 0);
        assert_eq!(snapshot.operations_approved, 0);
    }
}
