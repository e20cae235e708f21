//! Atom factory with sequential and predicted-address deployment.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{info, instrument};

use dvp_common::{Address, DvpError, Result};

use crate::atom::Atom;
use crate::config::FactoryConfig;
use crate::events::{AtomEvent, AtomOperation};
use crate::metrics::SharedMetrics;
use crate::registry::LedgerRegistry;

const PREDICTED_DOMAIN: &[u8] = b"dvp-atom";
const NONCE_DOMAIN: &[u8] = b"dvp-atom-nonce";

/// Deploys atoms and keeps track of them by address.
pub struct AtomFactory {
    address: Address,
    config: FactoryConfig,
    registry: Arc<LedgerRegistry>,
    metrics: SharedMetrics,
    nonce: AtomicU64,
    next_sequence: AtomicU64,
    atoms: DashMap<Address, Arc<Atom>>,
    events: Mutex<Vec<AtomEvent>>,
}

impl AtomFactory {
    pub fn new(config: FactoryConfig, registry: Arc<LedgerRegistry>, metrics: SharedMetrics) -> Self {
        Self {
            address: Address::from_label(&config.address_seed),
            config,
            registry,
            metrics,
            nonce: AtomicU64::new(0),
            next_sequence: AtomicU64::new(0),
            atoms: DashMap::new(),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Address `deploy(_, sequence, operations)` will use. The operations
    /// are part of the preimage, so a deployment over any other operation
    /// list lands elsewhere.
    pub fn predict_address(&self, sequence: u64, operations: &[AtomOperation]) -> Address {
        let mut bytes = preimage(PREDICTED_DOMAIN, &self.address, sequence);
        bytes.reserve(operations.len() * 72);
        for operation in operations {
            bytes.extend_from_slice(operation.ledger.as_bytes());
            bytes.extend_from_slice(operation.lock_id.as_bytes());
            bytes.extend_from_slice(operation.approver.as_bytes());
        }
        Address::from_preimage(&bytes)
    }

    /// Hand out a sequence number no earlier caller received. Deploying at
    /// a sequence never requires reserving it first.
    pub fn reserve_sequence(&self) -> u64 {
        self.next_sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// Deploy an atom pre-populated with `operations` at the factory's next
    /// nonce address.
    #[instrument(skip(self, operations), fields(factory = %self.address))]
    pub fn create(&self, caller: Address, operations: Vec<AtomOperation>) -> Result<Arc<Atom>> {
        if operations.is_empty() {
            return Err(DvpError::EmptyOperations);
        }
        loop {
            let nonce = self.nonce.fetch_add(1, Ordering::Relaxed);
            let address = Address::from_preimage(&preimage(NONCE_DOMAIN, &self.address, nonce));
            match self.deploy_at(caller, address, operations.clone()) {
                Err(DvpError::AddressAlreadyDeployed(_)) => continue,
                other => return other,
            }
        }
    }

    /// Deploy an atom at `predict_address(sequence, &operations)`. With no
    /// operations the atom waits for `initialize` from `caller`.
    #[instrument(skip(self, operations), fields(factory = %self.address))]
    pub fn deploy(
        &self,
        caller: Address,
        sequence: u64,
        operations: Vec<AtomOperation>,
    ) -> Result<Arc<Atom>> {
        let address = self.predict_address(sequence, &operations);
        self.deploy_at(caller, address, operations)
    }

    pub fn atom(&self, address: &Address) -> Result<Arc<Atom>> {
        self.atoms
            .get(address)
            .map(|entry| entry.value().clone())
            .ok_or(DvpError::UnknownAtom(*address))
    }

    pub fn is_deployed(&self, address: &Address) -> bool {
        self.atoms.contains_key(address)
    }

    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    /// Deployment events, in order.
    pub fn events(&self) -> Vec<AtomEvent> {
        self.events.lock().clone()
    }

    fn deploy_at(
        &self,
        caller: Address,
        address: Address,
        operations: Vec<AtomOperation>,
    ) -> Result<Arc<Atom>> {
        if operations.len() > self.config.max_operations {
            return Err(DvpError::TooManyOperations {
                count: operations.len(),
                max: self.config.max_operations,
            });
        }

        let entry = match self.atoms.entry(address) {
            Entry::Occupied(_) => return Err(DvpError::AddressAlreadyDeployed(address)),
            Entry::Vacant(entry) => entry,
        };
        let atom = Arc::new(Atom::new(
            address,
            caller,
            self.config.max_operations,
            self.registry.clone(),
            self.metrics.clone(),
        ));
        if !operations.is_empty() {
            atom.initialize(caller, operations.clone())?;
        }
        entry.insert(atom.clone());

        self.events.lock().push(AtomEvent::AtomDeployed {
            factory: self.address,
            atom: address,
            operations: operations.clone(),
        });
        self.metrics.atom_deployed();
        info!(atom = %address, caller = %caller, operations = operations.len(), "Atom deployed");
        Ok(atom)
    }
}

fn preimage(domain: &[u8], factory: &Address, sequence: u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(domain.len() + 28);
    bytes.extend_from_slice(domain);
    bytes.extend_from_slice(factory.as_bytes());
    bytes.extend_from_slice(&sequence.to_be_bytes());
    bytes
}
