//! Ledgers reachable from atoms, and all-or-nothing execution across them.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error, info};

use dvp_common::{Address, DvpError, LockAction, LockId, Result};
use dvp_ledger::{LockableLedger, SharedLedger};

/// Registry of lockable ledgers by address.
#[derive(Default)]
pub struct LedgerRegistry {
    ledgers: DashMap<Address, SharedLedger>,
}

impl LedgerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a ledger under its own address, replacing any previous one.
    pub fn register(&self, ledger: SharedLedger) -> Address {
        let address = ledger.lock().address();
        info!(ledger = %address, "Ledger registered");
        self.ledgers.insert(address, ledger);
        address
    }

    /// Register a concrete ledger and hand back a typed handle to it.
    pub fn register_typed<L: LockableLedger + 'static>(&self, ledger: L) -> Arc<Mutex<L>> {
        let handle = dvp_ledger::shared(ledger);
        self.register(handle.clone());
        handle
    }

    pub fn get(&self, address: &Address) -> Result<SharedLedger> {
        self.ledgers
            .get(address)
            .map(|entry| entry.value().clone())
            .ok_or(DvpError::UnknownLedger(*address))
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.ledgers.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.ledgers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledgers.is_empty()
    }

    /// Apply `action` to every lock as `caller`, or to none of them.
    ///
    /// Touched ledgers are locked in address order and a savepoint is opened
    /// on each before anything runs. The first failure rolls every ledger
    /// back and is returned unchanged.
    pub fn apply_all(
        &self,
        caller: Address,
        action: LockAction,
        locks: &[(Address, LockId)],
    ) -> Result<()> {
        let mut handles: BTreeMap<Address, SharedLedger> = BTreeMap::new();
        for (ledger, _) in locks {
            if !handles.contains_key(ledger) {
                handles.insert(*ledger, self.get(ledger)?);
            }
        }

        let mut guards: BTreeMap<Address, MutexGuard<'_, dyn LockableLedger>> = handles
            .iter()
            .map(|(address, handle)| (*address, handle.lock()))
            .collect();
        for guard in guards.values_mut() {
            guard.begin();
        }

        let outcome = locks.iter().try_for_each(|(ledger, lock_id)| {
            let guard = guards
                .get_mut(ledger)
                .ok_or(DvpError::UnknownLedger(*ledger))?;
            debug!(ledger = %ledger, lock_id = %lock_id, action = %action, "Applying lock outcome");
            apply(&mut **guard, caller, action, *lock_id)
        });

        match outcome {
            Ok(()) => {
                for guard in guards.values_mut() {
                    guard.commit();
                }
                Ok(())
            }
            Err(err) => {
                error!(caller = %caller, action = %action, error = %err, "Reverting every ledger");
                for guard in guards.values_mut() {
                    guard.rollback();
                }
                Err(err)
            }
        }
    }

    /// Apply `action` to a single lock, leaving its ledger untouched on failure.
    pub fn apply_one(
        &self,
        caller: Address,
        action: LockAction,
        ledger: Address,
        lock_id: LockId,
    ) -> Result<()> {
        let handle = self.get(&ledger)?;
        let mut guard = handle.lock();
        guard.begin();
        match apply(&mut *guard, caller, action, lock_id) {
            Ok(()) => {
                guard.commit();
                Ok(())
            }
            Err(err) => {
                guard.rollback();
                Err(err)
            }
        }
    }
}

fn apply(
    ledger: &mut dyn LockableLedger,
    caller: Address,
    action: LockAction,
    lock_id: LockId,
) -> Result<()> {
    match action {
        LockAction::Settle => ledger.settle_lock(caller, lock_id),
        LockAction::Refund => ledger.refund_lock(caller, lock_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dvp_common::LockStatus;
    use dvp_ledger::{
        AccountLockRequest, ConfidentialAccountLedger, ConfidentialArithmetic, MockFheOracle,
    };

    struct Fixture {
        registry: LedgerRegistry,
        oracle: Arc<MockFheOracle>,
        first: Arc<Mutex<ConfidentialAccountLedger>>,
        second: Arc<Mutex<ConfidentialAccountLedger>>,
        bob: Address,
        atom: Address,
    }

    fn fixture() -> Fixture {
        let registry = LedgerRegistry::new();
        let oracle = Arc::new(MockFheOracle::new());
        let minter = Address::from_label("minter");
        let bob = Address::from_label("bob");
        let mut ledgers = Vec::new();
        for label in ["token-a", "token-b"] {
            let address = Address::from_label(label);
            let mut ledger = ConfidentialAccountLedger::new(address, minter, oracle.clone());
            let input = oracle.encrypt_input(100, address, minter);
            ledger.mint(minter, bob, &input).unwrap();
            ledgers.push(registry.register_typed(ledger));
        }
        let second = ledgers.pop().unwrap();
        let first = ledgers.pop().unwrap();
        Fixture {
            registry,
            oracle,
            first,
            second,
            bob,
            atom: Address::from_label("atom"),
        }
    }

    impl Fixture {
        fn lock(&self, ledger: &Arc<Mutex<ConfidentialAccountLedger>>, id: u8) -> (Address, LockId) {
            let mut ledger = ledger.lock();
            let address = ledger.address();
            let request = AccountLockRequest {
                lock_id: LockId::from_bytes([id; 32]),
                receiver: Address::from_label("alice"),
                amount: self.oracle.encrypt_input(10, address, self.bob),
                approver: None,
                data: vec![],
            };
            let view = ledger.create_lock(self.bob, request, self.atom).unwrap();
            (address, view.lock_id)
        }
    }

    #[test]
    fn test_apply_all_settles_every_lock() {
        let f = fixture();
        let a = f.lock(&f.first, 1);
        let b = f.lock(&f.second, 2);
        assert_eq!(f.registry.len(), 2);

        f.registry.apply_all(f.atom, LockAction::Settle, &[a, b]).unwrap();
        assert_eq!(f.first.lock().lock_status(&a.1), Some(LockStatus::Settled));
        assert_eq!(f.second.lock().lock_status(&b.1), Some(LockStatus::Settled));
    }

    #[test]
    fn test_apply_all_reverts_on_any_failure() {
        let f = fixture();
        let a = f.lock(&f.first, 1);
        let missing = (f.second.lock().address(), LockId::from_bytes([9; 32]));
        let journal_len = f.first.lock().journal().len();

        let err = f
            .registry
            .apply_all(f.atom, LockAction::Settle, &[a, missing])
            .unwrap_err();
        assert!(matches!(err, DvpError::UnauthorizedDelegate { .. }));
        assert_eq!(f.first.lock().lock_status(&a.1), Some(LockStatus::Delegated));
        assert_eq!(f.first.lock().journal().len(), journal_len);
    }

    #[test]
    fn test_unknown_ledger() {
        let f = fixture();
        let stranger = Address::from_label("nowhere");
        let err = f
            .registry
            .apply_one(f.atom, LockAction::Refund, stranger, LockId::from_bytes([1; 32]))
            .unwrap_err();
        assert_eq!(err, DvpError::UnknownLedger(stranger));
        assert!(!f.registry.contains(&stranger));
    }
}
