mod common;

use common::{Market, ALICE_LOCK, BOB_LOCK};

use dvp_common::{DvpError, LockStatus};
use dvp_coordinator::{AtomEvent, AtomStatus, TradeSetup};
use dvp_ledger::LockableLedger;

#[test]
fn counterparty_abandons_and_alice_recovers() {
    let market = Market::new();
    let alice = market.alice.address();
    let atom = market
        .coordinator
        .begin_trade(TradeSetup::ProposeFirst, alice, market.operations())
        .unwrap()
        .finish(market.coordinator.factory())
        .unwrap();
    let leg = market.alice_locks(atom.address()).unwrap();

    // Bob never locks
    let events = atom.cancel(alice).unwrap();
    assert_eq!(atom.status(), AtomStatus::Cancelled);
    assert_eq!(events.len(), 3);

    match &events[0] {
        AtomEvent::OperationRolledBack { index, lock_id, .. } => {
            assert_eq!(*index, 0);
            assert_eq!(*lock_id, ALICE_LOCK);
        }
        other => panic!("unexpected event {other:?}"),
    }
    match &events[1] {
        AtomEvent::OperationRollbackFailed { index, lock_id, .. } => {
            assert_eq!(*index, 1);
            assert_eq!(*lock_id, BOB_LOCK);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(
        events[1].revert_reason().as_deref(),
        Some("Only the delegate of the lock can refund it")
    );
    assert!(matches!(events[2], AtomEvent::AtomCancelled { .. }));

    // the refund outcome replaced the locked UTXO with a fresh one for Alice
    {
        let zeto = market.zeto.lock();
        assert_eq!(zeto.lock_status(&ALICE_LOCK), Some(LockStatus::RolledBack));
        assert!(!zeto.is_locked(&leg.locked.commitment()));
        assert_eq!(zeto.commitments().locked_count(), 0);
        assert!(zeto.commitments().contains(&leg.refund.commitment()));
        assert!(!zeto.commitments().contains(&leg.to_bob.commitment()));
    }
    market.spend(&market.alice, &leg.refund).unwrap();

    let metrics = market.coordinator.metrics().snapshot();
    assert_eq!(metrics.rollbacks_succeeded, 1);
    assert_eq!(metrics.rollbacks_failed, 1);
    assert_eq!(metrics.cancellations, 1);
    assert_eq!(metrics.atoms_open, 0);
}

#[test]
fn cancel_refunds_both_legs() {
    let market = Market::new();
    let atom = market
        .coordinator
        .factory()
        .create(market.alice.address(), market.operations())
        .unwrap();
    market.alice_locks(atom.address()).unwrap();
    market.bob_locks(atom.address()).unwrap();
    atom.approve_operation(market.bob.address(), 1).unwrap();
    assert_eq!(market.balance(&market.bob), 950);

    let events = atom.cancel(market.bob.address()).unwrap();
    let rolled_back = events
        .iter()
        .filter(|e| matches!(e, AtomEvent::OperationRolledBack { .. }))
        .count();
    assert_eq!(rolled_back, 2);
    assert_eq!(market.balance(&market.bob), 1000);
    assert_eq!(market.balance(&market.alice), 0);
    assert_eq!(market.token.lock().lock_status(&BOB_LOCK), Some(LockStatus::RolledBack));

    // a cancelled atom can neither settle nor approve
    assert_eq!(atom.settle(market.alice.address()), Err(DvpError::AtomCancelled));
    assert_eq!(
        atom.approve_operation(market.alice.address(), 0),
        Err(DvpError::AtomCancelled)
    );
}

#[test]
fn outsiders_cannot_cancel() {
    let market = Market::new();
    let atom = market
        .coordinator
        .factory()
        .create(market.alice.address(), market.operations())
        .unwrap();
    market.alice_locks(atom.address()).unwrap();

    let mallory = dvp_common::Address::from_label("mallory");
    assert_eq!(atom.cancel(mallory), Err(DvpError::NotParticipant(mallory)));
    assert_eq!(market.zeto.lock().lock_status(&ALICE_LOCK), Some(LockStatus::Delegated));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn settle_and_cancel_race_has_one_winner() {
    for _ in 0..8 {
        let market = Market::new();
        let atom = market
            .coordinator
            .factory()
            .create(market.alice.address(), market.operations())
            .unwrap();
        market.alice_locks(atom.address()).unwrap();
        market.bob_locks(atom.address()).unwrap();
        atom.approve_operation(market.alice.address(), 0).unwrap();
        atom.approve_operation(market.bob.address(), 1).unwrap();

        let settler = {
            let atom = atom.clone();
            let bob = market.bob.address();
            tokio::spawn(async move { atom.settle(bob) })
        };
        let canceller = {
            let atom = atom.clone();
            let alice = market.alice.address();
            tokio::spawn(async move { atom.cancel(alice).map(|_| ()) })
        };
        let settled = settler.await.unwrap();
        let cancelled = canceller.await.unwrap();

        match atom.status() {
            AtomStatus::Settled => {
                assert!(settled.is_ok());
                assert_eq!(cancelled, Err(DvpError::AtomSettled));
                assert_eq!(market.balance(&market.alice), 50);
            }
            AtomStatus::Cancelled => {
                assert_eq!(settled, Err(DvpError::AtomCancelled));
                assert!(cancelled.is_ok());
                assert_eq!(market.balance(&market.bob), 1000);
            }
            other => panic!("race left the atom {other:?}"),
        }
    }
}
