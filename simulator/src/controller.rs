//! Simulation controller.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, bail, Context};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use dvp_common::{Address, Digest, LockId, LockOutcome, LockedValue};
use dvp_coordinator::{
    Atom, AtomEvent, AtomOperation, AtomStatus, Coordinator, CoordinatorConfig, MetricsSnapshot,
    PendingTrade,
};
use dvp_crypto::{open_disclosure, seal_disclosure, DigestProver, DigestVerifier, Statement, Utxo};
use dvp_ledger::{
    AccountLockRequest, ConfidentialAccountLedger, ConfidentialArithmetic, LockCommitment,
    LockableLedger, MockFheOracle, UtxoLedger, UtxoLockRequest, UtxoTransition,
};

use crate::metrics::SimulationMetrics;
use crate::party::{Party, PartyFactory, Role};
use crate::scenario::{AssertCondition, Scenario, ScenarioStep, TradeTerms};

const PROOF_DOMAIN: &str = "dvp-simulator";

/// Outputs of the seller's lock, kept to update wallets afterwards.
struct SellerLeg {
    to_buyer: Utxo,
    change: Option<Utxo>,
    refund: Utxo,
}

/// Ledgers, parties and atom of one trade.
struct Trade {
    zeto: Arc<Mutex<UtxoLedger>>,
    token: Arc<Mutex<ConfidentialAccountLedger>>,
    seller: Party,
    buyer: Party,
    seller_lock: LockId,
    buyer_lock: LockId,
    pending: Option<PendingTrade>,
    atom: Option<Arc<Atom>>,
    seller_leg: Option<SellerLeg>,
    rollback_failures: usize,
}

impl Trade {
    fn party(&self, role: Role) -> &Party {
        match role {
            Role::Seller => &self.seller,
            Role::Buyer => &self.buyer,
        }
    }

    fn atom(&self) -> anyhow::Result<Arc<Atom>> {
        self.atom.clone().ok_or_else(|| anyhow!("atom not ready"))
    }

    fn operations(&self) -> Vec<AtomOperation> {
        vec![
            AtomOperation::new(self.zeto.lock().address(), self.seller_lock, self.seller.address()),
            AtomOperation::new(self.token.lock().address(), self.buyer_lock, self.buyer.address()),
        ]
    }

    fn settled(&mut self) {
        if let Some(leg) = &self.seller_leg {
            self.buyer.receive(leg.to_buyer);
            if let Some(change) = leg.change {
                self.seller.receive(change);
            }
        }
    }

    fn cancelled(&mut self, events: &[AtomEvent]) {
        for event in events {
            match event {
                AtomEvent::OperationRolledBack { index: 0, .. } => {
                    if let Some(leg) = &self.seller_leg {
                        self.seller.receive(leg.refund);
                    }
                }
                AtomEvent::OperationRollbackFailed { .. } => self.rollback_failures += 1,
                _ => {}
            }
        }
    }
}

/// Outcome of one scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct TradeReport {
    pub run_id: Uuid,
    pub scenario: String,
    pub atom: Option<Address>,
    pub status: Option<AtomStatus>,
    pub seller_confidential: u64,
    pub buyer_confidential: u64,
    pub seller_utxo: u64,
    pub buyer_utxo: u64,
    pub events: Vec<String>,
    pub rollback_failures: usize,
    pub elapsed_us: u64,
}

/// Controls the simulation.
pub struct SimulationController {
    run_id: Uuid,
    terms: TradeTerms,
    rng: StdRng,
    coordinator: Coordinator,
    prover: DigestProver,
    oracle: Arc<MockFheOracle>,
    minter: Address,
    runs: u64,
    metrics: SimulationMetrics,
}

impl SimulationController {
    /// Create a new simulation controller.
    pub fn new(
        config: CoordinatorConfig,
        terms: TradeTerms,
        seed: Option<u64>,
    ) -> anyhow::Result<Self> {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let coordinator = Coordinator::new(config).context("invalid coordinator configuration")?;

        Ok(Self {
            run_id: Uuid::new_v4(),
            terms,
            rng,
            coordinator,
            prover: DigestProver::new(PROOF_DOMAIN),
            oracle: Arc::new(MockFheOracle::new()),
            minter: Address::from_label("minter"),
            runs: 0,
            metrics: SimulationMetrics::new(),
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Fresh ledgers for one trade, with the seller and buyer funded.
    fn open_trade(&mut self) -> anyhow::Result<Trade> {
        self.runs += 1;
        let zeto = self.coordinator.add_utxo_ledger(
            Address::from_label(&format!("zeto-{}", self.runs)),
            self.minter,
            Arc::new(DigestVerifier::new(PROOF_DOMAIN)),
        );
        let token_address = Address::from_label(&format!("fhe-erc20-{}", self.runs));
        let token =
            self.coordinator
                .add_account_ledger(token_address, self.minter, self.oracle.clone());

        let (mut seller, buyer) = PartyFactory::create_pair();
        let funds = Utxo::new(self.terms.delivery, seller.owner_pk());
        zeto.lock().mint(self.minter, &[funds.commitment()])?;
        seller.receive(funds);

        let input = self
            .oracle
            .encrypt_input(self.terms.buyer_funds, token_address, self.minter);
        token.lock().mint(self.minter, buyer.address(), &input)?;
        info!(
            seller = %seller.name,
            buyer = %buyer.name,
            delivery = self.terms.delivery,
            buyer_funds = self.terms.buyer_funds,
            "Trade funded"
        );

        Ok(Trade {
            zeto,
            token,
            seller,
            buyer,
            seller_lock: LockId::from_bytes(self.rng.gen()),
            buyer_lock: LockId::from_bytes(self.rng.gen()),
            pending: None,
            atom: None,
            seller_leg: None,
            rollback_failures: 0,
        })
    }

    /// Run a scenario.
    pub async fn run_scenario(&mut self, scenario: &Scenario) -> anyhow::Result<TradeReport> {
        info!("Running scenario: {} - {}", scenario.name, scenario.description);
        let started = Instant::now();
        let mut trade = self.open_trade()?;

        for step in &scenario.steps {
            self.execute_step(scenario, &mut trade, step)
                .await
                .with_context(|| format!("step {step:?} of {}", scenario.name))?;
        }

        let elapsed_us = started.elapsed().as_micros() as u64;
        let status = trade.atom.as_ref().map(|a| a.status());
        match status {
            Some(AtomStatus::Settled) => self.metrics.record_settled(elapsed_us),
            Some(AtomStatus::Cancelled) => self.metrics.record_cancelled(elapsed_us),
            _ => self.metrics.record_failure(),
        }

        let atom = trade.atom.as_ref().map(|a| a.address());
        let seller_confidential = self.confidential_balance(&trade, Role::Seller)?;
        let buyer_confidential = self.confidential_balance(&trade, Role::Buyer)?;
        let seller_utxo = trade.seller.utxo_balance(&trade.zeto.lock());
        let buyer_utxo = trade.buyer.utxo_balance(&trade.zeto.lock());
        let report = TradeReport {
            run_id: self.run_id,
            scenario: scenario.name.clone(),
            atom,
            status,
            seller_confidential,
            buyer_confidential,
            seller_utxo,
            buyer_utxo,
            events: trade
                .atom
                .as_ref()
                .map(|a| a.events().iter().map(|e| e.name().to_string()).collect())
                .unwrap_or_default(),
            rollback_failures: trade.rollback_failures,
            elapsed_us,
        };
        Ok(report)
    }

    /// Execute a single scenario step.
    async fn execute_step(
        &mut self,
        scenario: &Scenario,
        trade: &mut Trade,
        step: &ScenarioStep,
    ) -> anyhow::Result<()> {
        match step {
            ScenarioStep::BeginTrade => {
                let pending = self.coordinator.begin_trade(
                    scenario.setup,
                    trade.seller.address(),
                    trade.operations(),
                )?;
                info!(delegate = %pending.delegate(), "Atom address agreed");
                if let Ok(atom) = self.coordinator.atom(&pending.delegate()) {
                    trade.atom = Some(atom);
                }
                trade.pending = Some(pending);
            }
            ScenarioStep::SellerLocks => self.seller_locks(trade)?,
            ScenarioStep::BuyerLocks => self.buyer_locks(trade)?,
            ScenarioStep::FinishSetup => {
                let pending = trade
                    .pending
                    .take()
                    .ok_or_else(|| anyhow!("trade not started"))?;
                trade.atom = Some(pending.finish(self.coordinator.factory())?);
            }
            ScenarioStep::Approve { by } => {
                let index = match by {
                    Role::Seller => 0,
                    Role::Buyer => 1,
                };
                trade
                    .atom()?
                    .approve_operation(trade.party(*by).address(), index)?;
            }
            ScenarioStep::Settle { by } => {
                match trade.atom()?.settle(trade.party(*by).address()) {
                    Ok(()) => trade.settled(),
                    Err(err) => {
                        self.metrics.record_revert();
                        warn!(error = %err, "Settle reverted");
                    }
                }
            }
            ScenarioStep::Cancel { by } => {
                match trade.atom()?.cancel(trade.party(*by).address()) {
                    Ok(events) => trade.cancelled(&events),
                    Err(err) => {
                        self.metrics.record_revert();
                        warn!(error = %err, "Cancel reverted");
                    }
                }
            }
            ScenarioStep::Race => self.race(trade).await?,
            ScenarioStep::Assert { condition } => self.check(trade, condition)?,
        }

        Ok(())
    }

    fn seller_locks(&self, trade: &mut Trade) -> anyhow::Result<()> {
        let delegate = trade
            .pending
            .as_ref()
            .map(|p| p.delegate())
            .or_else(|| trade.atom.as_ref().map(|a| a.address()))
            .ok_or_else(|| anyhow!("trade not started"))?;
        let seller = &trade.seller;
        let buyer = &trade.buyer;
        let mut zeto = trade.zeto.lock();
        let funds = seller
            .find_spendable(&zeto, self.terms.delivery)
            .ok_or_else(|| anyhow!("seller holds no UTXO worth {}", self.terms.delivery))?;

        let locked = Utxo::new(funds.value, seller.owner_pk());
        let to_buyer = Utxo::new(self.terms.price, buyer.owner_pk());
        let change = (funds.value > self.terms.price)
            .then(|| Utxo::new(funds.value - self.terms.price, seller.owner_pk()));
        let refund = Utxo::new(funds.value, seller.owner_pk());

        let mut settle_outputs = vec![to_buyer];
        settle_outputs.extend(change);
        let commitment = LockCommitment {
            delegate,
            settle: self.outcome(trade.seller_lock, &locked, &settle_outputs, delegate),
            refund: self.outcome(trade.seller_lock, &locked, &[refund], delegate),
        };

        let nullifier = funds.nullifier(&seller.keys.spending_secret());
        let root = zeto.root();
        let statement = Statement::Lock {
            root,
            nullifiers: vec![nullifier],
            outputs: vec![],
            locked_outputs: vec![locked.commitment()],
            owner: seller.address(),
        };
        let request = UtxoLockRequest {
            lock_id: trade.seller_lock,
            root,
            nullifiers: vec![nullifier],
            outputs: vec![],
            locked_outputs: vec![locked.commitment()],
            proof: self.prover.prove(&statement),
            approver: None,
            data: vec![],
        };
        let view = zeto.create_lock(seller.address(), request, commitment)?;

        // the buyer opens the disclosed output and checks it against the lock
        let sealed = seal_disclosure(&seller.keys, &buyer.keys.exchange_public(), &to_buyer)?;
        let promised = zeto
            .lock(&view.lock_id)
            .and_then(|record| record.settle.as_ref())
            .ok_or_else(|| anyhow!("lock has no settle outcome"))?;
        if view.settle_hash != Some(promised.hash()) {
            bail!("settle outcome does not match the published hash");
        }
        let opened = open_disclosure(
            &buyer.keys,
            &seller.keys.exchange_public(),
            &sealed,
            &promised.transition.outputs[0],
        )?;
        if opened.value != self.terms.price || opened.owner_pk != buyer.owner_pk() {
            bail!("disclosed output does not pay the buyer {}", self.terms.price);
        }
        drop(zeto);

        info!(lock_id = %view.lock_id, delegate = %delegate, "Seller locked");
        trade.seller_leg = Some(SellerLeg {
            to_buyer,
            change,
            refund,
        });
        Ok(())
    }

    fn outcome(
        &self,
        lock_id: LockId,
        locked: &Utxo,
        outputs: &[Utxo],
        delegate: Address,
    ) -> LockOutcome<UtxoTransition> {
        let outputs: Vec<Digest> = outputs.iter().map(Utxo::commitment).collect();
        let statement = Statement::LockedTransfer {
            lock_id,
            inputs: vec![locked.commitment()],
            outputs: outputs.clone(),
            delegate,
        };
        LockOutcome::new(UtxoTransition::new(outputs), self.prover.prove(&statement), vec![])
    }

    fn buyer_locks(&self, trade: &mut Trade) -> anyhow::Result<()> {
        let delegate = trade
            .pending
            .as_ref()
            .map(|p| p.delegate())
            .or_else(|| trade.atom.as_ref().map(|a| a.address()))
            .ok_or_else(|| anyhow!("trade not started"))?;
        let mut token = trade.token.lock();
        let request = AccountLockRequest {
            lock_id: trade.buyer_lock,
            receiver: trade.seller.address(),
            amount: self.oracle.encrypt_input(
                self.terms.payment,
                token.address(),
                trade.buyer.address(),
            ),
            approver: None,
            data: vec![],
        };
        let view = token.create_lock(trade.buyer.address(), request, delegate)?;

        // the seller checks the locked amount
        let LockedValue::Encrypted(handle) = view.locked else {
            bail!("account lock without an encrypted amount");
        };
        let locked = self.oracle.decrypt_for(&handle, trade.seller.address())?;
        if locked != self.terms.payment {
            bail!("buyer locked {locked}, expected {}", self.terms.payment);
        }
        info!(lock_id = %view.lock_id, delegate = %delegate, "Buyer locked");
        Ok(())
    }

    /// Settle and cancel from two tasks at once.
    async fn race(&mut self, trade: &mut Trade) -> anyhow::Result<()> {
        let atom = trade.atom()?;
        let settler = {
            let atom = atom.clone();
            let buyer = trade.buyer.address();
            tokio::spawn(async move { atom.settle(buyer) })
        };
        let canceller = {
            let atom = atom.clone();
            let seller = trade.seller.address();
            tokio::spawn(async move { atom.cancel(seller) })
        };
        let (settled, cancelled) = futures::future::join(settler, canceller).await;

        match (settled?, cancelled?) {
            (Ok(()), Err(err)) => {
                info!(loser = %err, "Settle won the race");
                self.metrics.record_revert();
                trade.settled();
            }
            (Err(err), Ok(events)) => {
                info!(loser = %err, "Cancel won the race");
                self.metrics.record_revert();
                trade.cancelled(&events);
            }
            (settled, cancelled) => {
                bail!("race ended with settle {settled:?} and cancel {cancelled:?}")
            }
        }
        Ok(())
    }

    fn check(&self, trade: &Trade, condition: &AssertCondition) -> anyhow::Result<()> {
        let status = trade.atom.as_ref().map(|a| a.status());
        let (holds, actual) = match condition {
            AssertCondition::AtomStatus(expected) => (status == Some(*expected), format!("{status:?}")),
            AssertCondition::AtomFinal => (
                status.map(|s| s.is_final()).unwrap_or(false),
                format!("{status:?}"),
            ),
            AssertCondition::ConfidentialBalance { party, amount } => {
                let balance = self.confidential_balance(trade, *party)?;
                (balance == *amount, balance.to_string())
            }
            AssertCondition::UtxoBalance { party, amount } => {
                let balance = trade.party(*party).utxo_balance(&trade.zeto.lock());
                (balance == *amount, balance.to_string())
            }
            AssertCondition::RollbackFailures(expected) => (
                trade.rollback_failures == *expected,
                trade.rollback_failures.to_string(),
            ),
        };
        if !holds {
            bail!("assertion {condition:?} failed: actual {actual}");
        }
        info!(?condition, "Assertion holds");
        Ok(())
    }

    fn confidential_balance(&self, trade: &Trade, role: Role) -> anyhow::Result<u64> {
        let who = trade.party(role).address();
        let handle = trade.token.lock().balance_of(&who);
        match handle {
            Some(handle) => Ok(self.oracle.decrypt_for(&handle, who)?),
            None => Ok(0),
        }
    }

    /// Get simulation metrics.
    pub fn get_metrics(&self) -> SimulationMetrics {
        self.metrics.clone()
    }

    pub fn coordinator_metrics(&self) -> MetricsSnapshot {
        self.coordinator.metrics().snapshot()
    }

    pub fn prometheus(&self) -> String {
        self.coordinator.metrics().to_prometheus()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::SCENARIOS;

    #[tokio::test]
    async fn test_every_scenario_passes() {
        let terms = TradeTerms::default();
        let mut controller =
            SimulationController::new(CoordinatorConfig::default(), terms, Some(7)).unwrap();
        for name in SCENARIOS {
            let scenario = Scenario::load(name, &terms).unwrap();
            let report = controller.run_scenario(&scenario).await.unwrap();
            assert!(report.status.is_some_and(|s| s.is_final()), "{name}");
        }
        let metrics = controller.get_metrics();
        assert_eq!(metrics.total_trades, SCENARIOS.len() as u64);
        assert_eq!(metrics.failed_trades, 0);
    }

    #[tokio::test]
    async fn test_abandoned_trade_report() {
        let terms = TradeTerms::default();
        let mut controller =
            SimulationController::new(CoordinatorConfig::default(), terms, None).unwrap();
        let scenario = Scenario::load("counterparty-abandons", &terms).unwrap();
        let report = controller.run_scenario(&scenario).await.unwrap();

        assert_eq!(report.status, Some(AtomStatus::Cancelled));
        assert_eq!(report.seller_utxo, 100);
        assert_eq!(report.buyer_confidential, 1000);
        assert_eq!(report.rollback_failures, 1);
        assert!(report.events.contains(&"OperationRollbackFailed".to_string()));
        assert_eq!(controller.coordinator_metrics().rollbacks_failed, 1);
    }
}
