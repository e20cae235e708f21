//! Simulation scenarios.

use serde::{Deserialize, Serialize};

use dvp_coordinator::{AtomStatus, TradeSetup};

use crate::party::Role;

/// A simulation scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name.
    pub name: String,
    /// Description.
    pub description: String,
    /// How the atom address is agreed.
    pub setup: TradeSetup,
    /// Steps in the scenario.
    pub steps: Vec<ScenarioStep>,
}

/// A step in a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScenarioStep {
    /// Fix the atom address for the trade.
    BeginTrade,
    /// Seller locks UTXO value with settle and refund outcomes.
    SellerLocks,
    /// Buyer locks confidential payment.
    BuyerLocks,
    /// Make the atom ready for approvals.
    FinishSetup,
    Approve { by: Role },
    Settle { by: Role },
    Cancel { by: Role },
    /// Settle and cancel from concurrent tasks.
    Race,
    /// Assert a condition.
    Assert { condition: AssertCondition },
}

/// Conditions that can be asserted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AssertCondition {
    AtomStatus(AtomStatus),
    /// One of the two terminal statuses.
    AtomFinal,
    ConfidentialBalance { party: Role, amount: u64 },
    UtxoBalance { party: Role, amount: u64 },
    RollbackFailures(usize),
}

/// Amounts exchanged in a trade.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TradeTerms {
    /// Seller's locked UTXO value.
    pub delivery: u64,
    /// Part of the delivery paid to the buyer; the rest is change.
    pub price: u64,
    /// Confidential amount the buyer pays.
    pub payment: u64,
    /// Buyer's starting confidential balance.
    pub buyer_funds: u64,
}

impl Default for TradeTerms {
    fn default() -> Self {
        Self {
            delivery: 100,
            price: 75,
            payment: 50,
            buyer_funds: 1000,
        }
    }
}

pub const SCENARIOS: [&str; 5] = [
    "propose-accept",
    "offer-accept",
    "direct-initialize",
    "counterparty-abandons",
    "settle-race",
];

impl Scenario {
    /// Load a scenario by name.
    pub fn load(name: &str, terms: &TradeTerms) -> anyhow::Result<Self> {
        match name {
            "propose-accept" => Ok(Self::happy_path(name, TradeSetup::ProposeFirst, terms)),
            "offer-accept" => Ok(Self::happy_path(name, TradeSetup::OfferFirst, terms)),
            "direct-initialize" => Ok(Self::happy_path(name, TradeSetup::DirectInitialize, terms)),
            "counterparty-abandons" => Ok(Self::counterparty_abandons(terms)),
            "settle-race" => Ok(Self::settle_race()),
            _ => Err(anyhow::anyhow!(
                "Unknown scenario: {} (expected one of {})",
                name,
                SCENARIOS.join(", ")
            )),
        }
    }

    /// Both parties lock, approve, and the buyer settles.
    fn happy_path(name: &str, setup: TradeSetup, terms: &TradeTerms) -> Self {
        Self {
            name: name.to_string(),
            description: format!("Both legs lock and settle ({setup:?})"),
            setup,
            steps: vec![
                ScenarioStep::BeginTrade,
                ScenarioStep::SellerLocks,
                ScenarioStep::BuyerLocks,
                ScenarioStep::FinishSetup,
                ScenarioStep::Approve { by: Role::Buyer },
                ScenarioStep::Approve { by: Role::Seller },
                ScenarioStep::Settle { by: Role::Buyer },
                ScenarioStep::Assert {
                    condition: AssertCondition::AtomStatus(AtomStatus::Settled),
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::ConfidentialBalance {
                        party: Role::Seller,
                        amount: terms.payment,
                    },
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::ConfidentialBalance {
                        party: Role::Buyer,
                        amount: terms.buyer_funds.saturating_sub(terms.payment),
                    },
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::UtxoBalance {
                        party: Role::Buyer,
                        amount: terms.price,
                    },
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::UtxoBalance {
                        party: Role::Seller,
                        amount: terms.delivery - terms.price,
                    },
                },
            ],
        }
    }

    /// The seller locks, the buyer never does, the seller cancels.
    fn counterparty_abandons(terms: &TradeTerms) -> Self {
        Self {
            name: "counterparty-abandons".to_string(),
            description: "Buyer never locks; seller cancels and recovers".to_string(),
            setup: TradeSetup::ProposeFirst,
            steps: vec![
                ScenarioStep::BeginTrade,
                ScenarioStep::FinishSetup,
                ScenarioStep::SellerLocks,
                ScenarioStep::Cancel { by: Role::Seller },
                ScenarioStep::Assert {
                    condition: AssertCondition::AtomStatus(AtomStatus::Cancelled),
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::RollbackFailures(1),
                },
                ScenarioStep::Assert {
                    condition: AssertCondition::UtxoBalance {
                        party: Role::Seller,
                        amount: terms.delivery,
                    },
                },
            ],
        }
    }

    /// Both approve, then settle and cancel race from separate tasks.
    fn settle_race() -> Self {
        Self {
            name: "settle-race".to_string(),
            description: "Settle and cancel race; the first to run wins".to_string(),
            setup: TradeSetup::OfferFirst,
            steps: vec![
                ScenarioStep::BeginTrade,
                ScenarioStep::BuyerLocks,
                ScenarioStep::SellerLocks,
                ScenarioStep::FinishSetup,
                ScenarioStep::Approve { by: Role::Seller },
                ScenarioStep::Approve { by: Role::Buyer },
                ScenarioStep::Race,
                ScenarioStep::Assert {
                    condition: AssertCondition::AtomFinal,
                },
            ],
        }
    }
}
