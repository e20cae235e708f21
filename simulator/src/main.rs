//! DvP Atom Simulator
//!
//! Runs trades between a UTXO seller and a confidential-balance buyer
//! through a settlement atom.

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod controller;
mod metrics;
mod party;
mod scenario;

use controller::SimulationController;
use dvp_coordinator::CoordinatorConfig;
use scenario::{Scenario, TradeTerms, SCENARIOS};

/// DvP Atom Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "DvP atom trade simulation environment")]
struct Args {
    /// Scenario to run
    #[arg(short, long, default_value = "propose-accept")]
    scenario: String,

    /// List scenarios and exit
    #[arg(long)]
    list: bool,

    /// Times to run the scenario
    #[arg(short, long, default_value = "1")]
    repeat: u32,

    /// Random seed for reproducible lock ids
    #[arg(long)]
    seed: Option<u64>,

    /// Seller's locked UTXO value
    #[arg(long, default_value = "100")]
    delivery: u64,

    /// Part of the delivery paid to the buyer
    #[arg(long, default_value = "75")]
    price: u64,

    /// Confidential amount the buyer pays
    #[arg(long, default_value = "50")]
    payment: u64,

    /// Buyer's starting confidential balance
    #[arg(long, default_value = "1000")]
    buyer_funds: u64,

    /// JSON logs and report
    #[arg(long)]
    json: bool,

    /// Print coordinator metrics in Prometheus format
    #[arg(long)]
    prometheus: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = CoordinatorConfig::from_env();
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
    );
    if args.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    if args.list {
        for name in SCENARIOS {
            println!("{name}");
        }
        return Ok(());
    }

    let terms = TradeTerms {
        delivery: args.delivery,
        price: args.price,
        payment: args.payment,
        buyer_funds: args.buyer_funds,
    };
    if terms.price == 0 || terms.price > terms.delivery {
        anyhow::bail!("price must be between 1 and the delivery ({})", terms.delivery);
    }
    if terms.payment == 0 || terms.payment > terms.buyer_funds {
        anyhow::bail!("payment must be between 1 and the buyer's funds ({})", terms.buyer_funds);
    }

    let scenario = Scenario::load(&args.scenario, &terms)?;
    let mut controller = SimulationController::new(config, terms, args.seed)?;
    info!(run_id = %controller.run_id(), scenario = %scenario.name, "Starting DvP Atom Simulator");

    for _ in 0..args.repeat {
        let report = controller.run_scenario(&scenario).await?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        } else {
            info!(
                atom = ?report.atom,
                status = ?report.status,
                seller_confidential = report.seller_confidential,
                buyer_confidential = report.buyer_confidential,
                seller_utxo = report.seller_utxo,
                buyer_utxo = report.buyer_utxo,
                events = ?report.events,
                "Trade finished"
            );
        }
    }

    // Print metrics
    let metrics = controller.get_metrics();
    info!("Simulation complete");
    info!("Total trades: {}", metrics.total_trades);
    info!("Settled: {}", metrics.settled_trades);
    info!("Cancelled: {}", metrics.cancelled_trades);
    info!("Reverted calls: {}", metrics.reverted_calls);
    info!(
        "Latency: avg {}µs, p50 {}µs, p99 {}µs",
        metrics.average_latency_us(),
        metrics.p50_latency_us(),
        metrics.p99_latency_us()
    );
    info!("Completion rate: {:.2}", metrics.completion_rate());
    if args.json {
        println!("{}", serde_json::to_string_pretty(&metrics)?);
        println!("{}", serde_json::to_string_pretty(&controller.coordinator_metrics())?);
    }
    if args.prometheus {
        print!("{}", controller.prometheus());
    }

    Ok(())
}
