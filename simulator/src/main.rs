//! Wallet Ledger Simulator
//!
//! Drives concurrent top-ups, payments and transfers against the ledger and
//! checks that every account still reconciles afterwards.

use std::sync::Arc;

use clap::Parser;
use rust_decimal::Decimal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wallet_ledger::{AccountStore, InMemoryAccountStore, LedgerConfig, LedgerEngine, PgAccountStore};

mod controller;
mod metrics;
mod scenario;

use controller::{SimulationController, SimulationReport, SimulationSettings};
use scenario::Scenario;

/// Wallet Ledger Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "Concurrent load generator and invariant checker for the wallet ledger")]
struct Args {
    /// Number of wallet accounts to open
    #[arg(short, long, default_value = "10")]
    accounts: usize,

    /// Number of concurrent workers
    #[arg(short, long, default_value = "8")]
    workers: usize,

    /// Total operations across all workers
    #[arg(short, long, default_value = "10000")]
    operations: usize,

    /// Scenario to run (random, hot-account, crossfire)
    #[arg(short, long, default_value = "random")]
    scenario: String,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Balance each account starts with
    #[arg(long, default_value = "1000")]
    initial_balance: Decimal,

    /// PostgreSQL URL; the in-memory store is used when absent
    #[arg(long, env = "WALLET_DATABASE_URL")]
    database_url: Option<String>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so a JSON report on stdout stays parseable.
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let mut config = LedgerConfig::from_env();
    config.store.database_url = args.database_url.clone();
    config.validate()?;

    let scenario = Scenario::load(&args.scenario)?;
    let settings = SimulationSettings {
        accounts: args.accounts,
        workers: args.workers,
        operations: args.operations,
        initial_balance: args.initial_balance,
        seed: args.seed,
    };

    info!("Starting Wallet Ledger Simulator");
    info!("Accounts: {}", settings.accounts);
    info!("Workers: {}", settings.workers);

    let report = match &config.store.database_url {
        Some(_) => {
            let store = PgAccountStore::connect(&config.store).await?;
            store.migrate().await?;
            info!("Using PostgreSQL account store");
            simulate(store, config, settings, scenario).await?
        }
        None => {
            info!("Using in-memory account store");
            let store = InMemoryAccountStore::new(&config.store);
            simulate(store, config, settings, scenario).await?
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !report.is_healthy() {
        error!(
            inconsistent = report.inconsistent_accounts.len(),
            negative = report.negative_accounts.len(),
            total_balance = %report.total_balance,
            expected_total_balance = %report.expected_total_balance,
            "Ledger invariants violated"
        );
        anyhow::bail!("ledger invariants violated");
    }

    Ok(())
}

async fn simulate<S: AccountStore + 'static>(
    store: S,
    config: LedgerConfig,
    settings: SimulationSettings,
    scenario: Scenario,
) -> anyhow::Result<SimulationReport> {
    let engine = Arc::new(LedgerEngine::new(Arc::new(store), config));
    let mut controller = SimulationController::new(engine, settings, scenario);
    controller.run_to_completion().await
}

fn print_report(report: &SimulationReport) {
    let metrics = &report.metrics;
    info!("Simulation complete");
    info!("Scenario: {} (seed {})", report.scenario, report.seed);
    info!("Total operations: {}", metrics.total_operations);
    info!("Successful: {}", metrics.successful_operations);
    info!("Rejected: {}", metrics.rejected_operations);
    info!("Failed: {}", metrics.failed_operations);
    info!("Throughput: {:.0} ops/s", report.throughput);
    info!(
        "Latency: avg {}us, p50 {}us, p99 {}us",
        metrics.average_latency_us, metrics.p50_latency_us, metrics.p99_latency_us
    );
    info!(
        "Total balance: {} (expected {})",
        report.total_balance, report.expected_total_balance
    );
}
