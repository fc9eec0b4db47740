//! Simulation controller.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, error, info};

use wallet_common::AccountId;
use wallet_ledger::{AccountProfile, AccountStore, LedgerEngine};

use crate::metrics::{MetricsSummary, SimulationMetrics};
use crate::scenario::{Operation, Scenario};

/// Run parameters.
#[derive(Debug, Clone)]
pub struct SimulationSettings {
    pub accounts: usize,
    pub workers: usize,
    pub operations: usize,
    /// Balance each account is topped up with before the run.
    pub initial_balance: Decimal,
    pub seed: Option<u64>,
}

/// What a run did and whether the ledger held together.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub scenario: Scenario,
    pub accounts: usize,
    pub workers: usize,
    pub seed: u64,
    pub elapsed_ms: u64,
    pub throughput: f64,
    pub metrics: MetricsSummary,
    pub total_balance: Decimal,
    pub expected_total_balance: Decimal,
    /// Accounts whose balance disagrees with their records.
    pub inconsistent_accounts: Vec<AccountId>,
    pub negative_accounts: Vec<AccountId>,
}

impl SimulationReport {
    pub fn is_healthy(&self) -> bool {
        self.inconsistent_accounts.is_empty()
            && self.negative_accounts.is_empty()
            && self.total_balance == self.expected_total_balance
    }
}

/// Drives concurrent workers against one ledger engine.
pub struct SimulationController<S: AccountStore + 'static> {
    engine: Arc<LedgerEngine<S>>,
    settings: SimulationSettings,
    scenario: Scenario,
    /// Accounts opened for this run.
    accounts: Vec<AccountId>,
    /// Volume topped up while opening accounts.
    seeded: Decimal,
}

impl<S: AccountStore + 'static> SimulationController<S> {
    /// Create a new simulation controller.
    pub fn new(engine: Arc<LedgerEngine<S>>, settings: SimulationSettings, scenario: Scenario) -> Self {
        Self {
            engine,
            settings,
            scenario,
            accounts: Vec::new(),
            seeded: Decimal::ZERO,
        }
    }

    /// Open and fund the run's accounts.
    pub async fn initialize(&mut self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.settings.accounts >= self.scenario.min_accounts(),
            "Scenario {} needs at least {} accounts",
            self.scenario,
            self.scenario.min_accounts()
        );
        anyhow::ensure!(self.settings.workers > 0, "At least one worker is required");

        info!("Initializing simulation with {} accounts", self.settings.accounts);

        // Phone numbers are unique per store, and a database outlives a run.
        let run_tag = chrono::Utc::now().timestamp_millis();

        for i in 0..self.settings.accounts {
            let profile = AccountProfile::new(
                "Simulated",
                format!("Wallet {}", i + 1),
                format!("sim-{run_tag}-{i}"),
                "Simulation",
            );
            let account = self.engine.open_account(profile).await?;

            if self.settings.initial_balance > Decimal::ZERO {
                self.engine
                    .top_up(account.id, self.settings.initial_balance)
                    .await?;
                self.seeded += self.settings.initial_balance;
            }
            self.accounts.push(account.id);
        }

        Ok(())
    }

    /// Run the workload across all workers and merge their metrics.
    pub async fn run(&self, seed: u64) -> anyhow::Result<SimulationMetrics> {
        info!(
            "Running scenario: {} - {}",
            self.scenario,
            self.scenario.description()
        );

        let accounts = Arc::new(self.accounts.clone());
        let workers = self.settings.workers;
        let per_worker = self.settings.operations / workers;
        let remainder = self.settings.operations % workers;

        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let engine = self.engine.clone();
                let accounts = accounts.clone();
                let scenario = self.scenario;
                let operations = per_worker + usize::from(worker < remainder);
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(worker as u64));

                tokio::spawn(async move {
                    let mut metrics = SimulationMetrics::new();
                    for _ in 0..operations {
                        let operation = scenario.next_operation(&mut rng, &accounts);
                        execute(&engine, &operation, &mut metrics).await;
                    }
                    metrics
                })
            })
            .collect();

        let mut metrics = SimulationMetrics::new();
        for handle in join_all(handles).await {
            metrics.merge(handle?);
        }

        Ok(metrics)
    }

    /// Reconcile every account and compare the total against the money flows.
    pub async fn verify(
        &self,
        metrics: &SimulationMetrics,
        seed: u64,
        elapsed_secs: f64,
    ) -> anyhow::Result<SimulationReport> {
        let mut total_balance = Decimal::ZERO;
        let mut inconsistent_accounts = Vec::new();
        let mut negative_accounts = Vec::new();

        for id in &self.accounts {
            let reconciliation = self.engine.reconcile(*id).await?;
            if !reconciliation.is_consistent() {
                error!(
                    account = %id,
                    discrepancy = %reconciliation.discrepancy(),
                    "Account does not reconcile"
                );
                inconsistent_accounts.push(*id);
            }
            if reconciliation.balance < Decimal::ZERO {
                negative_accounts.push(*id);
            }
            total_balance += reconciliation.balance;
        }

        Ok(SimulationReport {
            scenario: self.scenario,
            accounts: self.accounts.len(),
            workers: self.settings.workers,
            seed,
            elapsed_ms: (elapsed_secs * 1000.0) as u64,
            throughput: metrics.throughput(elapsed_secs),
            metrics: metrics.summary(),
            total_balance,
            expected_total_balance: self.seeded + metrics.expected_total_balance(),
            inconsistent_accounts,
            negative_accounts,
        })
    }

    /// Initialize, run and verify.
    pub async fn run_to_completion(&mut self) -> anyhow::Result<SimulationReport> {
        let seed = self.settings.seed.unwrap_or_else(rand::random);
        self.initialize().await?;

        let start = Instant::now();
        let metrics = self.run(seed).await?;
        let elapsed = start.elapsed().as_secs_f64();

        self.verify(&metrics, seed, elapsed).await
    }
}

/// Submit one operation and record its outcome.
async fn execute<S: AccountStore>(
    engine: &LedgerEngine<S>,
    operation: &Operation,
    metrics: &mut SimulationMetrics,
) {
    let start = Instant::now();
    let outcome = match operation {
        Operation::TopUp { account, amount } => {
            engine.top_up(*account, *amount).await.map(|_| *amount)
        }
        Operation::Payment { account, amount } => engine
            .payment(*account, *amount, "Simulated payment")
            .await
            .map(|_| *amount),
        Operation::Transfer {
            sender,
            recipient,
            amount,
        } => engine
            .transfer(*sender, *recipient, *amount, "Simulated transfer")
            .await
            .map(|_| *amount),
    };
    let latency_us = start.elapsed().as_micros() as u64;

    match outcome {
        Ok(amount) => match operation {
            Operation::TopUp { .. } => metrics.record_top_up(amount, latency_us),
            Operation::Payment { .. } => metrics.record_payment(amount, latency_us),
            Operation::Transfer { .. } => metrics.record_transfer(amount, latency_us),
        },
        Err(err) if err.is_rejection() => metrics.record_rejection(latency_us),
        Err(err) => {
            debug!(operation = operation.name(), error = %err, "Operation failed");
            metrics.record_failure();
        }
    }
}
