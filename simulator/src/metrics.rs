//! Simulation metrics.

use std::collections::VecDeque;

use rust_decimal::Decimal;
use serde::Serialize;

/// Outcome counters, money flows and latency samples for a run.
#[derive(Debug, Clone)]
pub struct SimulationMetrics {
    /// Total operations attempted.
    pub total_operations: u64,
    /// Committed operations.
    pub successful_operations: u64,
    /// Operations the ledger refused (insufficient balance, bad input).
    pub rejected_operations: u64,
    /// Store failures such as lock timeouts.
    pub failed_operations: u64,
    /// Committed top-up volume.
    pub topped_up: Decimal,
    /// Committed payment volume.
    pub paid: Decimal,
    /// Committed transfer volume.
    pub transferred: Decimal,
    /// Latency samples (us).
    latency_samples: VecDeque<u64>,
    /// Maximum samples to keep.
    max_samples: usize,
}

/// Serializable view of [`SimulationMetrics`].
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub total_operations: u64,
    pub successful_operations: u64,
    pub rejected_operations: u64,
    pub failed_operations: u64,
    pub topped_up: Decimal,
    pub paid: Decimal,
    pub transferred: Decimal,
    pub average_latency_us: u64,
    pub p50_latency_us: u64,
    pub p99_latency_us: u64,
    pub success_rate: f64,
}

impl SimulationMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self {
            total_operations: 0,
            successful_operations: 0,
            rejected_operations: 0,
            failed_operations: 0,
            topped_up: Decimal::ZERO,
            paid: Decimal::ZERO,
            transferred: Decimal::ZERO,
            latency_samples: VecDeque::with_capacity(10000),
            max_samples: 10000,
        }
    }

    fn record_latency(&mut self, latency_us: u64) {
        if self.latency_samples.len() >= self.max_samples {
            self.latency_samples.pop_front();
        }
        self.latency_samples.push_back(latency_us);
    }

    pub fn record_top_up(&mut self, amount: Decimal, latency_us: u64) {
        self.total_operations += 1;
        self.successful_operations += 1;
        self.topped_up += amount;
        self.record_latency(latency_us);
    }

    pub fn record_payment(&mut self, amount: Decimal, latency_us: u64) {
        self.total_operations += 1;
        self.successful_operations += 1;
        self.paid += amount;
        self.record_latency(latency_us);
    }

    pub fn record_transfer(&mut self, amount: Decimal, latency_us: u64) {
        self.total_operations += 1;
        self.successful_operations += 1;
        self.transferred += amount;
        self.record_latency(latency_us);
    }

    /// Record an operation the ledger refused.
    pub fn record_rejection(&mut self, latency_us: u64) {
        self.total_operations += 1;
        self.rejected_operations += 1;
        self.record_latency(latency_us);
    }

    /// Record a failed operation.
    pub fn record_failure(&mut self) {
        self.total_operations += 1;
        self.failed_operations += 1;
    }

    /// Fold another worker's metrics into these.
    pub fn merge(&mut self, other: SimulationMetrics) {
        self.total_operations += other.total_operations;
        self.successful_operations += other.successful_operations;
        self.rejected_operations += other.rejected_operations;
        self.failed_operations += other.failed_operations;
        self.topped_up += other.topped_up;
        self.paid += other.paid;
        self.transferred += other.transferred;
        for sample in other.latency_samples {
            self.record_latency(sample);
        }
    }

    /// Balance the ledger should hold in total: everything topped up minus
    /// everything paid out. Transfers move money but never create it.
    pub fn expected_total_balance(&self) -> Decimal {
        self.topped_up - self.paid
    }

    /// Get average latency in us.
    pub fn average_latency_us(&self) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let sum: u64 = self.latency_samples.iter().sum();
        sum / self.latency_samples.len() as u64
    }

    pub fn p50_latency_us(&self) -> u64 {
        self.percentile_latency(50)
    }

    pub fn p99_latency_us(&self) -> u64 {
        self.percentile_latency(99)
    }

    fn percentile_latency(&self, percentile: usize) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let mut sorted: Vec<_> = self.latency_samples.iter().copied().collect();
        sorted.sort_unstable();

        let idx = (sorted.len() * percentile / 100).min(sorted.len() - 1);
        sorted[idx]
    }

    /// Get success rate.
    pub fn success_rate(&self) -> f64 {
        if self.total_operations == 0 {
            return 0.0;
        }

        self.successful_operations as f64 / self.total_operations as f64
    }

    /// Operations per second over `elapsed_secs`.
    pub fn throughput(&self, elapsed_secs: f64) -> f64 {
        if elapsed_secs <= 0.0 {
            return 0.0;
        }

        self.total_operations as f64 / elapsed_secs
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_operations: self.total_operations,
            successful_operations: self.successful_operations,
            rejected_operations: self.rejected_operations,
            failed_operations: self.failed_operations,
            topped_up: self.topped_up,
            paid: self.paid,
            transferred: self.transferred,
            average_latency_us: self.average_latency_us(),
            p50_latency_us: self.p50_latency_us(),
            p99_latency_us: self.p99_latency_us(),
            success_rate: self.success_rate(),
        }
    }
}

impl Default for SimulationMetrics {
    fn default() -> Self {
        Self::new()
    }
}
