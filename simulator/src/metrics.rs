//! Simulation metrics.

use std::collections::VecDeque;

use serde::Serialize;

/// Simulation metrics.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationMetrics {
    /// Trades run.
    pub total_trades: u64,
    /// Trades whose atom settled.
    pub settled_trades: u64,
    /// Trades whose atom was cancelled.
    pub cancelled_trades: u64,
    /// Trades that ended in neither state.
    pub failed_trades: u64,
    /// Settle or cancel calls that reverted.
    pub reverted_calls: u64,
    /// Trade latency samples (µs).
    #[serde(skip)]
    latency_samples: VecDeque<u64>,
    /// Maximum samples to keep.
    #[serde(skip)]
    max_samples: usize,
}

impl SimulationMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self {
            total_trades: 0,
            settled_trades: 0,
            cancelled_trades: 0,
            failed_trades: 0,
            reverted_calls: 0,
            latency_samples: VecDeque::with_capacity(10000),
            max_samples: 10000,
        }
    }

    pub fn record_settled(&mut self, latency_us: u64) {
        self.total_trades += 1;
        self.settled_trades += 1;
        self.record_latency(latency_us);
    }

    pub fn record_cancelled(&mut self, latency_us: u64) {
        self.total_trades += 1;
        self.cancelled_trades += 1;
        self.record_latency(latency_us);
    }

    pub fn record_failure(&mut self) {
        self.total_trades += 1;
        self.failed_trades += 1;
    }

    pub fn record_revert(&mut self) {
        self.reverted_calls += 1;
    }

    fn record_latency(&mut self, latency_us: u64) {
        if self.latency_samples.len() >= self.max_samples {
            self.latency_samples.pop_front();
        }
        self.latency_samples.push_back(latency_us);
    }

    /// Get average latency in µs.
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

    /// Share of trades that reached a terminal atom state.
    pub fn completion_rate(&self) -> f64 {
        if self.total_trades == 0 {
            return 0.0;
        }

        (self.settled_trades + self.cancelled_trades) as f64 / self.total_trades as f64
    }
}

impl Default for SimulationMetrics {
    fn default() -> Self {
        Self::new()
    }
}
