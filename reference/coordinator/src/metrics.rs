//! Metrics collection for atom coordination.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Coordinator metrics.
pub struct Metrics {
    /// Atoms deployed by any factory.
    pub atoms_deployed: AtomicU64,
    /// Atoms deployed but neither settled nor cancelled.
    pub atoms_open: AtomicU64,
    /// Operation approvals recorded (repeat approvals excluded).
    pub operations_approved: AtomicU64,
    /// Settle calls that moved every leg.
    pub settlements_succeeded: AtomicU64,
    /// Settle calls that reverted.
    pub settlements_aborted: AtomicU64,
    /// Settle calls on an already settled atom.
    pub settlements_replayed: AtomicU64,
    /// Atoms cancelled.
    pub cancellations: AtomicU64,
    /// Legs refunded during cancellation.
    pub rollbacks_succeeded: AtomicU64,
    /// Legs whose refund reverted during cancellation.
    pub rollbacks_failed: AtomicU64,
    enabled: bool,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self::with_enabled(true)
    }

    /// Metrics that record nothing when `enabled` is false.
    pub fn with_enabled(enabled: bool) -> Self {
        Self {
            atoms_deployed: AtomicU64::new(0),
            atoms_open: AtomicU64::new(0),
            operations_approved: AtomicU64::new(0),
            settlements_succeeded: AtomicU64::new(0),
            settlements_aborted: AtomicU64::new(0),
            settlements_replayed: AtomicU64::new(0),
            cancellations: AtomicU64::new(0),
            rollbacks_succeeded: AtomicU64::new(0),
            rollbacks_failed: AtomicU64::new(0),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn add(&self, counter: &AtomicU64) {
        if self.enabled {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn sub(&self, counter: &AtomicU64) {
        if self.enabled {
            counter.fetch_sub(1, Ordering::Relaxed);
        }
    }

    pub fn atom_deployed(&self) {
        self.add(&self.atoms_deployed);
        self.add(&self.atoms_open);
    }

    pub fn operation_approved(&self) {
        self.add(&self.operations_approved);
    }

    pub fn settlement_succeeded(&self) {
        self.add(&self.settlements_succeeded);
        self.sub(&self.atoms_open);
    }

    pub fn settlement_aborted(&self) {
        self.add(&self.settlements_aborted);
    }

    pub fn settlement_replayed(&self) {
        self.add(&self.settlements_replayed);
    }

    pub fn atom_cancelled(&self) {
        self.add(&self.cancellations);
        self.sub(&self.atoms_open);
    }

    pub fn rollback_succeeded(&self) {
        self.add(&self.rollbacks_succeeded);
    }

    pub fn rollback_failed(&self) {
        self.add(&self.rollbacks_failed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            atoms_deployed: self.atoms_deployed.load(Ordering::Relaxed),
            atoms_open: self.atoms_open.load(Ordering::Relaxed),
            operations_approved: self.operations_approved.load(Ordering::Relaxed),
            settlements_succeeded: self.settlements_succeeded.load(Ordering::Relaxed),
            settlements_aborted: self.settlements_aborted.load(Ordering::Relaxed),
            settlements_replayed: self.settlements_replayed.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
            rollbacks_succeeded: self.rollbacks_succeeded.load(Ordering::Relaxed),
            rollbacks_failed: self.rollbacks_failed.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            r#"# HELP dvp_atoms_deployed Total atoms deployed
# TYPE dvp_atoms_deployed counter
dvp_atoms_deployed {}

# HELP dvp_atoms_open Atoms awaiting settlement or cancellation
# TYPE dvp_atoms_open gauge
dvp_atoms_open {}

# HELP dvp_operations_approved Total operation approvals
# TYPE dvp_operations_approved counter
dvp_operations_approved {}

# HELP dvp_settlements_succeeded Total successful settlements
# TYPE dvp_settlements_succeeded counter
dvp_settlements_succeeded {}

# HELP dvp_settlements_aborted Total reverted settlements
# TYPE dvp_settlements_aborted counter
dvp_settlements_aborted {}

# HELP dvp_settlements_replayed Total settle calls on settled atoms
# TYPE dvp_settlements_replayed counter
dvp_settlements_replayed {}

# HELP dvp_cancellations Total cancelled atoms
# TYPE dvp_cancellations counter
dvp_cancellations {}

# HELP dvp_rollbacks_succeeded Total legs refunded on cancel
# TYPE dvp_rollbacks_succeeded counter
dvp_rollbacks_succeeded {}

# HELP dvp_rollbacks_failed Total legs whose refund reverted on cancel
# TYPE dvp_rollbacks_failed counter
dvp_rollbacks_failed {}
"#,
            snapshot.atoms_deployed,
            snapshot.atoms_open,
            snapshot.operations_approved,
            snapshot.settlements_succeeded,
            snapshot.settlements_aborted,
            snapshot.settlements_replayed,
            snapshot.cancellations,
            snapshot.rollbacks_succeeded,
            snapshot.rollbacks_failed,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub atoms_deployed: u64,
    pub atoms_open: u64,
    pub operations_approved: u64,
    pub settlements_succeeded: u64,
    pub settlements_aborted: u64,
    pub settlements_replayed: u64,
    pub cancellations: u64,
    pub rollbacks_succeeded: u64,
    pub rollbacks_failed: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_increment() {
        let metrics = Metrics::new();

        metrics.atom_deployed();
        metrics.atom_deployed();
        metrics.settlement_succeeded();
        metrics.rollback_failed();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.atoms_deployed, 2);
        assert_eq!(snapshot.atoms_open, 1);
        assert_eq!(snapshot.settlements_succeeded, 1);
        assert_eq!(snapshot.rollbacks_failed, 1);
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = Metrics::new();
        metrics.atom_deployed();

        let output = metrics.to_prometheus();
        assert!(output.contains("dvp_atoms_deployed 1"));
        assert!(output.contains("dvp_cancellations 0"));
        assert!(output.contains("dvp_settlements_replayed 0"));
    }

    #[test]
    fn test_disabled_metrics_record_nothing() {
        let metrics = Metrics::with_enabled(false);
        assert!(!metrics.is_enabled());
        metrics.atom_deployed();
        metrics.settlement_aborted();
        metrics.settlement_replayed();
        metrics.atom_cancelled();
        assert_eq!(metrics.snapshot(), Metrics::new().snapshot());
    }
}
