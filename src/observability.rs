use tracing::{info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counters for the external group provider and the record store
#[derive(Debug, Default)]
pub struct MembershipMetrics {
    pub provider_requests: AtomicU64,
    pub provider_rejections: AtomicU64,
    pub provider_unavailable: AtomicU64,
    pub cascade_failures: AtomicU64,
    pub broadcast_failures: AtomicU64,
    pub store_conflicts: AtomicU64,
}

impl MembershipMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_provider_request(&self) {
        self.provider_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_provider_rejection(&self) {
        self.provider_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_provider_unavailable(&self) {
        self.provider_unavailable.fetch_add(1, Ordering::Relaxed);
        warn!("Group provider unavailable");
    }

    pub fn record_cascade_failure(&self) {
        self.cascade_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_broadcast_failure(&self) {
        self.broadcast_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_conflict(&self) {
        self.store_conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> MembershipStats {
        MembershipStats {
            provider_requests: self.provider_requests.load(Ordering::Relaxed),
            provider_rejections: self.provider_rejections.load(Ordering::Relaxed),
            provider_unavailable: self.provider_unavailable.load(Ordering::Relaxed),
            cascade_failures: self.cascade_failures.load(Ordering::Relaxed),
            broadcast_failures: self.broadcast_failures.load(Ordering::Relaxed),
            store_conflicts: self.store_conflicts.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            provider_requests = stats.provider_requests,
            provider_rejections = stats.provider_rejections,
            provider_unavailable = stats.provider_unavailable,
            cascade_failures = stats.cascade_failures,
            broadcast_failures = stats.broadcast_failures,
            store_conflicts = stats.store_conflicts,
            "Membership metrics"
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipStats {
    pub provider_requests: u64,
    pub provider_rejections: u64,
    pub provider_unavailable: u64,
    pub cascade_failures: u64,
    pub broadcast_failures: u64,
    pub store_conflicts: u64,
}

/// Global metrics instance
static MEMBERSHIP_METRICS: std::sync::LazyLock<MembershipMetrics> =
    std::sync::LazyLock::new(MembershipMetrics::new);

pub fn membership_metrics() -> &'static MembershipMetrics {
    &MEMBERSHIP_METRICS
}

/// Time an operation and log its duration
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn finish(self) {
        let duration = self.start.elapsed();
        info!(
            operation = %self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}
