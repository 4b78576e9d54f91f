//! Logging setup and dispatch counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing_subscriber::{EnvFilter, fmt};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `default_filter`. Logs go to stderr so stdout stays
/// free for command output. Calling this twice is a no-op.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Delivery counters shared by every dispatch of an executor
#[derive(Debug, Default)]
pub struct Metrics {
    sent: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    retried: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "sent", "Metric incremented");
    }

    pub fn failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "failed", "Metric incremented");
    }

    pub fn skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "skipped", "Metric incremented");
    }

    pub fn retried(&self) {
        self.retried.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "retried", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub sent: u64,
    pub failed: u64,
    pub skipped: u64,
    pub retried: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = Metrics::new();
        metrics.sent();
        metrics.sent();
        metrics.failed();
        metrics.retried();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.sent, 2);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.skipped, 0);
        assert_eq!(snapshot.retried, 1);
    }

    #[test]
    fn test_init_tracing_twice() {
        init_tracing("debug");
        init_tracing("not a [valid filter");
    }
}
