//! Ingestion metrics

use std::sync::atomic::{AtomicU64, Ordering};

/// Ingestion metrics, shared by every source of a `SourceSet`
#[derive(Debug, Default)]
pub struct IngestionMetrics {
    /// Total measurements enqueued
    pub measurements_received: AtomicU64,

    /// Payloads that could not be parsed
    pub parse_errors: AtomicU64,

    /// Sources that ended with an error
    pub source_failures: AtomicU64,
}

impl IngestionMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    /// Record measurement enqueued
    pub fn record_received(&self) {
        self.measurements_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record parse error
    pub fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record source failure
    pub fn record_source_failure(&self) {
        self.source_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            measurements_received: self.measurements_received.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            source_failures: self.source_failures.load(Ordering::Relaxed),
        }
    }
}

/// Metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub measurements_received: u64,
    pub parse_errors: u64,
    pub source_failures: u64,
}
