//! Metrics for monitoring the cache layer.
//!
//! Counters, gauges and latency histograms are plain atomics owned by
//! [`CacheMetrics`]; [`CacheMetrics::to_prometheus`] renders them in the
//! Prometheus text exposition format.
//!
//! # Example
//!
//! ```rust
//! use ringcache::metrics::CacheMetrics;
//! use ringcache::ReadSource;
//! use std::time::Duration;
//!
//! let metrics = CacheMetrics::new();
//! metrics.record_get(ReadSource::Replica, Duration::from_micros(40));
//! metrics.record_get(ReadSource::NotFound, Duration::from_micros(90));
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.hit_rate(), 0.5);
//! ```

mod instruments;

pub use instruments::{Counter, Gauge, Histogram, LabeledCounter, Render, CACHE_LATENCY_BUCKETS};

use crate::types::ReadSource;
use std::time::Duration;

/// Buckets for backing-store reads, in seconds.
pub const BACKING_STORE_LATENCY_BUCKETS: &[f64] =
    &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5];

/// Metrics for one cache cluster.
#[derive(Debug)]
pub struct CacheMetrics {
    // Reads
    /// Total GET requests.
    pub get_total: Counter,
    /// GETs answered by a cache replica.
    pub get_hits: Counter,
    /// GETs answered by the backing store after every replica missed.
    pub get_fallbacks: Counter,
    /// GETs that found nothing anywhere.
    pub get_misses: Counter,
    pub get_latency: Histogram,

    // Writes
    pub put_total: Counter,
    /// PUTs that reached at least one replica.
    pub put_success: Counter,
    /// PUTs rejected because no live replica accepted them.
    pub put_unavailable: Counter,
    pub put_latency: Histogram,
    pub remove_total: Counter,

    /// Individual replica calls that failed during fan-out, by operation.
    pub replica_failures: LabeledCounter,

    // Backing store
    pub backing_store_reads: Counter,
    pub backing_store_timeouts: Counter,
    pub backing_store_errors: Counter,
    /// Values written back into a replica after a backing-store hit.
    pub cache_fills: Counter,
    pub backing_store_latency: Histogram,

    // Cluster
    pub active_nodes: Gauge,
    pub failed_nodes: Gauge,

    /// Errors returned to callers, by kind.
    pub errors: LabeledCounter,
}

impl CacheMetrics {
    /// Create a metrics instance with every value at zero.
    pub fn new() -> Self {
        Self {
            get_total: Counter::new("cache_get_total", "Total GET requests"),
            get_hits: Counter::new("cache_get_hits", "GETs served by a replica"),
            get_fallbacks: Counter::new(
                "cache_get_fallbacks",
                "GETs served by the backing store",
            ),
            get_misses: Counter::new("cache_get_misses", "GETs that found no value"),
            get_latency: Histogram::new(
                "cache_get_latency_seconds",
                "GET latency",
                CACHE_LATENCY_BUCKETS,
            ),

            put_total: Counter::new("cache_put_total", "Total PUT requests"),
            put_success: Counter::new("cache_put_success", "PUTs written to a replica"),
            put_unavailable: Counter::new(
                "cache_put_unavailable",
                "PUTs with no live replica",
            ),
            put_latency: Histogram::new(
                "cache_put_latency_seconds",
                "PUT latency",
                CACHE_LATENCY_BUCKETS,
            ),
            remove_total: Counter::new("cache_remove_total", "Total REMOVE requests"),

            replica_failures: LabeledCounter::new(
                "cache_replica_failures_total",
                "Failed replica calls during fan-out",
                "operation",
            ),

            backing_store_reads: Counter::new(
                "backing_store_reads_total",
                "Backing-store reads",
            ),
            backing_store_timeouts: Counter::new(
                "backing_store_timeouts_total",
                "Backing-store reads that timed out",
            ),
            backing_store_errors: Counter::new(
                "backing_store_errors_total",
                "Backing-store reads that failed",
            ),
            cache_fills: Counter::new("cache_fills_total", "Replica fills after a fallback"),
            backing_store_latency: Histogram::new(
                "backing_store_latency_seconds",
                "Backing-store read latency",
                BACKING_STORE_LATENCY_BUCKETS,
            ),

            active_nodes: Gauge::new("cluster_active_nodes", "Active member nodes"),
            failed_nodes: Gauge::new("cluster_failed_nodes", "Failed member nodes"),

            errors: LabeledCounter::new("cache_errors_total", "Errors by kind", "kind"),
        }
    }

    /// Record a completed GET.
    pub fn record_get(&self, source: ReadSource, latency: Duration) {
        self.get_total.inc();
        match source {
            ReadSource::Replica => self.get_hits.inc(),
            ReadSource::BackingStore => self.get_fallbacks.inc(),
            ReadSource::NotFound => self.get_misses.inc(),
        }
        self.get_latency.observe(latency);
    }

    /// Record a completed PUT.
    pub fn record_put(&self, success: bool, latency: Duration) {
        self.put_total.inc();
        if success {
            self.put_success.inc();
        } else {
            self.put_unavailable.inc();
        }
        self.put_latency.observe(latency);
    }

    pub fn record_remove(&self) {
        self.remove_total.inc();
    }

    /// Record a replica call that failed and was skipped.
    pub fn record_replica_failure(&self, operation: &str) {
        self.replica_failures.inc(operation);
    }

    pub fn record_error(&self, kind: &str) {
        self.errors.inc(kind);
    }

    /// Update the membership gauges.
    pub fn update_cluster_stats(&self, active: usize, failed: usize) {
        self.active_nodes.set(active as i64);
        self.failed_nodes.set(failed as i64);
    }

    /// Get a snapshot of the request counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            get_total: self.get_total.get(),
            get_hits: self.get_hits.get(),
            get_fallbacks: self.get_fallbacks.get(),
            get_misses: self.get_misses.get(),
            put_total: self.put_total.get(),
            put_success: self.put_success.get(),
            put_unavailable: self.put_unavailable.get(),
            remove_total: self.remove_total.get(),
            replica_failures: self.replica_failures.total(),
            backing_store_reads: self.backing_store_reads.get(),
            backing_store_timeouts: self.backing_store_timeouts.get(),
            cache_fills: self.cache_fills.get(),
            mean_get_latency: self.get_latency.mean(),
        }
    }

    /// Format metrics in Prometheus exposition format.
    pub fn to_prometheus(&self) -> String {
        let instruments: [&dyn Render; 20] = [
            &self.get_total,
            &self.get_hits,
            &self.get_fallbacks,
            &self.get_misses,
            &self.get_latency,
            &self.put_total,
            &self.put_success,
            &self.put_unavailable,
            &self.put_latency,
            &self.remove_total,
            &self.replica_failures,
            &self.backing_store_reads,
            &self.backing_store_timeouts,
            &self.backing_store_errors,
            &self.cache_fills,
            &self.backing_store_latency,
            &self.active_nodes,
            &self.failed_nodes,
            &self.errors,
            &ClusterSize(self),
        ];

        let mut output = String::new();
        for instrument in instruments {
            instrument.render(&mut output);
        }
        output
    }
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Derived total of active and failed members.
struct ClusterSize<'a>(&'a CacheMetrics);

impl Render for ClusterSize<'_> {
    fn render(&self, out: &mut String) {
        let total = self.0.active_nodes.get() + self.0.failed_nodes.get();
        out.push_str("# HELP cluster_nodes Member nodes, active or failed\n");
        out.push_str("# TYPE cluster_nodes gauge\n");
        out.push_str(&format!("cluster_nodes {total}\n"));
    }
}

/// A snapshot of cache metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub get_total: u64,
    pub get_hits: u64,
    pub get_fallbacks: u64,
    pub get_misses: u64,
    pub put_total: u64,
    pub put_success: u64,
    pub put_unavailable: u64,
    pub remove_total: u64,
    pub replica_failures: u64,
    pub backing_store_reads: u64,
    pub backing_store_timeouts: u64,
    pub cache_fills: u64,
    pub mean_get_latency: Duration,
}

impl MetricsSnapshot {
    /// Fraction of GETs answered by a replica.
    pub fn hit_rate(&self) -> f64 {
        if self.get_total == 0 {
            0.0
        } else {
            self.get_hits as f64 / self.get_total as f64
        }
    }
}
