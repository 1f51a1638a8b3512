//! Lock-free instruments rendered in the Prometheus text format.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

/// Something that can write itself as Prometheus exposition text.
pub trait Render {
    /// Append `# HELP`, `# TYPE` and sample lines to `out`.
    fn render(&self, out: &mut String);
}

fn header(out: &mut String, name: &str, help: &str, kind: &str) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
}

/// A monotonically increasing counter.
#[derive(Debug)]
pub struct Counter {
    name: &'static str,
    help: &'static str,
    value: AtomicU64,
}

impl Counter {
    /// Create a counter starting at zero.
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            value: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn inc(&self) {
        self.inc_by(1);
    }

    pub fn inc_by(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Render for Counter {
    fn render(&self, out: &mut String) {
        header(out, self.name, self.help, "counter");
        let _ = writeln!(out, "{} {}", self.name, self.get());
    }
}

/// A counter partitioned by one label.
///
/// Label values are kept sorted so rendering is stable.
#[derive(Debug)]
pub struct LabeledCounter {
    name: &'static str,
    help: &'static str,
    label: &'static str,
    values: RwLock<BTreeMap<String, AtomicU64>>,
}

impl LabeledCounter {
    /// Create a labeled counter with no series.
    pub fn new(name: &'static str, help: &'static str, label: &'static str) -> Self {
        Self {
            name,
            help,
            label,
            values: RwLock::new(BTreeMap::new()),
        }
    }

    /// Increment the series for `value`, creating it on first use.
    pub fn inc(&self, value: &str) {
        if let Some(counter) = self.values.read().get(value) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.values
            .write()
            .entry(value.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Current value of one series, zero if it was never incremented.
    pub fn get(&self, value: &str) -> u64 {
        self.values
            .read()
            .get(value)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Sum over all series.
    pub fn total(&self) -> u64 {
        self.values
            .read()
            .values()
            .map(|c| c.load(Ordering::Relaxed))
            .sum()
    }
}

impl Render for LabeledCounter {
    fn render(&self, out: &mut String) {
        header(out, self.name, self.help, "counter");
        for (value, counter) in self.values.read().iter() {
            let _ = writeln!(
                out,
                "{}{{{}=\"{}\"}} {}",
                self.name,
                self.label,
                value,
                counter.load(Ordering::Relaxed)
            );
        }
    }
}

/// A value that can go up and down.
#[derive(Debug)]
pub struct Gauge {
    name: &'static str,
    help: &'static str,
    value: AtomicI64,
}

impl Gauge {
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            value: AtomicI64::new(0),
        }
    }

    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Render for Gauge {
    fn render(&self, out: &mut String) {
        header(out, self.name, self.help, "gauge");
        let _ = writeln!(out, "{} {}", self.name, self.get());
    }
}

/// Latency buckets for in-memory cache calls, in seconds.
pub const CACHE_LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0,
];

/// A latency histogram with fixed upper bounds.
///
/// Observations are stored per bucket (not cumulative) and the sum is kept
/// in whole microseconds, so every update is a single atomic add.
#[derive(Debug)]
pub struct Histogram {
    name: &'static str,
    help: &'static str,
    bounds: &'static [f64],
    /// One slot per bound plus a trailing `+Inf` slot.
    buckets: Vec<AtomicU64>,
    sum_micros: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    /// Create a histogram over ascending `bounds`.
    pub fn new(name: &'static str, help: &'static str, bounds: &'static [f64]) -> Self {
        Self {
            name,
            help,
            bounds,
            buckets: (0..=bounds.len()).map(|_| AtomicU64::new(0)).collect(),
            sum_micros: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, elapsed: Duration) {
        let secs = elapsed.as_secs_f64();
        let slot = self
            .bounds
            .iter()
            .position(|&bound| secs <= bound)
            .unwrap_or(self.bounds.len());
        self.buckets[slot].fetch_add(1, Ordering::Relaxed);
        self.sum_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Sum of all observations.
    pub fn sum(&self) -> Duration {
        Duration::from_micros(self.sum_micros.load(Ordering::Relaxed))
    }

    /// Mean observation, zero when empty.
    pub fn mean(&self) -> Duration {
        match self.count() {
            0 => Duration::ZERO,
            n => Duration::from_secs_f64(self.sum().as_secs_f64() / n as f64),
        }
    }
}

impl Render for Histogram {
    fn render(&self, out: &mut String) {
        header(out, self.name, self.help, "histogram");
        let mut cumulative = 0;
        for (bound, bucket) in self.bounds.iter().zip(&self.buckets) {
            cumulative += bucket.load(Ordering::Relaxed);
            let _ = writeln!(out, "{}_bucket{{le=\"{}\"}} {}", self.name, bound, cumulative);
        }
        if let Some(overflow) = self.buckets.last() {
            cumulative += overflow.load(Ordering::Relaxed);
        }
        let _ = writeln!(out, "{}_bucket{{le=\"+Inf\"}} {}", self.name, cumulative);
        let _ = writeln!(out, "{}_sum {}", self.name, self.sum().as_secs_f64());
        let _ = writeln!(out, "{}_count {}", self.name, self.count());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new("test_total", "A test counter");
        counter.inc();
        counter.inc_by(4);
        assert_eq!(counter.get(), 5);

        let mut out = String::new();
        counter.render(&mut out);
        assert!(out.contains("# TYPE test_total counter"));
        assert!(out.contains("test_total 5"));
    }

    #[test]
    fn test_labeled_counter() {
        let counter = LabeledCounter::new("errors_total", "Errors", "kind");
        counter.inc("timeout");
        counter.inc("timeout");
        counter.inc("unavailable");

        assert_eq!(counter.get("timeout"), 2);
        assert_eq!(counter.get("missing"), 0);
        assert_eq!(counter.total(), 3);

        let mut out = String::new();
        counter.render(&mut out);
        assert!(out.contains("errors_total{kind=\"timeout\"} 2"));
    }

    #[test]
    fn test_histogram_buckets() {
        let hist = Histogram::new("lat_seconds", "Latency", &[0.001, 0.01]);
        hist.observe(Duration::from_micros(500));
        hist.observe(Duration::from_millis(5));
        hist.observe(Duration::from_secs(1));

        assert_eq!(hist.count(), 3);
        assert_eq!(hist.sum(), Duration::from_micros(1_005_500));

        let mut out = String::new();
        hist.render(&mut out);
        assert!(out.contains("lat_seconds_bucket{le=\"0.001\"} 1"));
        assert!(out.contains("lat_seconds_bucket{le=\"0.01\"} 2"));
        assert!(out.contains("lat_seconds_bucket{le=\"+Inf\"} 3"));
        assert!(out.contains("lat_seconds_count 3"));
    }

    #[test]
    fn test_empty_histogram_mean() {
        let hist = Histogram::new("empty", "Empty", CACHE_LATENCY_BUCKETS);
        assert_eq!(hist.mean(), Duration::ZERO);
    }
}
