//! Query and indexing counters.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// How an indexing pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassResult {
    Committed,
    Superseded,
    Failed,
}

/// Counters shared by every module of a coordinator.
pub struct Metrics {
    pub queries_total: AtomicU64,
    /// Sum of query latencies in microseconds
    pub queries_latency_us: AtomicU64,
    pub passes_committed: AtomicU64,
    pub passes_superseded: AtomicU64,
    pub passes_failed: AtomicU64,
    start_time: Instant,
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MetricsSnapshot {
    pub queries_total: u64,
    pub avg_query_us: u64,
    pub passes_committed: u64,
    pub passes_superseded: u64,
    pub passes_failed: u64,
    pub uptime_secs: u64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            queries_total: AtomicU64::new(0),
            queries_latency_us: AtomicU64::new(0),
            passes_committed: AtomicU64::new(0),
            passes_superseded: AtomicU64::new(0),
            passes_failed: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_query(&self, latency: Duration) {
        self.queries_total.fetch_add(1, Ordering::Relaxed);
        self.queries_latency_us
            .fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_pass(&self, result: PassResult) {
        let counter = match result {
            PassResult::Committed => &self.passes_committed,
            PassResult::Superseded => &self.passes_superseded,
            PassResult::Failed => &self.passes_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn avg_query_latency(&self) -> Duration {
        let total = self.queries_total.load(Ordering::Relaxed);
        let latency_us = self.queries_latency_us.load(Ordering::Relaxed);
        if total == 0 {
            Duration::ZERO
        } else {
            Duration::from_micros(latency_us / total)
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queries_total: self.queries_total.load(Ordering::Relaxed),
            avg_query_us: self.avg_query_latency().as_micros() as u64,
            passes_committed: self.passes_committed.load(Ordering::Relaxed),
            passes_superseded: self.passes_superseded.load(Ordering::Relaxed),
            passes_failed: self.passes_failed.load(Ordering::Relaxed),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }
}

/// Recent latency samples per operation, for percentiles.
pub struct LatencyTracker {
    samples: RwLock<VecDeque<(&'static str, Duration)>>,
    max_samples: usize,
}

impl Default for LatencyTracker {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl LatencyTracker {
    pub fn new(max_samples: usize) -> Self {
        Self {
            samples: RwLock::new(VecDeque::with_capacity(max_samples)),
            max_samples,
        }
    }

    pub fn record(&self, operation: &'static str, duration: Duration) {
        let mut samples = self.samples.write();
        samples.push_back((operation, duration));
        while samples.len() > self.max_samples {
            samples.pop_front();
        }
    }

    pub fn p50(&self, operation: &str) -> Duration {
        self.percentile(operation, 0.50)
    }

    pub fn p99(&self, operation: &str) -> Duration {
        self.percentile(operation, 0.99)
    }

    pub fn percentile(&self, operation: &str, p: f64) -> Duration {
        let mut durations: Vec<_> = self
            .samples
            .read()
            .iter()
            .filter(|(op, _)| *op == operation)
            .map(|(_, d)| *d)
            .collect();

        if durations.is_empty() {
            return Duration::ZERO;
        }

        durations.sort();
        let idx = ((durations.len() as f64 * p) as usize).min(durations.len() - 1);
        durations[idx]
    }

    pub fn sample_count(&self, operation: &str) -> usize {
        self.samples
            .read()
            .iter()
            .filter(|(op, _)| *op == operation)
            .count()
    }
}
