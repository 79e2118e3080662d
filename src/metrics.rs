//! Metrics (§4.18): counters, gauges, and latency histograms scoped to
//! exactly what the design notes name. Grounded on `metrics::ServerMetrics`
//! (`AtomicU64` fields grouped by comment header) and
//! `metrics::ResponseTimeTracker` (`hdrhistogram::Histogram` per named
//! operation); Prometheus emission itself is out of scope, but
//! [`MetricsSnapshot`] is the seam an exporter would read.
//!
//! The registry is one of exactly two legitimate process-wide singletons
//! (the other is the [`crate::error`] catalog) and follows the same
//! `OnceLock` pattern.

use dashmap::DashMap;
use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::RwLock;

const LOWEST_DISCERNIBLE_MICROS: u64 = 1;
const HIGHEST_TRACKABLE_MICROS: u64 = 300_000_000;

pub struct MetricsRegistry {
    // Admission counters.
    pub admission_attempts: AtomicU64,
    pub admission_success: AtomicU64,
    admission_failures_by_reason: DashMap<&'static str, AtomicU64>,

    // Queue operation counters.
    pub queue_enqueued: AtomicU64,
    pub queue_dequeued: AtomicU64,
    pub queue_rejected: AtomicU64,

    // Session operation counters, keyed by outcome.
    session_ops_by_outcome: DashMap<&'static str, AtomicU64>,

    // Rate-limit hit counter.
    pub rate_limit_hits: AtomicU64,

    // Reconnect attempt counters, keyed by result.
    reconnect_attempts_by_result: DashMap<&'static str, AtomicU64>,

    // Gauges.
    pub queue_size: AtomicU64,
    pub active_sessions: AtomicU64,
    pub active_connections: AtomicU64,
    /// Stored as parts-per-10_000 so the gauge fits an `AtomicU64`.
    capacity_utilization_bp: AtomicU64,

    // Histograms: admission duration, queue wait, action latency, janitor duration.
    latencies: RwLock<LatencyHistograms>,
}

const fn significant_figures() -> u8 {
    3
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new(significant_figures())
    }
}

impl MetricsRegistry {
    fn new(histogram_significant_figures: u8) -> Self {
        Self {
            admission_attempts: AtomicU64::new(0),
            admission_success: AtomicU64::new(0),
            admission_failures_by_reason: DashMap::new(),
            queue_enqueued: AtomicU64::new(0),
            queue_dequeued: AtomicU64::new(0),
            queue_rejected: AtomicU64::new(0),
            session_ops_by_outcome: DashMap::new(),
            rate_limit_hits: AtomicU64::new(0),
            reconnect_attempts_by_result: DashMap::new(),
            queue_size: AtomicU64::new(0),
            active_sessions: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            capacity_utilization_bp: AtomicU64::new(0),
            latencies: RwLock::new(LatencyHistograms::new(histogram_significant_figures)),
        }
    }

    pub fn record_admission_attempt(&self) {
        self.admission_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_admission_success(&self) {
        self.admission_success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_admission_failure(&self, reason: &'static str) {
        self.admission_failures_by_reason
            .entry(reason)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_outcome(&self, outcome: &'static str) {
        self.session_ops_by_outcome
            .entry(outcome)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reconnect_attempt(&self, result: &'static str) {
        self.reconnect_attempts_by_result
            .entry(result)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limit_hit(&self) {
        self.rate_limit_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_queue_size(&self, size: u64) {
        self.queue_size.store(size, Ordering::Relaxed);
    }

    pub fn set_active_sessions(&self, count: u64) {
        self.active_sessions.store(count, Ordering::Relaxed);
    }

    pub fn set_active_connections(&self, count: u64) {
        self.active_connections.store(count, Ordering::Relaxed);
    }

    /// `utilization` is a fraction in `[0.0, 1.0]`.
    pub fn set_capacity_utilization(&self, utilization: f64) {
        let bp = (utilization.clamp(0.0, 1.0) * 10_000.0).round() as u64;
        self.capacity_utilization_bp.store(bp, Ordering::Relaxed);
    }

    pub async fn record_admission_duration(&self, duration: Duration) {
        self.latencies.write().await.record("admission_duration", duration);
    }

    pub async fn record_queue_wait(&self, duration: Duration) {
        self.latencies.write().await.record("queue_wait", duration);
    }

    pub async fn record_action_latency(&self, duration: Duration) {
        self.latencies.write().await.record("action_latency", duration);
    }

    pub async fn record_janitor_duration(&self, duration: Duration) {
        self.latencies.write().await.record("janitor_duration", duration);
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let latencies = self.latencies.read().await;
        MetricsSnapshot {
            admission_attempts: self.admission_attempts.load(Ordering::Relaxed),
            admission_success: self.admission_success.load(Ordering::Relaxed),
            admission_failures_by_reason: collect_counts(&self.admission_failures_by_reason),
            queue_enqueued: self.queue_enqueued.load(Ordering::Relaxed),
            queue_dequeued: self.queue_dequeued.load(Ordering::Relaxed),
            queue_rejected: self.queue_rejected.load(Ordering::Relaxed),
            session_ops_by_outcome: collect_counts(&self.session_ops_by_outcome),
            rate_limit_hits: self.rate_limit_hits.load(Ordering::Relaxed),
            reconnect_attempts_by_result: collect_counts(&self.reconnect_attempts_by_result),
            queue_size: self.queue_size.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            capacity_utilization_pct: self.capacity_utilization_bp.load(Ordering::Relaxed) as f64 / 100.0,
            admission_duration: latencies.metrics("admission_duration"),
            queue_wait: latencies.metrics("queue_wait"),
            action_latency: latencies.metrics("action_latency"),
            janitor_duration: latencies.metrics("janitor_duration"),
        }
    }
}

fn collect_counts(map: &DashMap<&'static str, AtomicU64>) -> HashMap<String, u64> {
    map.iter()
        .map(|e| (e.key().to_string(), e.value().load(Ordering::Relaxed)))
        .collect()
}

struct LatencyHistograms {
    operations: HashMap<&'static str, Histogram<u64>>,
    significant_figures: u8,
}

impl LatencyHistograms {
    fn new(significant_figures: u8) -> Self {
        Self {
            operations: HashMap::new(),
            significant_figures: significant_figures.clamp(1, 5),
        }
    }

    fn record(&mut self, operation: &'static str, duration: Duration) {
        let sig_figs = self.significant_figures;
        let histogram = self.operations.entry(operation).or_insert_with(|| {
            Histogram::new_with_bounds(LOWEST_DISCERNIBLE_MICROS, HIGHEST_TRACKABLE_MICROS, sig_figs)
                .unwrap_or_else(|_| Histogram::new(1).expect("sig_figs=1 histogram construction cannot fail"))
        });
        let micros = duration.as_micros().min(u128::from(u64::MAX)) as u64;
        let clamped = micros.min(HIGHEST_TRACKABLE_MICROS);
        let _ = histogram.record(clamped);
    }

    fn metrics(&self, operation: &str) -> LatencyMetrics {
        let Some(histogram) = self.operations.get(operation) else {
            return LatencyMetrics::default();
        };
        if histogram.is_empty() {
            return LatencyMetrics::default();
        }
        LatencyMetrics {
            average_ms: Some(histogram.mean() / 1000.0),
            p50_ms: Some(histogram.value_at_percentile(50.0) as f64 / 1000.0),
            p95_ms: Some(histogram.value_at_percentile(95.0) as f64 / 1000.0),
            p99_ms: Some(histogram.value_at_percentile(99.0) as f64 / 1000.0),
            sample_count: histogram.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LatencyMetrics {
    pub average_ms: Option<f64>,
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
    pub sample_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub admission_attempts: u64,
    pub admission_success: u64,
    pub admission_failures_by_reason: HashMap<String, u64>,
    pub queue_enqueued: u64,
    pub queue_dequeued: u64,
    pub queue_rejected: u64,
    pub session_ops_by_outcome: HashMap<String, u64>,
    pub rate_limit_hits: u64,
    pub reconnect_attempts_by_result: HashMap<String, u64>,
    pub queue_size: u64,
    pub active_sessions: u64,
    pub active_connections: u64,
    pub capacity_utilization_pct: f64,
    pub admission_duration: LatencyMetrics,
    pub queue_wait: LatencyMetrics,
    pub action_latency: LatencyMetrics,
    pub janitor_duration: LatencyMetrics,
}

static REGISTRY: OnceLock<MetricsRegistry> = OnceLock::new();

/// The process-wide metrics registry, seeded once on first access.
pub fn metrics() -> &'static MetricsRegistry {
    REGISTRY.get_or_init(MetricsRegistry::default)
}

/// Test-only constructor for a registry isolated from the process-wide one.
#[cfg(test)]
pub fn new_registry_for_test() -> MetricsRegistry {
    MetricsRegistry::new(significant_figures())
}
