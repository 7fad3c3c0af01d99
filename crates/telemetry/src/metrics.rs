//! Internal metrics collection.
//!
//! A [`MetricsCollector`] is built once per gateway and shared by handle.
//! Counters and gauges are lock-free after first registration; histograms
//! keep a bounded window of recent samples and compute percentiles on read.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::warn;
use validator::Validate;

use crate::health::HealthThresholds;
use crate::names;
use crate::window::RollingCounts;

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MetricsConfig {
    /// Samples retained per histogram
    #[validate(range(min = 1, max = 100000))]
    pub history_size: usize,
    /// Security events retained in the log
    #[validate(range(min = 1, max = 100000))]
    pub security_log_size: usize,
    /// Prefix for the flat text export
    #[validate(length(min = 1, max = 64))]
    pub prefix: String,
    /// Health verdict thresholds
    #[validate(nested)]
    pub health: HealthThresholds,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            history_size: 1000,
            security_log_size: 1000,
            prefix: "gateway".to_string(),
            health: HealthThresholds::default(),
        }
    }
}

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A gauge metric, last write wins.
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn set(&self, val: f64) {
        self.0.store(val.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }
}

/// Histogram over the most recent samples.
#[derive(Debug)]
pub struct Histogram {
    samples: Mutex<VecDeque<f64>>,
    capacity: usize,
}

impl Histogram {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    pub fn observe(&self, value: f64) {
        let mut samples = self.samples.lock();
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back(value);
    }

    /// Summarizes the retained window.
    pub fn summary(&self) -> HistogramSummary {
        let mut values: Vec<f64> = self.samples.lock().iter().copied().collect();
        if values.is_empty() {
            return HistogramSummary::default();
        }

        values.sort_by(|a, b| a.total_cmp(b));
        let count = values.len();

        HistogramSummary {
            count,
            min: values[0],
            max: values[count - 1],
            mean: values.iter().sum::<f64>() / count as f64,
            p50: percentile(&values, 0.50),
            p95: percentile(&values, 0.95),
            p99: percentile(&values, 0.99),
        }
    }
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    let index = ((sorted.len() as f64 * p) as usize).min(sorted.len() - 1);
    sorted[index]
}

/// Statistical summary of a histogram window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
}

/// Metric name plus sorted label set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetricKey {
    name: String,
    labels: Vec<(String, String)>,
}

impl MetricKey {
    pub fn new(name: &str, labels: &[(&str, &str)]) -> Self {
        let mut labels: Vec<(String, String)> = labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        labels.sort();
        Self {
            name: name.to_string(),
            labels,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renders `name<suffix>{k="v"}`.
    pub fn render_with_suffix(&self, prefix: &str, suffix: &str) -> String {
        let mut out = String::new();
        if !prefix.is_empty() {
            out.push_str(prefix);
            out.push('_');
        }
        out.push_str(&self.name);
        out.push_str(suffix);
        if !self.labels.is_empty() {
            let rendered: Vec<String> = self
                .labels
                .iter()
                .map(|(k, v)| format!("{}=\"{}\"", k, v.replace('"', "\\\"")))
                .collect();
            out.push('{');
            out.push_str(&rendered.join(","));
            out.push('}');
        }
        out
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_with_suffix("", ""))
    }
}

/// A security-relevant rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub client_id: String,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Process metrics for the gateway.
#[derive(Debug)]
pub struct MetricsCollector {
    config: MetricsConfig,
    counters: RwLock<HashMap<MetricKey, Arc<Counter>>>,
    gauges: RwLock<HashMap<MetricKey, Arc<Gauge>>>,
    histograms: RwLock<HashMap<MetricKey, Arc<Histogram>>>,
    security_log: Mutex<VecDeque<SecurityEvent>>,
    rates: Mutex<RollingCounts>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(MetricsConfig::default())
    }
}

/// Returns the registered metric, creating it on first use.
fn entry<T>(
    map: &RwLock<HashMap<MetricKey, Arc<T>>>,
    key: MetricKey,
    make: impl FnOnce() -> T,
) -> Arc<T> {
    if let Some(metric) = map.read().get(&key) {
        return metric.clone();
    }
    map.write()
        .entry(key)
        .or_insert_with(|| Arc::new(make()))
        .clone()
}

fn lookup<T>(map: &RwLock<HashMap<MetricKey, Arc<T>>>, key: &MetricKey) -> Option<Arc<T>> {
    map.read().get(key).cloned()
}

impl MetricsCollector {
    pub fn new(config: MetricsConfig) -> Self {
        let rates = RollingCounts::new(config.health.rate_window_secs);
        Self {
            config,
            counters: RwLock::new(HashMap::new()),
            gauges: RwLock::new(HashMap::new()),
            histograms: RwLock::new(HashMap::new()),
            security_log: Mutex::new(VecDeque::new()),
            rates: Mutex::new(rates),
        }
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.config
    }

    // === Counters ===

    pub fn increment(&self, name: &str) {
        self.increment_with(name, &[], 1);
    }

    pub fn increment_by(&self, name: &str, n: u64) {
        self.increment_with(name, &[], n);
    }

    pub fn increment_with(&self, name: &str, labels: &[(&str, &str)], n: u64) {
        self.increment_at(name, labels, n, Utc::now());
    }

    /// Increments a counter, attributing the increment to `at` in the
    /// windowed rates that feed the health verdict.
    pub fn increment_at(&self, name: &str, labels: &[(&str, &str)], n: u64, at: DateTime<Utc>) {
        entry(&self.counters, MetricKey::new(name, labels), Counter::default).inc_by(n);
        if names::RATE_TRACKED.contains(&name) {
            self.rates.lock().record_at(name, n, at);
        }
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counter_with(name, &[])
    }

    pub fn counter_with(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        lookup(&self.counters, &MetricKey::new(name, labels))
            .map(|c| c.get())
            .unwrap_or(0)
    }

    /// Increments of a rate-tracked counter at or after `since`, summed
    /// across label sets. Untracked counters always report 0.
    pub fn windowed_count(&self, name: &str, since: DateTime<Utc>) -> u64 {
        self.rates.lock().sum_since(name, since)
    }

    /// Sums a counter across all of its label sets.
    pub fn counter_total(&self, name: &str) -> u64 {
        self.counters
            .read()
            .iter()
            .filter(|(key, _)| key.name() == name)
            .map(|(_, c)| c.get())
            .sum()
    }

    // === Gauges ===

    pub fn set_gauge(&self, name: &str, value: f64) {
        self.set_gauge_with(name, &[], value);
    }

    pub fn set_gauge_with(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        entry(&self.gauges, MetricKey::new(name, labels), Gauge::default).set(value);
    }

    pub fn gauge(&self, name: &str) -> f64 {
        lookup(&self.gauges, &MetricKey::new(name, &[]))
            .map(|g| g.get())
            .unwrap_or(0.0)
    }

    // === Histograms ===

    pub fn observe(&self, name: &str, value: f64) {
        self.observe_with(name, &[], value);
    }

    pub fn observe_with(&self, name: &str, labels: &[(&str, &str)], value: f64) {
        let capacity = self.config.history_size;
        entry(&self.histograms, MetricKey::new(name, labels), || {
            Histogram::new(capacity)
        })
        .observe(value);
    }

    pub fn histogram(&self, name: &str) -> HistogramSummary {
        self.histogram_with(name, &[])
    }

    pub fn histogram_with(&self, name: &str, labels: &[(&str, &str)]) -> HistogramSummary {
        lookup(&self.histograms, &MetricKey::new(name, labels))
            .map(|h| h.summary())
            .unwrap_or_default()
    }

    /// Starts a timer that records elapsed milliseconds into `name` on drop.
    pub fn start_timer<'a>(&'a self, name: &'a str) -> TimerGuard<'a> {
        TimerGuard {
            metrics: self,
            name,
            start: Instant::now(),
        }
    }

    // === Security log ===

    /// Records a security-relevant rejection.
    pub fn security_event(&self, event_type: &str, client_id: &str, details: serde_json::Value) {
        warn!(
            event_type = event_type,
            client_id = client_id,
            details = %details,
            "Security event"
        );

        self.increment(&format!("security_events_{}_total", event_type));

        let mut log = self.security_log.lock();
        if log.len() >= self.config.security_log_size {
            log.pop_front();
        }
        log.push_back(SecurityEvent {
            event_type: event_type.to_string(),
            client_id: client_id.to_string(),
            details,
            timestamp: Utc::now(),
        });
    }

    /// Returns the retained security events, oldest first.
    pub fn security_events(&self) -> Vec<SecurityEvent> {
        self.security_log.lock().iter().cloned().collect()
    }

    /// Counts retained security events at or after `since`.
    pub fn security_events_since(&self, since: DateTime<Utc>) -> usize {
        self.security_log
            .lock()
            .iter()
            .rev()
            .take_while(|e| e.timestamp >= since)
            .count()
    }

    // === Export ===

    /// Structured dump of every metric.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = self
            .counters
            .read()
            .iter()
            .map(|(k, c)| (k.to_string(), c.get()))
            .collect();
        let gauges = self
            .gauges
            .read()
            .iter()
            .map(|(k, g)| (k.to_string(), g.get()))
            .collect();
        let histograms = self
            .histograms
            .read()
            .iter()
            .map(|(k, h)| (k.to_string(), h.summary()))
            .collect();

        MetricsSnapshot {
            timestamp: Utc::now(),
            counters,
            gauges,
            histograms,
            security_events: self.security_log.lock().len(),
        }
    }

    /// Flat `name value` lines for scraping.
    ///
    /// Histograms are exported as `_count`, `_min`, `_max`, `_mean`, `_p50`,
    /// `_p95` and `_p99` series.
    pub fn export_text(&self) -> String {
        let prefix = self.config.prefix.as_str();
        let mut lines = Vec::new();

        let counters: BTreeMap<MetricKey, u64> = self
            .counters
            .read()
            .iter()
            .map(|(k, c)| (k.clone(), c.get()))
            .collect();
        for (key, value) in counters {
            lines.push(format!("{} {}", key.render_with_suffix(prefix, ""), value));
        }

        let gauges: BTreeMap<MetricKey, f64> = self
            .gauges
            .read()
            .iter()
            .map(|(k, g)| (k.clone(), g.get()))
            .collect();
        for (key, value) in gauges {
            lines.push(format!("{} {}", key.render_with_suffix(prefix, ""), value));
        }

        let histograms: BTreeMap<MetricKey, HistogramSummary> = self
            .histograms
            .read()
            .iter()
            .map(|(k, h)| (k.clone(), h.summary()))
            .collect();
        for (key, s) in histograms {
            lines.push(format!("{} {}", key.render_with_suffix(prefix, "_count"), s.count));
            for (suffix, value) in [
                ("_min", s.min),
                ("_max", s.max),
                ("_mean", s.mean),
                ("_p50", s.p50),
                ("_p95", s.p95),
                ("_p99", s.p99),
            ] {
                lines.push(format!("{} {}", key.render_with_suffix(prefix, suffix), value));
            }
        }

        lines.join("\n")
    }

    /// Clears every metric and the security log.
    pub fn reset(&self) {
        self.counters.write().clear();
        self.gauges.write().clear();
        self.histograms.write().clear();
        self.security_log.lock().clear();
        self.rates.lock().clear();
    }
}

/// Records elapsed time into a histogram when dropped.
pub struct TimerGuard<'a> {
    metrics: &'a MetricsCollector,
    name: &'a str,
    start: Instant,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        let ms = self.start.elapsed().as_secs_f64() * 1000.0;
        self.metrics.observe(self.name, ms);
    }
}

/// A snapshot of metrics at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub counters: BTreeMap<String, u64>,
    pub gauges: BTreeMap<String, f64>,
    pub histograms: BTreeMap<String, HistogramSummary>,
    pub security_events: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;

    #[test]
    fn test_counter_increment() {
        let metrics = MetricsCollector::default();
        assert_eq!(metrics.counter("test_counter"), 0);

        metrics.increment("test_counter");
        assert_eq!(metrics.counter("test_counter"), 1);

        metrics.increment_by("test_counter", 5);
        assert_eq!(metrics.counter("test_counter"), 6);
    }

    #[test]
    fn test_labeled_counters_are_distinct() {
        let metrics = MetricsCollector::default();
        metrics.increment_with("delivery_errors_total", &[("handler", "storage")], 1);
        metrics.increment_with("delivery_errors_total", &[("handler", "training")], 2);

        assert_eq!(metrics.counter("delivery_errors_total"), 0);
        assert_eq!(
            metrics.counter_with("delivery_errors_total", &[("handler", "training")]),
            2
        );
        assert_eq!(metrics.counter_total("delivery_errors_total"), 3);
    }

    #[test]
    fn test_gauge_last_write_wins() {
        let metrics = MetricsCollector::default();
        assert_eq!(metrics.gauge("test_gauge"), 0.0);
        metrics.set_gauge("test_gauge", 42.5);
        metrics.set_gauge("test_gauge", 7.0);
        assert_eq!(metrics.gauge("test_gauge"), 7.0);
    }

    #[test]
    fn test_histogram_keeps_recent_window() {
        let metrics = MetricsCollector::new(MetricsConfig {
            history_size: 100,
            ..Default::default()
        });
        for v in 0..200 {
            metrics.observe("latency", v as f64);
        }

        let summary = metrics.histogram("latency");
        assert_eq!(summary.count, 100);
        assert_eq!(summary.min, 100.0);
        assert_eq!(summary.max, 199.0);
        assert_eq!(summary.p50, 150.0);
        assert_eq!(summary.p99, 199.0);
        assert!((summary.mean - 149.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_histogram_summary() {
        let metrics = MetricsCollector::default();
        assert_eq!(metrics.histogram("missing"), HistogramSummary::default());
    }

    #[test]
    fn test_timer_guard_records() {
        let metrics = MetricsCollector::default();
        {
            let _timer = metrics.start_timer("op_ms");
            thread::sleep(std::time::Duration::from_millis(2));
        }
        let summary = metrics.histogram("op_ms");
        assert_eq!(summary.count, 1);
        assert!(summary.min >= 1.0);
    }

    #[test]
    fn test_security_events() {
        let metrics = MetricsCollector::default();
        let details = json!({"error": "Invalid JSON format"});
        metrics.security_event("invalid_schema", "test_client_1", details.clone());

        assert_eq!(metrics.counter("security_events_invalid_schema_total"), 1);

        let events = metrics.security_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "invalid_schema");
        assert_eq!(events[0].client_id, "test_client_1");
        assert_eq!(events[0].details, details);
    }

    #[test]
    fn test_security_log_is_capped() {
        let metrics = MetricsCollector::new(MetricsConfig {
            security_log_size: 3,
            ..Default::default()
        });
        for i in 0..5 {
            metrics.security_event("rate_limit_exceeded", &format!("c{}", i), json!({}));
        }
        let events = metrics.security_events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].client_id, "c2");
        assert_eq!(metrics.counter("security_events_rate_limit_exceeded_total"), 5);
    }

    #[test]
    fn test_concurrent_increments() {
        let metrics = Arc::new(MetricsCollector::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = metrics.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        metrics.increment("events_received_total");
                        metrics.observe("message_processing_ms", 1.0);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(metrics.counter("events_received_total"), 8000);
        assert_eq!(metrics.histogram("message_processing_ms").count, 1000);
    }

    #[test]
    fn test_export_text() {
        let metrics = MetricsCollector::default();
        metrics.increment_by("events_received_total", 3);
        metrics.increment_with("delivery_errors_total", &[("handler", "storage")], 1);
        metrics.set_gauge("websocket_connections", 2.0);
        metrics.observe("batch_size", 5.0);

        let text = metrics.export_text();
        assert!(text.contains("gateway_events_received_total 3"));
        assert!(text.contains("gateway_delivery_errors_total{handler=\"storage\"} 1"));
        assert!(text.contains("gateway_websocket_connections 2"));
        assert!(text.contains("gateway_batch_size_count 1"));
        assert!(text.contains("gateway_batch_size_p95 5"));
    }

    #[test]
    fn test_snapshot_and_reset() {
        let metrics = MetricsCollector::default();
        metrics.increment("events_processed_total");
        metrics.observe("batch_size", 2.0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.counters["events_processed_total"], 1);
        assert_eq!(snapshot.histograms["batch_size"].count, 1);

        metrics.reset();
        assert_eq!(metrics.counter("events_processed_total"), 0);
        assert!(metrics.snapshot().counters.is_empty());
        let since = Utc::now() - chrono::Duration::seconds(60);
        assert_eq!(metrics.windowed_count(names::EVENTS_PROCESSED, since), 0);
    }

    #[test]
    fn test_windowed_count_tracks_health_counters_only() {
        let metrics = MetricsCollector::default();
        let since = Utc::now() - chrono::Duration::seconds(60);
        metrics.increment_by(names::EVENTS_RECEIVED, 4);
        metrics.increment_with(names::DELIVERY_ERRORS, &[("handler", "a")], 1);
        metrics.increment_with(names::DELIVERY_ERRORS, &[("handler", "b")], 2);
        metrics.increment_by(names::BATCHES_DISPATCHED, 9);

        assert_eq!(metrics.windowed_count(names::EVENTS_RECEIVED, since), 4);
        assert_eq!(metrics.windowed_count(names::DELIVERY_ERRORS, since), 3);
        assert_eq!(metrics.windowed_count(names::BATCHES_DISPATCHED, since), 0);
        assert_eq!(metrics.counter(names::BATCHES_DISPATCHED), 9);
    }
}
