//! Metrics helpers and per-key telemetry bookkeeping.

// std
use std::sync::atomic::{AtomicU64, Ordering};
#[cfg(feature = "prometheus")] use std::sync::OnceLock;
// crates.io
use metrics::Label;
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
// self
use crate::_prelude::*;

type LabelSet = SmallVec<[Label; 2]>;

const METRIC_GETS_TOTAL: &str = "rehydrate_cache_gets_total";
const METRIC_HITS_TOTAL: &str = "rehydrate_cache_hits_total";
const METRIC_MISSES_TOTAL: &str = "rehydrate_cache_misses_total";
const METRIC_WAIT_TIMEOUTS_TOTAL: &str = "rehydrate_cache_wait_timeouts_total";
const METRIC_REFRESH_TOTAL: &str = "rehydrate_cache_refresh_total";
const METRIC_REFRESH_DURATION: &str = "rehydrate_cache_refresh_duration_seconds";
const METRIC_REFRESH_ERRORS: &str = "rehydrate_cache_refresh_errors_total";

/// Shared Prometheus handle installed by [`install_default_exporter`].
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Thread-safe telemetry accumulator for a single registered key.
#[derive(Debug, Default)]
pub struct KeyMetrics {
	total_gets: AtomicU64,
	store_hits: AtomicU64,
	waited_serves: AtomicU64,
	wait_timeouts: AtomicU64,
	refresh_successes: AtomicU64,
	refresh_errors: AtomicU64,
	last_refresh_micros: AtomicU64,
}
impl KeyMetrics {
	/// Create a new accumulator.
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Record a read served straight from the store.
	pub fn record_store_hit(&self) {
		self.total_gets.fetch_add(1, Ordering::Relaxed);
		self.store_hits.fetch_add(1, Ordering::Relaxed);
	}

	/// Record a read served after blocking on the waiter hub.
	pub fn record_wait_served(&self) {
		self.total_gets.fetch_add(1, Ordering::Relaxed);
		self.waited_serves.fetch_add(1, Ordering::Relaxed);
	}

	/// Record a read that reached its deadline unserved.
	pub fn record_wait_timeout(&self) {
		self.total_gets.fetch_add(1, Ordering::Relaxed);
		self.wait_timeouts.fetch_add(1, Ordering::Relaxed);
	}

	/// Record a successful refresh and its latency.
	pub fn record_refresh_success(&self, duration: Duration) {
		self.refresh_successes.fetch_add(1, Ordering::Relaxed);
		self.last_refresh_micros.store(duration.as_micros() as u64, Ordering::Relaxed);
	}

	/// Record a failed refresh.
	pub fn record_refresh_error(&self) {
		self.refresh_errors.fetch_add(1, Ordering::Relaxed);
	}

	/// Take a point-in-time snapshot for status reporting.
	pub fn snapshot(&self) -> KeyMetricsSnapshot {
		KeyMetricsSnapshot {
			total_gets: self.total_gets.load(Ordering::Relaxed),
			store_hits: self.store_hits.load(Ordering::Relaxed),
			waited_serves: self.waited_serves.load(Ordering::Relaxed),
			wait_timeouts: self.wait_timeouts.load(Ordering::Relaxed),
			refresh_successes: self.refresh_successes.load(Ordering::Relaxed),
			refresh_errors: self.refresh_errors.load(Ordering::Relaxed),
			last_refresh_micros: match self.last_refresh_micros.load(Ordering::Relaxed) {
				0 => None,
				value => Some(value),
			},
		}
	}
}

/// Read-only snapshot of per-key telemetry counters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyMetricsSnapshot {
	/// Total number of reads observed.
	pub total_gets: u64,
	/// Reads served straight from the store.
	pub store_hits: u64,
	/// Reads served after blocking for a recompute.
	pub waited_serves: u64,
	/// Reads that reached their deadline unserved.
	pub wait_timeouts: u64,
	/// Successful refresh operations.
	pub refresh_successes: u64,
	/// Refresh attempts that failed.
	pub refresh_errors: u64,
	/// Microsecond latency of the most recent successful refresh.
	pub last_refresh_micros: Option<u64>,
}
impl KeyMetricsSnapshot {
	/// Share of reads served without blocking.
	pub fn hit_rate(&self) -> f64 {
		if self.total_gets == 0 {
			0.0
		} else {
			self.store_hits as f64 / self.total_gets as f64
		}
	}
}

#[cfg(feature = "prometheus")]
/// Install the default Prometheus recorder backed by `metrics`.
///
/// Multiple invocations are safe; subsequent calls become no-ops once the recorder is installed.
pub fn install_default_exporter() -> Result<()> {
	if PROMETHEUS_HANDLE.get().is_some() {
		return Ok(());
	}

	let handle =
		PrometheusBuilder::new().install_recorder().map_err(|err| Error::Metrics(err.to_string()))?;
	let _ = PROMETHEUS_HANDLE.set(handle);

	Ok(())
}

#[cfg(feature = "prometheus")]
/// Access the global Prometheus exporter handle when installed.
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
	PROMETHEUS_HANDLE.get()
}

/// Record a read served straight from the store.
pub fn record_get_hit(key: &str) {
	let labels = key_labels(key);

	metrics::counter!(METRIC_GETS_TOTAL, labels.iter()).increment(1);
	metrics::counter!(METRIC_HITS_TOTAL, labels.iter()).increment(1);
}

/// Record a read that had to block on the next recompute.
pub fn record_get_miss(key: &str) {
	let labels = key_labels(key);

	metrics::counter!(METRIC_GETS_TOTAL, labels.iter()).increment(1);
	metrics::counter!(METRIC_MISSES_TOTAL, labels.iter()).increment(1);
}

/// Record a blocked read that reached its deadline unserved.
pub fn record_wait_timeout(key: &str) {
	metrics::counter!(METRIC_WAIT_TIMEOUTS_TOTAL, key_labels(key).iter()).increment(1);
}

/// Record a successful refresh along with its latency.
pub fn record_refresh_success(key: &str, duration: Duration) {
	metrics::counter!(METRIC_REFRESH_TOTAL, status_labels(key, "success").iter()).increment(1);
	metrics::histogram!(METRIC_REFRESH_DURATION, key_labels(key).iter())
		.record(duration.as_secs_f64());
}

/// Record a failed refresh.
pub fn record_refresh_error(key: &str) {
	metrics::counter!(METRIC_REFRESH_TOTAL, status_labels(key, "error").iter()).increment(1);
	metrics::counter!(METRIC_REFRESH_ERRORS, key_labels(key).iter()).increment(1);
}

fn key_labels(key: &str) -> LabelSet {
	let mut labels = LabelSet::with_capacity(1);

	labels.push(Label::new("key", key.to_owned()));

	labels
}

fn status_labels(key: &str, status: &'static str) -> LabelSet {
	let mut labels = key_labels(key);

	labels.push(Label::new("status", status));

	labels
}
