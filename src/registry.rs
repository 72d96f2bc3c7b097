//! Function registrations, parameter validation, and the live-key table.

// std
use std::{
	collections::HashMap,
	fmt::{self, Debug, Formatter},
	future::Future,
	pin::Pin,
};
// crates.io
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
// self
use crate::{_prelude::*, metrics::KeyMetrics, scheduler::state::WorkerState};

/// Boxed error type accepted from compute functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
/// Outcome of a single compute invocation.
pub type ComputeResult<V> = std::result::Result<V, BoxError>;
/// Boxed future produced by a compute function.
pub type ComputeFuture<V> = Pin<Box<dyn Future<Output = ComputeResult<V>> + Send>>;
/// Zero-argument compute function registered under a key.
pub type ComputeFn<V> = Arc<dyn Fn() -> ComputeFuture<V> + Send + Sync>;

/// Freshness and cadence settings for a registered key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationConfig {
	/// Seconds a successful result stays fresh after its write. Must be positive.
	pub ttl_seconds: i64,
	/// Seconds between the end of one compute and the start of the next.
	///
	/// Must be non-negative and strictly less than `ttl_seconds`, so a healthy key can always
	/// replace its value before expiry.
	pub refresh_interval_seconds: i64,
}
impl RegistrationConfig {
	/// Bundle TTL and refresh interval settings.
	pub fn new(ttl_seconds: i64, refresh_interval_seconds: i64) -> Self {
		Self { ttl_seconds, refresh_interval_seconds }
	}

	/// Validate the TTL/interval contract.
	pub fn validate(&self) -> Result<()> {
		if self.ttl_seconds <= 0 {
			return Err(Error::Validation {
				field: "ttl_seconds",
				reason: "Must be positive.".into(),
			});
		}
		if self.refresh_interval_seconds < 0 {
			return Err(Error::Validation {
				field: "refresh_interval_seconds",
				reason: "Must not be negative.".into(),
			});
		}
		if self.refresh_interval_seconds >= self.ttl_seconds {
			return Err(Error::Validation {
				field: "refresh_interval_seconds",
				reason: "Must be strictly less than ttl_seconds.".into(),
			});
		}

		Ok(())
	}

	/// TTL as a [`Duration`].
	pub fn ttl(&self) -> Duration {
		Duration::from_secs(self.ttl_seconds as u64)
	}

	/// Refresh interval as a [`Duration`].
	pub fn interval(&self) -> Duration {
		Duration::from_secs(self.refresh_interval_seconds as u64)
	}
}

/// Immutable description of a registered compute function.
pub struct Registration<V> {
	/// Key the function is registered under.
	pub key: String,
	/// Zero-argument function producing the cached value.
	pub compute: ComputeFn<V>,
	/// Freshness and cadence settings.
	pub config: RegistrationConfig,
}
impl<V> Registration<V> {
	/// Describe a compute function under `key` with the given settings.
	pub fn new<F, Fut>(key: impl Into<String>, config: RegistrationConfig, compute: F) -> Self
	where
		F: Fn() -> Fut + Send + Sync + 'static,
		Fut: Future<Output = ComputeResult<V>> + Send + 'static,
	{
		let compute: ComputeFn<V> = Arc::new(move || -> ComputeFuture<V> { Box::pin(compute()) });

		Self { key: key.into(), compute, config }
	}

	/// Validate the registration against the documented constraints.
	pub fn validate(&self) -> Result<()> {
		if self.key.is_empty() {
			return Err(Error::Validation { field: "key", reason: "Must not be empty.".into() });
		}

		self.config.validate()
	}
}
impl<V> Debug for Registration<V> {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		f.debug_struct("Registration")
			.field("key", &self.key)
			.field("config", &self.config)
			.finish_non_exhaustive()
	}
}

/// Everything the cache tracks for one live key.
pub struct KeyEntry<V> {
	/// The registration driving the key's worker.
	pub registration: Arc<Registration<V>>,
	/// Worker lifecycle state shared with the scheduler loop.
	pub state: Arc<WorkerState>,
	/// Per-key telemetry accumulator.
	pub metrics: Arc<KeyMetrics>,
}
impl<V> KeyEntry<V> {
	/// Bundle a validated registration with fresh worker state.
	pub fn new(registration: Registration<V>) -> Arc<Self> {
		Arc::new(Self {
			registration: Arc::new(registration),
			state: Arc::new(WorkerState::new()),
			metrics: KeyMetrics::new(),
		})
	}
}
impl<V> Debug for KeyEntry<V> {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		f.debug_struct("KeyEntry")
			.field("registration", &self.registration)
			.field("state", &self.state)
			.finish_non_exhaustive()
	}
}

/// Table mapping keys to live entries.
pub struct Registry<V> {
	entries: RwLock<HashMap<String, Arc<KeyEntry<V>>>>,
}
impl<V> Registry<V> {
	/// Create an empty registry.
	pub fn new() -> Self {
		Self { entries: RwLock::new(HashMap::new()) }
	}

	/// Insert `entry` only if its key is absent.
	///
	/// A losing racer observes `AlreadyRegistered` and no state change.
	pub async fn insert(&self, entry: Arc<KeyEntry<V>>) -> Result<()> {
		let key = entry.registration.key.clone();
		let mut entries = self.entries.write().await;

		if entries.contains_key(&key) {
			return Err(Error::AlreadyRegistered { key });
		}

		entries.insert(key, entry);

		Ok(())
	}

	/// Entry registered under `key`, if any.
	pub async fn get(&self, key: &str) -> Option<Arc<KeyEntry<V>>> {
		self.entries.read().await.get(key).cloned()
	}

	/// Remove and return the entry under `key`, if any.
	pub async fn remove(&self, key: &str) -> Option<Arc<KeyEntry<V>>> {
		self.entries.write().await.remove(key)
	}

	/// Keys with a live registration.
	pub async fn keys(&self) -> Vec<String> {
		self.entries.read().await.keys().cloned().collect()
	}

	/// All live entries.
	pub async fn entries(&self) -> Vec<Arc<KeyEntry<V>>> {
		self.entries.read().await.values().cloned().collect()
	}
}
impl<V> Debug for Registry<V> {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		f.debug_struct("Registry").finish_non_exhaustive()
	}
}
impl<V> Default for Registry<V> {
	fn default() -> Self {
		Self::new()
	}
}
