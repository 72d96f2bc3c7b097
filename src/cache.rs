//! Cache facade orchestrating the registry, store, scheduler, and waiter hub.

// std
use std::{
	collections::HashMap,
	fmt::{self, Debug, Formatter},
	future::Future,
};
// crates.io
use serde::Serialize;
use tokio::time;
// self
use crate::{
	_prelude::*,
	clock::TokioClock,
	executor::{Executor, Spawner, TokioSpawner},
	metrics::{self, KeyMetricsSnapshot},
	registry::{ComputeResult, KeyEntry, Registration, RegistrationConfig, Registry},
	scheduler::{
		state::WorkerStatus,
		worker::{self, WorkerContext},
	},
	store::Store,
	waiter::{WaitOutcome, WaiterHub},
};

/// Builder for [`Cache`] enabling capability injection.
#[derive(Debug)]
pub struct CacheBuilder {
	clock: Arc<dyn Clock>,
	spawner: Arc<dyn Spawner>,
}
impl CacheBuilder {
	/// Create a builder carrying the default clock and spawner.
	pub fn new() -> Self {
		Self { clock: Arc::new(TokioClock::new()), spawner: Arc::new(TokioSpawner) }
	}

	/// Replace the clock capability (primarily for tests).
	pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Replace the spawner that runs refresh workers and compute tasks.
	pub fn spawner(mut self, spawner: Arc<dyn Spawner>) -> Self {
		self.spawner = spawner;

		self
	}

	/// Finalise the configuration and construct a [`Cache`].
	pub fn build<V>(self) -> Cache<V>
	where
		V: Send + Sync + 'static,
	{
		Cache {
			clock: self.clock.clone(),
			executor: Executor::new(self.spawner),
			registry: Arc::new(Registry::new()),
			store: Arc::new(Store::new(self.clock)),
			waiters: Arc::new(WaiterHub::new()),
		}
	}
}
impl Default for CacheBuilder {
	fn default() -> Self {
		Self::new()
	}
}

/// Periodic self-rehydrating cache.
///
/// Each registered key gets its own refresh worker that recomputes the function on schedule and
/// publishes successful results; readers either hit the stored value or coalesce on the next
/// in-flight recomputation. Cloning shares the same underlying cache. Dropping the cache without
/// [`Cache::shutdown`] leaves detached workers running until the runtime itself stops.
pub struct Cache<V> {
	clock: Arc<dyn Clock>,
	executor: Executor,
	registry: Arc<Registry<V>>,
	store: Arc<Store<V>>,
	waiters: Arc<WaiterHub<V>>,
}
impl<V> Cache<V>
where
	V: Send + Sync + 'static,
{
	/// Create a cache with default capabilities.
	pub fn new() -> Self {
		Self::builder().build()
	}

	/// Create a [`CacheBuilder`] for capability injection.
	pub fn builder() -> CacheBuilder {
		CacheBuilder::new()
	}

	/// Register `compute` under `key` and start its periodic refresh worker.
	///
	/// The worker triggers the first compute immediately; this call returns once the worker has
	/// been started, not once the first result lands. When racing registrations collide on one
	/// key, exactly one wins and the losers observe `AlreadyRegistered` with no side effects.
	pub async fn register_function<F, Fut>(
		&self,
		key: impl Into<String>,
		config: RegistrationConfig,
		compute: F,
	) -> Result<()>
	where
		F: Fn() -> Fut + Send + Sync + 'static,
		Fut: Future<Output = ComputeResult<V>> + Send + 'static,
	{
		let registration = Registration::new(key, config, compute);

		registration.validate()?;

		let entry = KeyEntry::new(registration);

		self.registry.insert(entry.clone()).await?;

		let ctx = WorkerContext {
			registration: entry.registration.clone(),
			state: entry.state.clone(),
			clock: self.clock.clone(),
			executor: self.executor.clone(),
			store: self.store.clone(),
			waiters: self.waiters.clone(),
			metrics: entry.metrics.clone(),
		};

		self.executor.spawner().spawn(Box::pin(worker::supervise(ctx)));

		tracing::debug!(key = %entry.registration.key, "registered function");

		Ok(())
	}

	/// Freshest value for `key`, waiting up to `timeout` when no fresh value is stored.
	///
	/// The last stored value is returned immediately even while a recomputation is in flight. A
	/// key that has never computed successfully blocks the caller until the first success, a
	/// deregistration, or the deadline, whichever comes first.
	pub async fn get(&self, key: &str, timeout: Duration) -> Result<Arc<V>> {
		if let Some(value) = self.store.get(key).await {
			self.observe_hit(key).await;

			return Ok(value);
		}

		let Some(entry) = self.registry.get(key).await else {
			return Err(Error::NotRegistered { key: key.to_owned() });
		};
		let waiter = self.waiters.subscribe(key).await;

		// Between the store miss and the subscription a publish or a deregistration may have
		// landed; one re-check closes both races.
		if self.registry.get(key).await.is_none() {
			return Err(Error::NotRegistered { key: key.to_owned() });
		}
		if let Some(value) = self.store.get(key).await {
			entry.metrics.record_store_hit();
			metrics::record_get_hit(key);

			return Ok(value);
		}

		metrics::record_get_miss(key);

		match time::timeout(timeout, waiter).await {
			Ok(Ok(WaitOutcome::Value(value))) => {
				entry.metrics.record_wait_served();

				Ok(value)
			},
			Ok(Ok(WaitOutcome::Deregistered)) | Ok(Err(_)) =>
				Err(Error::NotRegistered { key: key.to_owned() }),
			Err(_) => {
				entry.metrics.record_wait_timeout();
				metrics::record_wait_timeout(key);

				Err(Error::Timeout { key: key.to_owned(), waited: timeout })
			},
		}
	}

	/// Tear down the worker for `key` and release its blocked readers with `NotRegistered`.
	///
	/// An in-flight compute runs to completion but its result is discarded. The stored slot is
	/// not deleted eagerly; it expires on its own TTL.
	pub async fn deregister(&self, key: &str) -> Result<()> {
		let Some(entry) = self.registry.remove(key).await else {
			return Err(Error::NotRegistered { key: key.to_owned() });
		};

		entry.state.request_stop();
		self.waiters.drain(key).await;

		tracing::debug!(key = %key, "deregistered function");

		Ok(())
	}

	/// All currently fresh entries.
	pub async fn snapshot(&self) -> HashMap<String, Arc<V>> {
		self.store.snapshot().await
	}

	/// Status projection for a registered key.
	pub async fn status(&self, key: &str) -> Result<KeyStatus> {
		let entry = self
			.registry
			.get(key)
			.await
			.ok_or_else(|| Error::NotRegistered { key: key.to_owned() })?;

		Ok(self.status_of(&entry).await)
	}

	/// Status projections for every registered key.
	pub async fn statuses(&self) -> Vec<KeyStatus> {
		let entries = self.registry.entries().await;
		let mut statuses = Vec::with_capacity(entries.len());

		for entry in entries {
			statuses.push(self.status_of(&entry).await);
		}

		statuses
	}

	/// Deregister every key and stop all workers.
	pub async fn shutdown(&self) {
		for key in self.registry.keys().await {
			let _ = self.deregister(&key).await;
		}

		tracing::debug!("cache shut down");
	}

	async fn status_of(&self, entry: &KeyEntry<V>) -> KeyStatus {
		let now = self.clock.now_seconds();
		let slot = self.store.slot(&entry.registration.key).await;

		KeyStatus {
			key: entry.registration.key.clone(),
			worker: entry.state.status(),
			config: entry.registration.config,
			last_refresh: slot.as_ref().map(|slot| slot.refreshed_at),
			expires_in_seconds: slot
				.as_ref()
				.filter(|slot| slot.is_fresh(now))
				.map(|slot| slot.expires_at - now),
			next_refresh_in_seconds: entry.state.sleeping_until().map(|until| (until - now).max(0)),
			running_for_seconds: entry.state.in_flight_started_at().map(|since| (now - since).max(0)),
			metrics: entry.metrics.snapshot(),
		}
	}

	async fn observe_hit(&self, key: &str) {
		if let Some(entry) = self.registry.get(key).await {
			entry.metrics.record_store_hit();
		}

		metrics::record_get_hit(key);
	}
}
impl<V> Clone for Cache<V> {
	fn clone(&self) -> Self {
		Self {
			clock: self.clock.clone(),
			executor: self.executor.clone(),
			registry: self.registry.clone(),
			store: self.store.clone(),
			waiters: self.waiters.clone(),
		}
	}
}
impl<V> Debug for Cache<V> {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		f.debug_struct("Cache")
			.field("clock", &self.clock)
			.field("executor", &self.executor)
			.finish_non_exhaustive()
	}
}
impl<V> Default for Cache<V>
where
	V: Send + Sync + 'static,
{
	fn default() -> Self {
		Self::new()
	}
}

/// Status projection for a registered key.
#[derive(Clone, Debug, Serialize)]
pub struct KeyStatus {
	/// Key the status describes.
	pub key: String,
	/// Worker lifecycle state at capture time.
	pub worker: WorkerStatus,
	/// Freshness and cadence settings of the registration.
	pub config: RegistrationConfig,
	/// Wall-clock timestamp of the most recent successful refresh.
	pub last_refresh: Option<DateTime<Utc>>,
	/// Seconds until the stored value expires; `None` when nothing fresh is stored.
	pub expires_in_seconds: Option<i64>,
	/// Seconds until the next compute starts, present while the worker sleeps.
	pub next_refresh_in_seconds: Option<i64>,
	/// Seconds the in-flight compute has been running, present while the worker computes.
	pub running_for_seconds: Option<i64>,
	/// Telemetry counters captured for the key.
	pub metrics: KeyMetricsSnapshot,
}
