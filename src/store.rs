//! Keyed result store with TTL-based freshness.

// std
use std::{
	collections::HashMap,
	fmt::{self, Debug, Formatter},
};
// crates.io
use tokio::sync::RwLock;
// self
use crate::_prelude::*;

/// Slot recording the most recent successful compute for a key.
pub struct Slot<V> {
	/// Last successful result.
	pub value: Arc<V>,
	/// Clock second at which the value ceases to be fresh.
	pub expires_at: i64,
	/// Clock second of the write.
	pub last_refresh_at: i64,
	/// Wall-clock timestamp of the write, kept for status reporting only.
	pub refreshed_at: DateTime<Utc>,
}
impl<V> Slot<V> {
	/// Whether the slot is still fresh at the given clock reading.
	pub fn is_fresh(&self, now: i64) -> bool {
		self.expires_at > now
	}
}
impl<V> Clone for Slot<V> {
	fn clone(&self) -> Self {
		Self {
			value: self.value.clone(),
			expires_at: self.expires_at,
			last_refresh_at: self.last_refresh_at,
			refreshed_at: self.refreshed_at,
		}
	}
}
impl<V> Debug for Slot<V> {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		f.debug_struct("Slot")
			.field("expires_at", &self.expires_at)
			.field("last_refresh_at", &self.last_refresh_at)
			.field("refreshed_at", &self.refreshed_at)
			.finish_non_exhaustive()
	}
}

/// Concurrent key-to-slot table.
///
/// Freshness is evaluated against the injected clock on every read; expired slots read as absent
/// and are swept opportunistically on writes rather than eagerly.
pub struct Store<V> {
	clock: Arc<dyn Clock>,
	slots: RwLock<HashMap<String, Slot<V>>>,
}
impl<V> Store<V>
where
	V: Send + Sync + 'static,
{
	/// Create an empty store reading time from `clock`.
	pub fn new(clock: Arc<dyn Clock>) -> Self {
		Self { clock, slots: RwLock::new(HashMap::new()) }
	}

	/// Record a successful compute, overwriting any prior slot for `key`.
	pub async fn put(&self, key: &str, value: Arc<V>, ttl_seconds: i64) {
		let now = self.clock.now_seconds();
		let slot = Slot {
			value,
			expires_at: now + ttl_seconds,
			last_refresh_at: now,
			refreshed_at: Utc::now(),
		};
		let mut slots = self.slots.write().await;

		slots.retain(|_, slot| slot.is_fresh(now));
		slots.insert(key.to_owned(), slot);
	}

	/// Fresh value for `key`, if any.
	pub async fn get(&self, key: &str) -> Option<Arc<V>> {
		let now = self.clock.now_seconds();
		let slots = self.slots.read().await;

		slots.get(key).filter(|slot| slot.is_fresh(now)).map(|slot| slot.value.clone())
	}

	/// Slot metadata for `key`, fresh or not, for status reporting.
	pub async fn slot(&self, key: &str) -> Option<Slot<V>> {
		self.slots.read().await.get(key).cloned()
	}

	/// All currently fresh entries.
	pub async fn snapshot(&self) -> HashMap<String, Arc<V>> {
		let now = self.clock.now_seconds();

		self.slots
			.read()
			.await
			.iter()
			.filter(|(_, slot)| slot.is_fresh(now))
			.map(|(key, slot)| (key.clone(), slot.value.clone()))
			.collect()
	}
}
impl<V> Debug for Store<V> {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		f.debug_struct("Store").field("clock", &self.clock).finish_non_exhaustive()
	}
}
