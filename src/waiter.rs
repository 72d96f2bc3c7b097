//! Rendezvous between blocked readers and the next successful compute.

// std
use std::{
	collections::HashMap,
	fmt::{self, Debug, Formatter},
};
// crates.io
use tokio::sync::{Mutex, oneshot};
// self
use crate::_prelude::*;

type Waiters<V> = Vec<oneshot::Sender<WaitOutcome<V>>>;

/// Outcome delivered to a subscribed reader.
pub enum WaitOutcome<V> {
	/// The next compute for the key succeeded.
	Value(Arc<V>),
	/// The key was deregistered while the reader was blocked.
	Deregistered,
}
impl<V> Debug for WaitOutcome<V> {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		match self {
			Self::Value(_) => f.write_str("Value"),
			Self::Deregistered => f.write_str("Deregistered"),
		}
	}
}

/// Per-key sets of pending readers awaiting the next successful result.
///
/// Publishing swaps a key's pending list out under the lock and delivers outside it, so every
/// waiter is released exactly once: by a publish, by deregistration, or by its own deadline
/// (dropping the receiving half).
pub struct WaiterHub<V> {
	pending: Mutex<HashMap<String, Waiters<V>>>,
}
impl<V> WaiterHub<V> {
	/// Create an empty hub.
	pub fn new() -> Self {
		Self { pending: Mutex::new(HashMap::new()) }
	}

	/// Enqueue a waiter for `key`, returning the receiving half.
	pub async fn subscribe(&self, key: &str) -> oneshot::Receiver<WaitOutcome<V>> {
		let (waiter_tx, waiter_rx) = oneshot::channel();

		self.pending.lock().await.entry(key.to_owned()).or_default().push(waiter_tx);

		waiter_rx
	}

	/// Wake every reader currently pending on `key` with the same value.
	pub async fn publish_value(&self, key: &str, value: &Arc<V>) {
		for waiter in self.take(key).await {
			// Readers whose deadline fired have hung up; the send is simply discarded.
			let _ = waiter.send(WaitOutcome::Value(value.clone()));
		}
	}

	/// Release every reader pending on `key` because its registration is gone.
	pub async fn drain(&self, key: &str) {
		for waiter in self.take(key).await {
			let _ = waiter.send(WaitOutcome::Deregistered);
		}
	}

	async fn take(&self, key: &str) -> Waiters<V> {
		self.pending.lock().await.remove(key).unwrap_or_default()
	}
}
impl<V> Debug for WaiterHub<V> {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		f.debug_struct("WaiterHub").finish_non_exhaustive()
	}
}
impl<V> Default for WaiterHub<V> {
	fn default() -> Self {
		Self::new()
	}
}
