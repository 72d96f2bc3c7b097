//! Worker lifecycle bookkeeping.

// std
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, Ordering};
// crates.io
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

const STATUS_IDLE: u8 = 0;
const STATUS_RUNNING: u8 = 1;
const STATUS_SLEEPING: u8 = 2;
const STATUS_STOPPING: u8 = 3;

/// Lifecycle states for a per-key refresh worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum WorkerStatus {
	/// Worker created; the first compute has not started yet.
	Idle,
	/// A compute is in flight.
	Running,
	/// Waiting out the refresh interval before the next compute.
	Sleeping,
	/// Teardown requested; the loop exits at its next transition.
	Stopping,
}

/// Shared mutable state for one key's worker.
#[derive(Debug, Default)]
pub struct WorkerState {
	status: AtomicU8,
	in_flight_started_at: AtomicI64,
	sleeping_until: AtomicI64,
	stopping: AtomicBool,
	stop_notify: Notify,
}
impl WorkerState {
	/// Create state for a freshly registered key.
	pub fn new() -> Self {
		Self::default()
	}

	/// Current lifecycle status.
	pub fn status(&self) -> WorkerStatus {
		match self.status.load(Ordering::SeqCst) {
			STATUS_RUNNING => WorkerStatus::Running,
			STATUS_SLEEPING => WorkerStatus::Sleeping,
			STATUS_STOPPING => WorkerStatus::Stopping,
			_ => WorkerStatus::Idle,
		}
	}

	/// Mark a compute as started at clock second `now`.
	pub fn begin_compute(&self, now: i64) {
		self.in_flight_started_at.store(now, Ordering::SeqCst);
		self.status.store(STATUS_RUNNING, Ordering::SeqCst);
	}

	/// Mark the worker asleep until clock second `until`.
	pub fn begin_sleep(&self, until: i64) {
		self.sleeping_until.store(until, Ordering::SeqCst);
		self.status.store(STATUS_SLEEPING, Ordering::SeqCst);
	}

	/// Start second of the in-flight compute, valid only while `Running`.
	pub fn in_flight_started_at(&self) -> Option<i64> {
		(self.status() == WorkerStatus::Running)
			.then(|| self.in_flight_started_at.load(Ordering::SeqCst))
	}

	/// Scheduled wake-up second, valid only while `Sleeping`.
	pub fn sleeping_until(&self) -> Option<i64> {
		(self.status() == WorkerStatus::Sleeping)
			.then(|| self.sleeping_until.load(Ordering::SeqCst))
	}

	/// Request teardown.
	///
	/// Cancels a pending sleep and suppresses publication of a compute that is still in flight.
	pub fn request_stop(&self) {
		self.stopping.store(true, Ordering::SeqCst);
		self.status.store(STATUS_STOPPING, Ordering::SeqCst);
		// The stored permit wakes the loop even when it has not yet reached its select.
		self.stop_notify.notify_one();
	}

	/// Whether teardown has been requested.
	pub fn is_stopping(&self) -> bool {
		self.stopping.load(Ordering::SeqCst)
	}

	/// Record the terminal status once the loop has exited.
	pub fn mark_stopped(&self) {
		self.status.store(STATUS_STOPPING, Ordering::SeqCst);
	}

	/// Resolve once teardown has been requested.
	pub async fn stopped(&self) {
		if self.is_stopping() {
			return;
		}

		self.stop_notify.notified().await;
	}
}
