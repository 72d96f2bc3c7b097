//! Clock capability used for all freshness arithmetic.
//!
//! Every time read inside the engine goes through [`Clock`] so TTL boundaries can be tested
//! deterministically without real sleeps.

// std
use std::{
	fmt::Debug,
	sync::atomic::{AtomicI64, Ordering},
};
// crates.io
use tokio::time::Instant;

/// Monotonic time source measured in whole seconds since an arbitrary epoch.
pub trait Clock: Debug + Send + Sync + 'static {
	/// Current reading in seconds. Readings never decrease.
	fn now_seconds(&self) -> i64;
}

/// Default clock anchored to the tokio runtime's monotonic [`Instant`].
///
/// Under `tokio::time::pause` the reading advances with virtual time, so timing tests driven by
/// `tokio::time::advance` observe the same seconds the scheduler does.
#[derive(Clone, Debug)]
pub struct TokioClock {
	epoch: Instant,
}
impl TokioClock {
	/// Anchor a new clock at the current instant.
	pub fn new() -> Self {
		Self { epoch: Instant::now() }
	}
}
impl Clock for TokioClock {
	fn now_seconds(&self) -> i64 {
		self.epoch.elapsed().as_secs() as i64
	}
}
impl Default for TokioClock {
	fn default() -> Self {
		Self::new()
	}
}

/// Manually driven clock for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
	now: AtomicI64,
}
impl ManualClock {
	/// Create a clock pinned at `now` seconds.
	pub fn new(now: i64) -> Self {
		Self { now: AtomicI64::new(now) }
	}

	/// Advance the reading by `seconds`.
	pub fn advance(&self, seconds: i64) {
		self.now.fetch_add(seconds, Ordering::SeqCst);
	}

	/// Pin the reading to an absolute value.
	pub fn set(&self, seconds: i64) {
		self.now.store(seconds, Ordering::SeqCst);
	}
}
impl Clock for ManualClock {
	fn now_seconds(&self) -> i64 {
		self.now.load(Ordering::SeqCst)
	}
}
