//! Per-key periodic refresh loop.

// std
use std::{
	fmt::{self, Debug, Formatter},
	panic::AssertUnwindSafe,
};
// crates.io
use futures::FutureExt;
use tokio::time;
// self
use crate::{
	_prelude::*,
	executor::Executor,
	metrics::{self, KeyMetrics},
	registry::Registration,
	scheduler::state::WorkerState,
	store::Store,
	waiter::WaiterHub,
};

/// Everything a refresh worker needs to drive one key.
pub struct WorkerContext<V> {
	/// Registration the worker recomputes.
	pub registration: Arc<Registration<V>>,
	/// Lifecycle state shared with the facade.
	pub state: Arc<WorkerState>,
	/// Clock for freshness arithmetic.
	pub clock: Arc<dyn Clock>,
	/// Executor running the compute function.
	pub executor: Executor,
	/// Store receiving successful results.
	pub store: Arc<Store<V>>,
	/// Hub waking readers blocked on this key.
	pub waiters: Arc<WaiterHub<V>>,
	/// Per-key telemetry accumulator.
	pub metrics: Arc<KeyMetrics>,
}
impl<V> Clone for WorkerContext<V> {
	fn clone(&self) -> Self {
		Self {
			registration: self.registration.clone(),
			state: self.state.clone(),
			clock: self.clock.clone(),
			executor: self.executor.clone(),
			store: self.store.clone(),
			waiters: self.waiters.clone(),
			metrics: self.metrics.clone(),
		}
	}
}
impl<V> Debug for WorkerContext<V> {
	fn fmt(&self, f: &mut Formatter) -> fmt::Result {
		f.debug_struct("WorkerContext")
			.field("registration", &self.registration)
			.field("state", &self.state)
			.finish_non_exhaustive()
	}
}

/// Supervise the worker loop for one key, restarting it if it ever crashes.
///
/// The worker state and registration survive a restart; only the abandoned iteration is lost.
pub async fn supervise<V>(ctx: WorkerContext<V>)
where
	V: Send + Sync + 'static,
{
	loop {
		let attempt = AssertUnwindSafe(run(ctx.clone())).catch_unwind().await;

		if attempt.is_ok() || ctx.state.is_stopping() {
			break;
		}

		tracing::error!(key = %ctx.registration.key, "refresh worker crashed; restarting");
	}
}

/// Drive the periodic compute loop for one key until teardown.
///
/// The refresh interval measures end-of-compute to start-of-next, so a long compute never
/// overlaps itself. Readers never reach this loop; they only subscribe to the waiter hub.
pub async fn run<V>(ctx: WorkerContext<V>)
where
	V: Send + Sync + 'static,
{
	let key = ctx.registration.key.clone();
	let config = ctx.registration.config;
	let interval = config.interval();

	tracing::debug!(key = %key, ttl = config.ttl_seconds, interval = config.refresh_interval_seconds, "refresh worker started");

	loop {
		if ctx.state.is_stopping() {
			break;
		}

		ctx.state.begin_compute(ctx.clock.now_seconds());

		let started = Instant::now();
		let outcome = ctx.executor.execute(&ctx.registration).await;

		// A deregistration that landed mid-compute discards the result unseen.
		if ctx.state.is_stopping() {
			break;
		}

		match outcome {
			Ok(value) => {
				ctx.store.put(&key, value.clone(), config.ttl_seconds).await;
				ctx.waiters.publish_value(&key, &value).await;
				ctx.metrics.record_refresh_success(started.elapsed());
				metrics::record_refresh_success(&key, started.elapsed());

				tracing::debug!(key = %key, "published refreshed value");
			},
			Err(err) => {
				// The previous slot, if any, keeps serving until its own expiry; blocked
				// readers hold on for the next success or their own deadline.
				ctx.metrics.record_refresh_error();
				metrics::record_refresh_error(&key);

				tracing::warn!(key = %key, error = %err, "compute failed; retaining last stored value");
			},
		}

		ctx.state.begin_sleep(ctx.clock.now_seconds() + config.refresh_interval_seconds);

		tokio::select! {
			_ = ctx.state.stopped() => break,
			_ = time::sleep(interval) => {},
		}
	}

	ctx.state.mark_stopped();

	tracing::debug!(key = %key, "refresh worker stopped");
}
