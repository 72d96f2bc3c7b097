//! Compute execution with panic containment.

// std
use std::{any::Any, fmt::Debug, future::Future, panic::AssertUnwindSafe, pin::Pin};
// crates.io
use futures::FutureExt;
use tokio::sync::oneshot;
// self
use crate::{_prelude::*, error::ComputeError, registry::Registration};

/// Detached task accepted by a [`Spawner`].
pub type TaskFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Capability for running cache work in the background.
///
/// The cache spawns its per-key refresh loops and compute tasks through this trait, so embedders
/// can pin all cache work to a dedicated runtime.
pub trait Spawner: Debug + Send + Sync + 'static {
	/// Run `task` to completion in the background.
	fn spawn(&self, task: TaskFuture);
}

/// Default spawner backed by `tokio::spawn`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSpawner;
impl Spawner for TokioSpawner {
	fn spawn(&self, task: TaskFuture) {
		tokio::spawn(task);
	}
}

/// Runs registered compute functions and normalises their failures.
///
/// Publishing results is the scheduler's responsibility; the executor never touches the store.
#[derive(Clone, Debug)]
pub struct Executor {
	spawner: Arc<dyn Spawner>,
}
impl Executor {
	/// Create an executor dispatching onto `spawner`.
	pub fn new(spawner: Arc<dyn Spawner>) -> Self {
		Self { spawner }
	}

	/// The spawner this executor dispatches onto.
	pub fn spawner(&self) -> &Arc<dyn Spawner> {
		&self.spawner
	}

	/// Invoke the registration's compute function once.
	///
	/// Panics inside the function are contained and converted to [`ComputeError::Crashed`];
	/// ordinary failures pass through as [`ComputeError::Failed`].
	pub async fn execute<V>(
		&self,
		registration: &Registration<V>,
	) -> std::result::Result<Arc<V>, ComputeError>
	where
		V: Send + Sync + 'static,
	{
		let fut = (registration.compute)();
		let (result_tx, result_rx) = oneshot::channel();

		self.spawner.spawn(Box::pin(async move {
			let outcome = AssertUnwindSafe(fut).catch_unwind().await;
			let _ = result_tx.send(outcome);
		}));

		match result_rx.await {
			Ok(Ok(Ok(value))) => Ok(Arc::new(value)),
			Ok(Ok(Err(reason))) => Err(ComputeError::Failed(reason)),
			Ok(Err(panic)) => Err(ComputeError::Crashed(panic_message(panic))),
			Err(_) => Err(ComputeError::Crashed("Compute task dropped before completion.".into())),
		}
	}
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
	if let Some(message) = payload.downcast_ref::<&str>() {
		(*message).to_owned()
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message.clone()
	} else {
		"Non-string panic payload.".to_owned()
	}
}
