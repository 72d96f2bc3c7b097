//! Periodic self-rehydrating cache: register zero-argument compute functions under named keys,
//! let per-key refresh workers recompute them on schedule, and serve the last successful value
//! to concurrent readers with bounded latency.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod clock;
pub mod executor;
pub mod metrics;

mod cache;
mod error;
mod registry;
mod scheduler;
mod store;
mod waiter;
mod _prelude {
	pub use std::{sync::Arc, time::Duration};

	pub use chrono::{DateTime, Utc};
	pub use tokio::time::Instant;

	pub use crate::{Error, Result, clock::Clock};
}
#[cfg(feature = "prometheus")] pub use crate::metrics::install_default_exporter;
pub use crate::{
	cache::{Cache, CacheBuilder, KeyStatus},
	error::{ComputeError, Error, Result},
	registry::{
		BoxError, ComputeFn, ComputeFuture, ComputeResult, Registration, RegistrationConfig,
	},
	scheduler::state::WorkerStatus,
};
