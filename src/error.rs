//! Crate-wide error types and `Result` alias.

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the rehydrating cache crate.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("A function is already registered under key '{key}'.")]
	AlreadyRegistered { key: String },
	#[error("Metrics error: {0}")]
	Metrics(String),
	#[error("No function registered under key '{key}'.")]
	NotRegistered { key: String },
	#[error("No value for key '{key}' arrived within {waited:?}.")]
	Timeout { key: String, waited: std::time::Duration },
	#[error("Validation failed for {field}: {reason}")]
	Validation { field: &'static str, reason: String },
}

/// Failure produced while executing a registered compute function.
///
/// Never surfaced to readers: the scheduler logs it and keeps serving the last
/// stored value until that value expires on its own.
#[allow(missing_docs)]
#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
	#[error("Compute function failed: {0}")]
	Failed(crate::registry::BoxError),
	#[error("Compute function crashed: {0}")]
	Crashed(String),
}
