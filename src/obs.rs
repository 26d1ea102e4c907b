//! Optional observability helpers for service calls and refresh waves.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to wrap every call in a `netservice.call` span carrying the `call` kind and
//!   `stage` fields, and to emit refresh-wave and storage-failure events.
//! - Enable `metrics` to increment the `netservice_call_total` counter for every
//!   attempt/success/failure, labeled by `call` + `outcome`, and `netservice_refresh_wave_total`
//!   for every finished wave.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Kinds of work the service performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallKind {
	/// Typed GET/POST call.
	Data,
	/// Multipart upload.
	Upload,
	/// File download.
	Download,
	/// Token refresh issued by a refresh wave.
	Refresh,
}
impl CallKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CallKind::Data => "data",
			CallKind::Upload => "upload",
			CallKind::Download => "download",
			CallKind::Refresh => "refresh",
		}
	}
}
impl Display for CallKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallOutcome {
	/// Call dispatched.
	Attempt,
	/// Data delivered to the caller.
	Success,
	/// Error delivered to the caller.
	Failure,
}
impl CallOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CallOutcome::Attempt => "attempt",
			CallOutcome::Success => "success",
			CallOutcome::Failure => "failure",
		}
	}

	/// Maps a delivered result onto its outcome label.
	pub fn of<T, E>(result: &std::result::Result<T, E>) -> Self {
		if result.is_ok() { CallOutcome::Success } else { CallOutcome::Failure }
	}
}
impl Display for CallOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
