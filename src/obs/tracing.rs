// self
use crate::{_prelude::*, obs::CallKind, store::StoreError};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedCall<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedCall<F> = F;

/// Span wrapping one run of the request pipeline.
#[derive(Clone, Debug)]
pub struct CallSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl CallSpan {
	/// Creates a new span tagged with the provided call kind + stage.
	pub fn new(kind: CallKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("netservice.call", call = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedCall<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Emits a debug event when a call enters a new pipeline phase.
pub fn emit_phase(kind: CallKind, phase: &'static str) {
	#[cfg(feature = "tracing")]
	tracing::debug!(call = kind.as_str(), phase, "call.phase");
	#[cfg(not(feature = "tracing"))]
	let _ = (kind, phase);
}

/// Emits the start of a refresh wave.
pub fn emit_refresh_wave_start() {
	#[cfg(feature = "tracing")]
	tracing::info!("refresh.wave.start");
}

/// Emits the end of a refresh wave along with the number of resumed requests.
pub fn emit_refresh_wave_finish(success: bool, waiters: usize) {
	#[cfg(feature = "tracing")]
	tracing::info!(success, waiters, "refresh.wave.finish");
	#[cfg(not(feature = "tracing"))]
	let _ = (success, waiters);
}

/// Emits a refresh failure; the error never carries token material.
pub fn emit_refresh_failure(error: &Error) {
	#[cfg(feature = "tracing")]
	tracing::warn!(error = %error, "refresh.failure");
	#[cfg(not(feature = "tracing"))]
	let _ = error;
}

/// Emits a failed mirror write or hydration against durable storage.
pub fn emit_storage_failure(operation: &'static str, error: &StoreError) {
	#[cfg(feature = "tracing")]
	tracing::warn!(operation, error = %error, "storage.failure");
	#[cfg(not(feature = "tracing"))]
	let _ = (operation, error);
}

/// Emits a decode failure with the JSON path that failed.
pub fn emit_decode_failure(path: &str, message: &str) {
	#[cfg(feature = "tracing")]
	tracing::debug!(path, message, "envelope.decode_failure");
	#[cfg(not(feature = "tracing"))]
	let _ = (path, message);
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn events_are_callable_in_every_feature_set() {
		emit_phase(CallKind::Data, "sent");
		emit_refresh_wave_start();
		emit_refresh_wave_finish(false, 3);
		emit_storage_failure("save", &StoreError::Backend { message: "offline".into() });
	}

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = CallSpan::new(CallKind::Refresh, "instrument_wraps_future");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
