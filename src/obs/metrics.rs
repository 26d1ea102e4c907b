// self
use crate::obs::{CallKind, CallOutcome};

/// Records a call outcome via the global metrics recorder (when enabled).
pub fn record_call_outcome(kind: CallKind, outcome: CallOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"netservice_call_total",
			"call" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Records a finished refresh wave via the global metrics recorder (when enabled).
pub fn record_refresh_wave(success: bool) {
	#[cfg(feature = "metrics")]
	{
		let outcome = if success { CallOutcome::Success } else { CallOutcome::Failure };

		metrics::counter!("netservice_refresh_wave_total", "outcome" => outcome.as_str())
			.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = success;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn recorders_are_callable_in_every_feature_set() {
		record_call_outcome(CallKind::Download, CallOutcome::Failure);
		record_refresh_wave(true);
	}
}
