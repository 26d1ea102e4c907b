// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for refresh waves.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	waves: AtomicU64,
	success: AtomicU64,
	failure: AtomicU64,
	resumed: AtomicU64,
}
impl RefreshMetrics {
	/// Returns the number of refresh waves started.
	pub fn waves(&self) -> u64 {
		self.waves.load(Ordering::Relaxed)
	}

	/// Returns the number of waves that stored a new token pair.
	pub fn successes(&self) -> u64 {
		self.success.load(Ordering::Relaxed)
	}

	/// Returns the number of waves that cleared the store.
	pub fn failures(&self) -> u64 {
		self.failure.load(Ordering::Relaxed)
	}

	/// Returns the number of suspended requests resumed by finished waves.
	pub fn resumed(&self) -> u64 {
		self.resumed.load(Ordering::Relaxed)
	}

	pub(crate) fn record_wave(&self) {
		self.waves.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_outcome(&self, success: bool, waiters: usize) {
		if success {
			self.success.fetch_add(1, Ordering::Relaxed);
		} else {
			self.failure.fetch_add(1, Ordering::Relaxed);
		}

		self.resumed.fetch_add(waiters as u64, Ordering::Relaxed);
	}
}
