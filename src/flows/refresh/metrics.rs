// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters for refresh rotations.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	rotations: AtomicU64,
	stale: AtomicU64,
	failures: AtomicU64,
}
impl RefreshMetrics {
	/// Returns the total number of refresh attempts.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Ordering::Relaxed)
	}

	/// Returns the number of refreshes that rotated the marker.
	pub fn rotations(&self) -> u64 {
		self.rotations.load(Ordering::Relaxed)
	}

	/// Returns the number of refreshes rejected because the token was superseded.
	pub fn stale(&self) -> u64 {
		self.stale.load(Ordering::Relaxed)
	}

	/// Returns the number of refreshes that failed for any other reason.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_rotation(&self) {
		self.rotations.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_stale(&self) {
		self.stale.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_failure(&self) {
		self.failures.fetch_add(1, Ordering::Relaxed);
	}
}
