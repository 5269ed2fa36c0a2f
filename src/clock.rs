//! Injectable time sources for token expiry, store TTLs, and rate windows.

// self
use crate::_prelude::*;

/// Source of the current UTC instant.
pub trait Clock
where
	Self: Debug + Send + Sync,
{
	/// Returns the current instant.
	fn now(&self) -> OffsetDateTime;
}

/// Wall clock backed by [`OffsetDateTime::now_utc`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}
}

/// Manually driven clock for deterministic tests and simulations.
#[derive(Debug)]
pub struct ManualClock(Mutex<OffsetDateTime>);
impl ManualClock {
	/// Creates a clock pinned at `instant`.
	pub fn new(instant: OffsetDateTime) -> Self {
		Self(Mutex::new(instant))
	}

	/// Moves the clock to `instant`.
	pub fn set(&self, instant: OffsetDateTime) {
		*self.0.lock() = instant;
	}

	/// Moves the clock forward by `delta`.
	pub fn advance(&self, delta: Duration) {
		*self.0.lock() += delta;
	}
}
impl Clock for ManualClock {
	fn now(&self) -> OffsetDateTime {
		*self.0.lock()
	}
}

pub(crate) fn system() -> Arc<dyn Clock> {
	Arc::new(SystemClock)
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn manual_clock_moves_only_when_told() {
		let clock = ManualClock::new(macros::datetime!(2025-01-01 00:00 UTC));

		assert_eq!(clock.now(), macros::datetime!(2025-01-01 00:00 UTC));

		clock.advance(Duration::seconds(90));

		assert_eq!(clock.now(), macros::datetime!(2025-01-01 00:01:30 UTC));

		clock.set(macros::datetime!(2030-06-01 12:00 UTC));

		assert_eq!(clock.now(), macros::datetime!(2030-06-01 12:00 UTC));
	}
}
