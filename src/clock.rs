//! Time source abstraction shared by the token manager, rate limiter, and retry layer.
//!
//! Every component reads "now" and suspends through a [`Clock`] so quota rollover,
//! expiry lookahead, and backoff waits can be driven deterministically by
//! [`ManualClock`] in tests while production code uses [`SystemClock`].

// self
use crate::_prelude::*;

/// Boxed timer future returned by [`Clock::sleep`].
pub type SleepFuture = Pin<Box<dyn Future<Output = ()> + 'static + Send>>;

/// Source of UTC instants and timer suspension.
pub trait Clock
where
	Self: Send + Sync,
{
	/// Current UTC instant.
	fn now(&self) -> OffsetDateTime;

	/// Suspends for `duration`; non-positive durations resolve immediately.
	fn sleep(&self, duration: Duration) -> SleepFuture;
}

/// Wall clock backed by [`OffsetDateTime::now_utc`] and the tokio timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}

	fn sleep(&self, duration: Duration) -> SleepFuture {
		let std_duration = std::time::Duration::try_from(duration).unwrap_or_default();

		Box::pin(tokio::time::sleep(std_duration))
	}
}

/// Deterministic clock whose `sleep` advances virtual time instantly.
///
/// Every requested sleep is recorded so tests can assert on computed delays.
#[derive(Debug)]
pub struct ManualClock {
	now: Mutex<OffsetDateTime>,
	sleeps: Mutex<Vec<Duration>>,
}
impl ManualClock {
	/// Creates a clock frozen at `start`.
	pub fn new(start: OffsetDateTime) -> Self {
		Self { now: Mutex::new(start), sleeps: Mutex::new(Vec::new()) }
	}

	/// Moves the clock forward by `delta`.
	pub fn advance(&self, delta: Duration) {
		*self.now.lock() += delta;
	}

	/// Jumps the clock to `instant`.
	pub fn set(&self, instant: OffsetDateTime) {
		*self.now.lock() = instant;
	}

	/// Durations passed to [`Clock::sleep`] so far, in call order.
	pub fn sleeps(&self) -> Vec<Duration> {
		self.sleeps.lock().clone()
	}

	/// Sum of every recorded sleep.
	pub fn total_slept(&self) -> Duration {
		self.sleeps.lock().iter().fold(Duration::ZERO, |acc, d| acc + *d)
	}
}
impl Clock for ManualClock {
	fn now(&self) -> OffsetDateTime {
		*self.now.lock()
	}

	fn sleep(&self, duration: Duration) -> SleepFuture {
		if duration.is_positive() {
			self.sleeps.lock().push(duration);
			self.advance(duration);
		}

		Box::pin(async {})
	}
}

/// Start of the next UTC day after `now`.
pub(crate) fn next_utc_midnight(now: OffsetDateTime) -> OffsetDateTime {
	let today = now.to_offset(time::UtcOffset::UTC).date();

	match today.next_day() {
		Some(tomorrow) => tomorrow.midnight().assume_utc(),
		None => today.midnight().assume_utc() + Duration::DAY,
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn next_midnight_is_strictly_after_now() {
		assert_eq!(
			next_utc_midnight(macros::datetime!(2025-03-01 23:59:59 UTC)),
			macros::datetime!(2025-03-02 00:00 UTC)
		);
		assert_eq!(
			next_utc_midnight(macros::datetime!(2025-03-02 00:00 UTC)),
			macros::datetime!(2025-03-03 00:00 UTC)
		);
		assert_eq!(
			next_utc_midnight(macros::datetime!(2025-03-01 22:00 -05:00)),
			macros::datetime!(2025-03-03 00:00 UTC)
		);
	}

	#[tokio::test]
	async fn manual_clock_records_sleeps() {
		let clock = ManualClock::new(macros::datetime!(2025-01-01 00:00 UTC));

		clock.sleep(Duration::milliseconds(250)).await;
		clock.sleep(Duration::ZERO).await;
		clock.sleep(Duration::seconds(2)).await;

		assert_eq!(clock.sleeps(), vec![Duration::milliseconds(250), Duration::seconds(2)]);
		assert_eq!(clock.now(), macros::datetime!(2025-01-01 00:00:02.25 UTC));
		assert_eq!(clock.total_slept(), Duration::milliseconds(2250));
	}
}
