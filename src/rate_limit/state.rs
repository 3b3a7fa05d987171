//! Mutable limiter state and the single resolver every quota read goes through.

// self
use crate::{
	_prelude::*,
	clock::next_utc_midnight,
	rate_limit::{RateLimitConfig, headers::QuotaHeaders},
};

/// Server-reported quota observed on the most recent response that carried any.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct HeaderSnapshot {
	pub(crate) limit_per_second: Option<u64>,
	pub(crate) remaining_this_second: Option<u64>,
	pub(crate) limit_per_day: Option<u64>,
	pub(crate) remaining_today: Option<u64>,
	pub(crate) observed_at: OffsetDateTime,
	/// Calls recorded after `observed_at`.
	pub(crate) requests_since: u64,
}

#[derive(Clone, Debug)]
pub(crate) struct RateLimitState {
	pub(crate) daily_count: u64,
	pub(crate) daily_reset_at: OffsetDateTime,
	pub(crate) last_request_at: Option<OffsetDateTime>,
	pub(crate) retry_count: u32,
	pub(crate) snapshot: Option<HeaderSnapshot>,
}
impl RateLimitState {
	pub(crate) fn new(now: OffsetDateTime) -> Self {
		Self {
			daily_count: 0,
			daily_reset_at: next_utc_midnight(now),
			last_request_at: None,
			retry_count: 0,
			snapshot: None,
		}
	}

	/// Lazy daily rollover; the only mutation read queries perform.
	pub(crate) fn roll_over(&mut self, now: OffsetDateTime) {
		if now >= self.daily_reset_at {
			self.daily_count = 0;
			self.snapshot = None;
			self.daily_reset_at = next_utc_midnight(now);
		}
	}

	pub(crate) fn record_request(&mut self, now: OffsetDateTime) {
		self.daily_count += 1;
		self.last_request_at = Some(now);

		if let Some(snapshot) = self.snapshot.as_mut() {
			snapshot.requests_since += 1;
		}
	}

	pub(crate) fn ingest(&mut self, parsed: QuotaHeaders, now: OffsetDateTime) {
		let previous = self.snapshot.take();
		let carried = |fresh: Option<u64>, old: fn(&HeaderSnapshot) -> Option<u64>| {
			fresh.or_else(|| previous.as_ref().and_then(old))
		};
		let requests_since = match (parsed.remaining_today, previous.as_ref()) {
			(None, Some(old)) => old.requests_since,
			_ => 0,
		};

		self.snapshot = Some(HeaderSnapshot {
			limit_per_second: carried(parsed.limit_per_second, |s| s.limit_per_second),
			remaining_this_second: carried(parsed.remaining_this_second, |s| {
				s.remaining_this_second
			}),
			limit_per_day: carried(parsed.limit_per_day, |s| s.limit_per_day),
			remaining_today: carried(parsed.remaining_today, |s| s.remaining_today),
			observed_at: now,
			requests_since,
		});
	}

	/// Snapshot observed during the current UTC day.
	///
	/// Its daily fields stay in force until the midnight rollover.
	pub(crate) fn snapshot_today(&self) -> Option<&HeaderSnapshot> {
		self.snapshot
			.as_ref()
			.filter(|snapshot| snapshot.observed_at >= self.daily_reset_at - Duration::DAY)
	}

	/// Snapshot whose per-second fields are still within `header_ttl`.
	pub(crate) fn fresh_snapshot(
		&self,
		config: &RateLimitConfig,
		now: OffsetDateTime,
	) -> Option<&HeaderSnapshot> {
		self.snapshot_today().filter(|snapshot| now - snapshot.observed_at <= config.header_ttl)
	}

	pub(crate) fn limit_per_second(&self, config: &RateLimitConfig, now: OffsetDateTime) -> u64 {
		self.fresh_snapshot(config, now)
			.and_then(|s| s.limit_per_second)
			.filter(|limit| *limit > 0)
			.unwrap_or(u64::from(config.max_requests_per_second.max(1)))
	}

	pub(crate) fn min_interval(&self, config: &RateLimitConfig, now: OffsetDateTime) -> Duration {
		let header_limit = self
			.fresh_snapshot(config, now)
			.and_then(|s| s.limit_per_second)
			.filter(|limit| *limit > 0);

		match (header_limit, config.min_request_interval) {
			(Some(limit), _) => per_second_interval(limit),
			(None, Some(interval)) => interval,
			(None, None) => per_second_interval(u64::from(config.max_requests_per_second.max(1))),
		}
	}

	pub(crate) fn daily_limit(&self, config: &RateLimitConfig) -> u64 {
		self.snapshot_today()
			.and_then(|s| s.limit_per_day)
			.unwrap_or(config.max_requests_per_day)
	}

	pub(crate) fn remaining_today(&self, config: &RateLimitConfig, now: OffsetDateTime) -> u64 {
		match self.snapshot_today() {
			Some(HeaderSnapshot { remaining_today: Some(remaining), requests_since, .. }) =>
				remaining.saturating_sub(*requests_since),
			_ => self.daily_limit(config).saturating_sub(self.daily_count),
		}
	}

	pub(crate) fn requests_today(&self, config: &RateLimitConfig, now: OffsetDateTime) -> u64 {
		match self.snapshot_today() {
			Some(HeaderSnapshot { remaining_today: Some(_), .. }) => {
				let limit = self.daily_limit(config);

				limit.saturating_sub(self.remaining_today(config, now))
			},
			_ => self.daily_count,
		}
	}

	/// Time left before Gate A opens.
	pub(crate) fn interval_wait(&self, config: &RateLimitConfig, now: OffsetDateTime) -> Duration {
		let mut wait = match self.last_request_at {
			Some(last) => self.min_interval(config, now) - (now - last),
			None => Duration::ZERO,
		};

		if let Some(snapshot) = self.fresh_snapshot(config, now)
			&& snapshot.remaining_this_second == Some(0)
			&& now - snapshot.observed_at < Duration::SECOND
		{
			wait = wait.max(snapshot.observed_at + Duration::SECOND - now);
		}

		wait.max(Duration::ZERO)
	}

	pub(crate) fn used_percentage(&self, config: &RateLimitConfig, now: OffsetDateTime) -> f64 {
		used_percentage(self.remaining_today(config, now), self.daily_limit(config))
	}
}

pub(crate) fn used_percentage(remaining: u64, limit: u64) -> f64 {
	if limit == 0 {
		return 100.;
	}

	limit.saturating_sub(remaining) as f64 * 100. / limit as f64
}

fn per_second_interval(limit: u64) -> Duration {
	Duration::SECOND / u32::try_from(limit).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::*;

	fn headers(remaining_today: Option<u64>, limit_per_second: Option<u64>) -> QuotaHeaders {
		QuotaHeaders { remaining_today, limit_per_second, ..Default::default() }
	}

	#[test]
	fn rollover_restores_the_static_quota() {
		let config = RateLimitConfig::default().with_max_requests_per_day(2);
		let mut state = RateLimitState::new(FIXTURE_EPOCH);

		state.ingest(headers(Some(0), None), FIXTURE_EPOCH);
		state.record_request(FIXTURE_EPOCH);

		assert_eq!(state.remaining_today(&config, FIXTURE_EPOCH), 0);

		let tomorrow = state.daily_reset_at + Duration::minutes(1);

		state.roll_over(tomorrow);

		assert!(state.snapshot.is_none());
		assert_eq!(state.daily_count, 0);
		assert_eq!(state.remaining_today(&config, tomorrow), 2);
		assert_eq!(state.daily_reset_at, time::macros::datetime!(2025-11-12 00:00 UTC));
	}

	#[test]
	fn snapshot_expires_after_ttl() {
		let config = RateLimitConfig::default().with_header_ttl(Duration::seconds(60));
		let mut state = RateLimitState::new(FIXTURE_EPOCH);

		state.ingest(headers(None, Some(4)), FIXTURE_EPOCH);

		assert_eq!(state.min_interval(&config, FIXTURE_EPOCH), Duration::milliseconds(250));
		assert_eq!(
			state.min_interval(&config, FIXTURE_EPOCH + Duration::seconds(61)),
			Duration::milliseconds(100)
		);
	}

	#[test]
	fn daily_fields_outlive_the_header_ttl() {
		let config = RateLimitConfig::default()
			.with_header_ttl(Duration::seconds(60))
			.with_max_requests_per_day(500);
		let mut state = RateLimitState::new(FIXTURE_EPOCH);

		state.ingest(
			QuotaHeaders {
				limit_per_second: Some(4),
				limit_per_day: Some(1_000),
				remaining_today: Some(0),
				..Default::default()
			},
			FIXTURE_EPOCH,
		);

		let later = FIXTURE_EPOCH + Duration::hours(2);

		assert!(state.fresh_snapshot(&config, later).is_none());
		assert_eq!(state.min_interval(&config, later), Duration::milliseconds(100));
		assert_eq!(state.daily_limit(&config), 1_000);
		assert_eq!(state.remaining_today(&config, later), 0);
		assert_eq!(state.requests_today(&config, later), 1_000);
	}

	#[test]
	fn requests_after_a_snapshot_are_subtracted() {
		let config = RateLimitConfig::default();
		let mut state = RateLimitState::new(FIXTURE_EPOCH);

		state.ingest(headers(Some(10), None), FIXTURE_EPOCH);
		state.record_request(FIXTURE_EPOCH);
		state.record_request(FIXTURE_EPOCH);

		assert_eq!(state.remaining_today(&config, FIXTURE_EPOCH), 8);

		state.ingest(QuotaHeaders { limit_per_day: Some(50), ..Default::default() }, FIXTURE_EPOCH);

		assert_eq!(state.remaining_today(&config, FIXTURE_EPOCH), 8);
		assert_eq!(state.daily_limit(&config), 50);
		assert_eq!(state.requests_today(&config, FIXTURE_EPOCH), 42);
	}

	#[test]
	fn exhausted_second_extends_the_wait() {
		let config = RateLimitConfig::default().with_min_request_interval(Duration::ZERO);
		let mut state = RateLimitState::new(FIXTURE_EPOCH);

		state.ingest(
			QuotaHeaders { remaining_this_second: Some(0), ..Default::default() },
			FIXTURE_EPOCH,
		);

		let later = FIXTURE_EPOCH + Duration::milliseconds(300);

		assert_eq!(state.interval_wait(&config, later), Duration::milliseconds(700));
		assert_eq!(state.interval_wait(&config, FIXTURE_EPOCH + Duration::SECOND), Duration::ZERO);
	}

	#[test]
	fn used_percentage_handles_edges() {
		assert_eq!(used_percentage(15_000, 100_000), 85.);
		assert_eq!(used_percentage(0, 0), 100.);
		assert_eq!(used_percentage(200, 100), 0.);
	}
}
