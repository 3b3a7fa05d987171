//! Adaptive quota gate: minimum-interval spacing, daily budget, header recalibration, and
//! 429 backoff.
//!
//! [`RateLimiter`] enforces two gates before every outbound call. Gate A spaces calls by the
//! effective minimum interval; Gate B refuses calls outright once the daily budget is spent.
//! Quota headers returned by the server are layered over the static [`RateLimitConfig`]:
//! per-second fields for `header_ttl`, daily fields until the UTC-midnight rollover. Every
//! read resolves through the same snapshot so enforcement and [`RateLimiter::status`] can
//! never disagree.

mod config;
mod headers;
mod state;

pub use config::*;
pub use headers::{
	HeaderBag, HeaderLookup, LIMIT_PER_DAY, LIMIT_PER_SECOND, REMAINING_THIS_SECOND,
	REMAINING_TODAY, RETRY_AFTER, parse_retry_after,
};

// self
use crate::{
	_prelude::*,
	clock::{Clock, SystemClock},
	obs::{self, OpKind, OpOutcome, OpSpan},
	rate_limit::{
		headers::QuotaHeaders,
		state::{RateLimitState, used_percentage},
	},
	retry,
};

/// Callback invoked with `(remaining, limit, used_percentage)` when daily usage crosses the
/// warning threshold.
pub type ApproachingLimitHook = Arc<dyn Fn(u64, u64, f64) + Send + Sync>;

/// Why the server (or the local gate) refused a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitKind {
	/// Daily quota spent; waiting within a reasonable window will not help.
	QpdExhausted,
	/// Per-second quota spent.
	QpsExhausted,
	/// Throttled without a recognizable quota signal.
	Unknown,
}
impl RateLimitKind {
	/// Stable snake_case label.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::QpdExhausted => "qpd_exhausted",
			Self::QpsExhausted => "qps_exhausted",
			Self::Unknown => "unknown",
		}
	}
}
impl Display for RateLimitKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Quota refusal carrying the time after which a retry may succeed.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Rate limited ({kind}); retry after {retry_after}.")]
pub struct RateLimitError {
	/// Refusal classification.
	pub kind: RateLimitKind,
	/// Earliest useful retry, relative to the refusal.
	pub retry_after: Duration,
}
impl RateLimitError {
	/// Creates a refusal of `kind`, floored at a zero delay.
	pub fn new(kind: RateLimitKind, retry_after: Duration) -> Self {
		Self { kind, retry_after: retry_after.max(Duration::ZERO) }
	}

	/// Daily exhaustion is a hard stop; every other kind may be retried.
	pub fn is_retryable(&self) -> bool {
		self.kind != RateLimitKind::QpdExhausted
	}

	/// Delay in whole milliseconds.
	pub fn retry_after_ms(&self) -> i128 {
		self.retry_after.whole_milliseconds()
	}
}

/// Backoff decision returned by [`RateLimiter::handle_rate_limit_response`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RateLimitBackoff {
	/// Always `true` when returned; exhausted budgets surface as errors instead.
	pub should_retry: bool,
	/// How long to wait before the next attempt.
	pub delay: Duration,
	/// Classification of the 429 response.
	pub kind: RateLimitKind,
}

/// Effective quota view, resolved from the fresh header snapshot or static configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RateLimitStatus {
	/// Calls counted against today's budget.
	pub requests_today: u64,
	/// Effective daily limit.
	pub daily_limit: u64,
	/// Effective calls left today, floored at zero.
	pub remaining_today: u64,
	/// Next UTC midnight.
	pub reset_at: OffsetDateTime,
	/// Effective per-second limit.
	pub limit_per_second: u64,
	/// Effective minimum spacing between calls.
	pub min_interval: Duration,
	/// Share of the daily limit already used, in percent.
	pub used_percentage: f64,
	/// Consecutive 429 responses in the current failure episode.
	pub retry_count: u32,
	/// Whether header values observed today are in effect.
	pub is_from_headers: bool,
}

/// Client-side quota gate shared by every call of one API client.
pub struct RateLimiter {
	config: RateLimitConfig,
	clock: Arc<dyn Clock>,
	state: Mutex<RateLimitState>,
	on_approaching_limit: Option<ApproachingLimitHook>,
}
impl RateLimiter {
	/// Creates a limiter on the system clock.
	pub fn new(config: RateLimitConfig) -> Self {
		Self::with_clock(config, Arc::new(SystemClock))
	}

	/// Creates a limiter reading time from `clock`.
	pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
		let state = Mutex::new(RateLimitState::new(clock.now()));

		Self { config, clock, state, on_approaching_limit: None }
	}

	/// Registers the approaching-limit callback.
	pub fn on_approaching_limit<F>(mut self, hook: F) -> Self
	where
		F: 'static + Fn(u64, u64, f64) + Send + Sync,
	{
		self.on_approaching_limit = Some(Arc::new(hook));

		self
	}

	/// Active configuration.
	pub fn config(&self) -> &RateLimitConfig {
		&self.config
	}

	/// Suspends until both gates pass, then records the call.
	///
	/// Fails with [`RateLimitKind::QpdExhausted`] without waiting when the daily budget is
	/// spent. Concurrent waiters are not queued; whichever resumes first takes the slot.
	pub async fn wait_for_rate_limit(&self) -> Result<()> {
		let span = OpSpan::new(OpKind::RateLimitWait, "wait_for_rate_limit");

		span.instrument(async move {
			loop {
				let wait = {
					let now = self.clock.now();
					let mut state = self.state.lock();

					state.roll_over(now);

					if state.remaining_today(&self.config, now) == 0 {
						obs::record_op_outcome(OpKind::RateLimitWait, OpOutcome::Failure);

						return Err(RateLimitError::new(
							RateLimitKind::QpdExhausted,
							state.daily_reset_at - now,
						)
						.into());
					}

					let wait = state.interval_wait(&self.config, now);

					if !wait.is_positive() {
						state.record_request(now);
						obs::record_op_outcome(OpKind::RateLimitWait, OpOutcome::Success);

						return Ok(());
					}

					wait
				};

				obs_debug!(wait_ms = wait.whole_milliseconds() as u64, "Waiting for rate limit slot.");

				self.clock.sleep(wait).await;
			}
		})
		.await
	}

	/// Recalibrates from server quota headers.
	///
	/// Unparseable values are logged and skipped; a snapshot is installed only when at least
	/// one field parsed, with missing fields carried over from the previous snapshot. The
	/// approaching-limit callback fires on every call whose resulting usage is at or above the
	/// threshold.
	pub fn update_from_headers<H>(&self, headers: &H)
	where
		H: ?Sized + HeaderLookup,
	{
		self.ingest(QuotaHeaders::read(headers));
	}

	/// Ingests a 429 response and decides how long to back off.
	///
	/// A response reporting zero calls left today fails immediately with
	/// [`RateLimitKind::QpdExhausted`]. Otherwise the retry counter advances and the delay is
	/// `min(max(retry_after, jitter(base * 2^(retry_count - 1))), max_delay)`; once the counter
	/// exceeds `max_retries` the call fails with [`Error::MaxRetriesExceeded`].
	pub fn handle_rate_limit_response<H>(&self, headers: &H) -> Result<RateLimitBackoff>
	where
		H: ?Sized + HeaderLookup,
	{
		let parsed = QuotaHeaders::read(headers);

		self.ingest(parsed);

		let now = self.clock.now();
		let kind = if parsed.remaining_today == Some(0) {
			RateLimitKind::QpdExhausted
		} else if parsed.remaining_this_second == Some(0) {
			RateLimitKind::QpsExhausted
		} else {
			RateLimitKind::Unknown
		};
		let retry_count = {
			let mut state = self.state.lock();

			state.roll_over(now);

			if kind == RateLimitKind::QpdExhausted {
				let until_reset = state.daily_reset_at - now;

				drop(state);
				obs::record_op_outcome(OpKind::RateLimitBackoff, OpOutcome::Failure);

				return Err(RateLimitError::new(kind, until_reset).into());
			}

			state.retry_count = state.retry_count.saturating_add(1);

			state.retry_count
		};

		if retry_count > self.config.max_retries {
			obs::record_op_outcome(OpKind::RateLimitBackoff, OpOutcome::Failure);

			return Err(Error::MaxRetriesExceeded { attempts: retry_count });
		}

		let retry_after = headers
			.header(RETRY_AFTER)
			.and_then(|raw| parse_retry_after(raw, now))
			.unwrap_or(Duration::ZERO);
		let delay = self.backoff_delay(retry_count, retry_after, retry::jitter_sample());

		obs::record_op_outcome(OpKind::RateLimitBackoff, OpOutcome::Attempt);
		obs_debug!(
			kind = kind.as_str(),
			retry_count,
			delay_ms = delay.whole_milliseconds() as u64,
			"Backing off after rate limited response."
		);

		Ok(RateLimitBackoff { should_retry: true, delay, kind })
	}

	/// Ends the current 429 episode; call after any non-429 response.
	pub fn reset_retry_count(&self) {
		self.state.lock().retry_count = 0;
	}

	/// Zeroes every counter and drops the header snapshot.
	pub fn reset(&self) {
		*self.state.lock() = RateLimitState::new(self.clock.now());
	}

	/// Whether a call issued now would pass both gates without waiting.
	pub fn can_make_request(&self) -> bool {
		let now = self.clock.now();
		let mut state = self.state.lock();

		state.roll_over(now);

		state.remaining_today(&self.config, now) > 0
			&& !state.interval_wait(&self.config, now).is_positive()
	}

	/// Time until the next call may proceed; until the daily reset when the budget is spent.
	pub fn time_until_next_request(&self) -> Duration {
		let now = self.clock.now();
		let mut state = self.state.lock();

		state.roll_over(now);

		if state.remaining_today(&self.config, now) == 0 {
			state.daily_reset_at - now
		} else {
			state.interval_wait(&self.config, now)
		}
	}

	/// Effective quota view.
	pub fn status(&self) -> RateLimitStatus {
		let now = self.clock.now();
		let mut state = self.state.lock();

		state.roll_over(now);

		RateLimitStatus {
			requests_today: state.requests_today(&self.config, now),
			daily_limit: state.daily_limit(&self.config),
			remaining_today: state.remaining_today(&self.config, now),
			reset_at: state.daily_reset_at,
			limit_per_second: state.limit_per_second(&self.config, now),
			min_interval: state.min_interval(&self.config, now),
			used_percentage: state.used_percentage(&self.config, now),
			retry_count: state.retry_count,
			is_from_headers: state.snapshot_today().is_some(),
		}
	}

	fn ingest(&self, parsed: QuotaHeaders) {
		if parsed.is_empty() {
			return;
		}

		let now = self.clock.now();
		let (remaining, limit) = {
			let mut state = self.state.lock();

			state.roll_over(now);
			state.ingest(parsed, now);

			(state.remaining_today(&self.config, now), state.daily_limit(&self.config))
		};

		obs::record_quota(remaining, limit);

		if limit == 0 {
			return;
		}

		let used = used_percentage(remaining, limit);

		if used >= self.config.qpd_warning_threshold {
			obs_warn!(remaining, limit, used_percentage = used, "Daily quota is running low.");

			if let Some(hook) = &self.on_approaching_limit {
				hook(remaining, limit, used);
			}
		}
	}

	fn backoff_delay(&self, retry_count: u32, retry_after: Duration, sample: f64) -> Duration {
		let exponent = retry_count.saturating_sub(1).min(62) as i32;
		let max_ms = self.config.max_delay.as_seconds_f64() * 1_000.;
		let exponential_ms = self.config.base_delay.as_seconds_f64() * 1_000. * 2f64.powi(exponent);
		let jittered_ms = retry::jittered_ms(exponential_ms, self.config.jitter, sample);
		let retry_after_ms = retry_after.as_seconds_f64() * 1_000.;

		Duration::seconds_f64(jittered_ms.max(retry_after_ms).min(max_ms).max(0.) / 1_000.)
	}
}
impl Debug for RateLimiter {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RateLimiter")
			.field("config", &self.config)
			.field("state", &*self.state.lock())
			.field("on_approaching_limit", &self.on_approaching_limit.is_some())
			.finish()
	}
}
