//! Retry orchestration with classified failures, capped backoff, jitter, and cancellation.

mod config;

pub use config::*;

// crates.io
use rand::Rng;
// self
use crate::{
	_prelude::*,
	CancellationToken,
	clock::{Clock, SystemClock},
	obs::{self, OpKind, OpOutcome, OpSpan},
};

/// Runs `operation` until it succeeds, fails with a non-retryable error, exhausts
/// [`RetryConfig::max_retries`], or is cancelled. Waits on the system clock.
pub async fn with_retry<T, F, Fut>(operation: F, config: &RetryConfig) -> Result<T>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T>>,
{
	with_retry_on(&SystemClock, operation, config).await
}

/// [`with_retry`] with an explicit clock.
///
/// `on_retry` fires with the 1-based retry number before each wait. Cancellation is checked
/// before every attempt and also interrupts a wait in progress; both surface as
/// [`Error::Aborted`]. Exhausting the budget returns the last error unchanged.
pub async fn with_retry_on<T, F, Fut>(
	clock: &dyn Clock,
	mut operation: F,
	config: &RetryConfig,
) -> Result<T>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T>>,
{
	let span = OpSpan::new(OpKind::Retry, "with_retry");

	span.instrument(async move {
		let mut retries = 0_u32;

		loop {
			if config.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
				obs::record_op_outcome(OpKind::Retry, OpOutcome::Failure);

				return Err(Error::Aborted);
			}

			obs::record_op_outcome(OpKind::Retry, OpOutcome::Attempt);

			let error = match operation().await {
				Ok(value) => {
					obs::record_op_outcome(OpKind::Retry, OpOutcome::Success);

					return Ok(value);
				},
				Err(e) => e,
			};

			if retries >= config.max_retries || !config.is_retryable(&error) {
				obs::record_op_outcome(OpKind::Retry, OpOutcome::Failure);

				return Err(error);
			}

			retries += 1;

			let delay = compute_delay(retries, config, jitter_sample());

			obs_warn!(
				retry = retries,
				delay_ms = delay.whole_milliseconds() as u64,
				error = %error,
				"Retrying after transient failure."
			);

			if let Some(hook) = &config.on_retry {
				hook(retries, &error);
			}

			match &config.cancel {
				Some(token) => {
					tokio::select! {
						biased;
						_ = token.cancelled() => {
							obs::record_op_outcome(OpKind::Retry, OpOutcome::Failure);

							return Err(Error::Aborted);
						},
						_ = clock.sleep(delay) => {},
					}
				},
				None => clock.sleep(delay).await,
			}
		}
	})
	.await
}

/// Backoff before retry number `attempt` (1-based).
///
/// `exponential ? base * 2^(attempt-1) : base * attempt`, capped at `max_delay`, then shifted
/// by `delay * jitter_factor * sample` and floored at zero. `sample` is clamped to `-1.0..=1.0`;
/// pass `0.0` for the deterministic value.
pub fn compute_delay(attempt: u32, config: &RetryConfig, sample: f64) -> Duration {
	let base_ms = as_millis_f64(config.base_delay);
	let raw_ms = if config.exponential {
		base_ms * 2f64.powi(attempt.saturating_sub(1).min(62) as i32)
	} else {
		base_ms * f64::from(attempt)
	};
	let capped_ms = raw_ms.min(as_millis_f64(config.max_delay));

	Duration::seconds_f64(jittered_ms(capped_ms, config.jitter_factor, sample) / 1_000.)
}

/// Default-config holder that runs operations with optional per-call overrides.
#[derive(Clone)]
pub struct RetryManager {
	config: RetryConfig,
	clock: Arc<dyn Clock>,
}
impl RetryManager {
	/// Creates a manager on the system clock.
	pub fn new(config: RetryConfig) -> Self {
		Self::with_clock(config, Arc::new(SystemClock))
	}

	/// Creates a manager waiting on `clock`.
	pub fn with_clock(config: RetryConfig, clock: Arc<dyn Clock>) -> Self {
		Self { config, clock }
	}

	/// Default configuration applied to every call.
	pub fn config(&self) -> &RetryConfig {
		&self.config
	}

	/// Runs `operation` with the default configuration.
	pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		with_retry_on(self.clock.as_ref(), operation, &self.config).await
	}

	/// Runs `operation` with `overrides` merged over the default configuration.
	pub async fn execute_with<T, F, Fut>(&self, operation: F, overrides: RetryOverrides) -> Result<T>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let config = self.config.merged(overrides);

		with_retry_on(self.clock.as_ref(), operation, &config).await
	}
}
impl Debug for RetryManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RetryManager").field("config", &self.config).finish()
	}
}

pub(crate) fn jittered_ms(delay_ms: f64, factor: f64, sample: f64) -> f64 {
	(delay_ms + delay_ms * factor * sample.clamp(-1., 1.)).max(0.)
}

pub(crate) fn jitter_sample() -> f64 {
	rand::rng().random_range(-1.0..=1.0)
}

fn as_millis_f64(duration: Duration) -> f64 {
	duration.as_seconds_f64() * 1_000.
}
