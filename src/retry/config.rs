// self
use crate::{_prelude::*, CancellationToken, config::millis, error::ConfigError};

/// Statuses treated as transient when no custom predicate is installed.
pub const DEFAULT_RETRYABLE_STATUSES: [u16; 9] = [408, 409, 423, 425, 429, 500, 502, 503, 504];

/// Custom retry classification replacing the status/transport default.
pub type RetryPredicate = Arc<dyn Fn(&Error) -> bool + Send + Sync>;
/// Hook invoked with `(attempt, error)` before each backoff wait.
pub type RetryHook = Arc<dyn Fn(u32, &Error) + Send + Sync>;

/// Retry budget, backoff shape, and classification for [`with_retry`](crate::retry::with_retry).
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
	/// Retries after the first attempt; total attempts are `max_retries + 1`.
	pub max_retries: u32,
	/// First backoff step.
	#[serde(rename = "base_delay_ms", with = "millis")]
	pub base_delay: Duration,
	/// Cap applied before jitter.
	#[serde(rename = "max_delay_ms", with = "millis")]
	pub max_delay: Duration,
	/// Exponential (`base * 2^(n-1)`) when `true`, linear (`base * n`) otherwise.
	pub exponential: bool,
	/// Uniform jitter as a fraction of the delay, in `0.0..=1.0`.
	pub jitter_factor: f64,
	/// HTTP statuses considered transient.
	pub retryable_statuses: BTreeSet<u16>,
	/// Whether transport failures (no response) are retried.
	pub retry_on_transport: bool,
	/// Replaces the default classification when set.
	#[serde(skip)]
	pub should_retry: Option<RetryPredicate>,
	/// Observer fired before each wait.
	#[serde(skip)]
	pub on_retry: Option<RetryHook>,
	/// Cancels the run before the next attempt or during a wait.
	#[serde(skip)]
	pub cancel: Option<CancellationToken>,
}
impl RetryConfig {
	/// Sets the retry budget.
	pub fn with_max_retries(mut self, value: u32) -> Self {
		self.max_retries = value;

		self
	}

	/// Sets the first backoff step.
	pub fn with_base_delay(mut self, delay: Duration) -> Self {
		self.base_delay = delay;

		self
	}

	/// Sets the pre-jitter cap.
	pub fn with_max_delay(mut self, delay: Duration) -> Self {
		self.max_delay = delay;

		self
	}

	/// Chooses exponential or linear growth.
	pub fn with_exponential(mut self, exponential: bool) -> Self {
		self.exponential = exponential;

		self
	}

	/// Sets the jitter fraction.
	pub fn with_jitter_factor(mut self, factor: f64) -> Self {
		self.jitter_factor = factor;

		self
	}

	/// Replaces the transient status set.
	pub fn with_retryable_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
		self.retryable_statuses = statuses.into_iter().collect();

		self
	}

	/// Enables or disables retries of transport failures.
	pub fn with_retry_on_transport(mut self, enabled: bool) -> Self {
		self.retry_on_transport = enabled;

		self
	}

	/// Installs a custom classification.
	pub fn with_should_retry<F>(mut self, predicate: F) -> Self
	where
		F: 'static + Fn(&Error) -> bool + Send + Sync,
	{
		self.should_retry = Some(Arc::new(predicate));

		self
	}

	/// Installs the before-wait observer.
	pub fn with_on_retry<F>(mut self, hook: F) -> Self
	where
		F: 'static + Fn(u32, &Error) + Send + Sync,
	{
		self.on_retry = Some(Arc::new(hook));

		self
	}

	/// Attaches a cancellation token.
	pub fn with_cancel(mut self, token: CancellationToken) -> Self {
		self.cancel = Some(token);

		self
	}

	/// Whether `error` qualifies for another attempt.
	pub fn is_retryable(&self, error: &Error) -> bool {
		if let Some(predicate) = &self.should_retry {
			return predicate(error);
		}
		if error.is_aborted() {
			return false;
		}
		if error.is_transport() {
			return self.retry_on_transport;
		}

		error.status_code().is_some_and(|status| self.retryable_statuses.contains(&status))
	}

	/// Rejects settings the orchestrator cannot honor.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.base_delay.is_negative() || self.max_delay.is_negative() {
			return Err(ConfigError::invalid("base_delay_ms", "delays must not be negative"));
		}
		if !(0.0..=1.0).contains(&self.jitter_factor) {
			return Err(ConfigError::invalid("jitter_factor", "must be within 0.0..=1.0"));
		}

		Ok(())
	}

	/// Applies every set field of `overrides` over a copy of `self`.
	pub fn merged(&self, overrides: RetryOverrides) -> Self {
		let mut merged = self.clone();

		if let Some(value) = overrides.max_retries {
			merged.max_retries = value;
		}
		if let Some(value) = overrides.base_delay {
			merged.base_delay = value;
		}
		if let Some(value) = overrides.max_delay {
			merged.max_delay = value;
		}
		if let Some(value) = overrides.exponential {
			merged.exponential = value;
		}
		if let Some(value) = overrides.jitter_factor {
			merged.jitter_factor = value;
		}
		if let Some(value) = overrides.retryable_statuses {
			merged.retryable_statuses = value;
		}
		if let Some(value) = overrides.retry_on_transport {
			merged.retry_on_transport = value;
		}
		if overrides.should_retry.is_some() {
			merged.should_retry = overrides.should_retry;
		}
		if overrides.on_retry.is_some() {
			merged.on_retry = overrides.on_retry;
		}
		if overrides.cancel.is_some() {
			merged.cancel = overrides.cancel;
		}

		merged
	}
}
impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_retries: 3,
			base_delay: Duration::SECOND,
			max_delay: Duration::seconds(30),
			exponential: true,
			jitter_factor: 0.1,
			retryable_statuses: DEFAULT_RETRYABLE_STATUSES.into_iter().collect(),
			retry_on_transport: true,
			should_retry: None,
			on_retry: None,
			cancel: None,
		}
	}
}
impl Debug for RetryConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RetryConfig")
			.field("max_retries", &self.max_retries)
			.field("base_delay", &self.base_delay)
			.field("max_delay", &self.max_delay)
			.field("exponential", &self.exponential)
			.field("jitter_factor", &self.jitter_factor)
			.field("retryable_statuses", &self.retryable_statuses)
			.field("retry_on_transport", &self.retry_on_transport)
			.field("should_retry", &self.should_retry.is_some())
			.field("on_retry", &self.on_retry.is_some())
			.field("cancel", &self.cancel)
			.finish()
	}
}

/// Per-call overrides for [`RetryManager`](crate::retry::RetryManager); unset fields keep the
/// manager's defaults.
#[derive(Clone, Default)]
pub struct RetryOverrides {
	/// Overrides [`RetryConfig::max_retries`].
	pub max_retries: Option<u32>,
	/// Overrides [`RetryConfig::base_delay`].
	pub base_delay: Option<Duration>,
	/// Overrides [`RetryConfig::max_delay`].
	pub max_delay: Option<Duration>,
	/// Overrides [`RetryConfig::exponential`].
	pub exponential: Option<bool>,
	/// Overrides [`RetryConfig::jitter_factor`].
	pub jitter_factor: Option<f64>,
	/// Overrides [`RetryConfig::retryable_statuses`].
	pub retryable_statuses: Option<BTreeSet<u16>>,
	/// Overrides [`RetryConfig::retry_on_transport`].
	pub retry_on_transport: Option<bool>,
	/// Overrides [`RetryConfig::should_retry`].
	pub should_retry: Option<RetryPredicate>,
	/// Overrides [`RetryConfig::on_retry`].
	pub on_retry: Option<RetryHook>,
	/// Overrides [`RetryConfig::cancel`].
	pub cancel: Option<CancellationToken>,
}
impl RetryOverrides {
	/// Overrides the retry budget.
	pub fn max_retries(mut self, value: u32) -> Self {
		self.max_retries = Some(value);

		self
	}

	/// Overrides the first backoff step.
	pub fn base_delay(mut self, delay: Duration) -> Self {
		self.base_delay = Some(delay);

		self
	}

	/// Overrides the pre-jitter cap.
	pub fn max_delay(mut self, delay: Duration) -> Self {
		self.max_delay = Some(delay);

		self
	}

	/// Overrides the growth shape.
	pub fn exponential(mut self, exponential: bool) -> Self {
		self.exponential = Some(exponential);

		self
	}

	/// Overrides the jitter fraction.
	pub fn jitter_factor(mut self, factor: f64) -> Self {
		self.jitter_factor = Some(factor);

		self
	}

	/// Overrides the before-wait observer.
	pub fn on_retry<F>(mut self, hook: F) -> Self
	where
		F: 'static + Fn(u32, &Error) + Send + Sync,
	{
		self.on_retry = Some(Arc::new(hook));

		self
	}

	/// Overrides the cancellation token.
	pub fn cancel(mut self, token: CancellationToken) -> Self {
		self.cancel = Some(token);

		self
	}
}
impl Debug for RetryOverrides {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RetryOverrides")
			.field("max_retries", &self.max_retries)
			.field("base_delay", &self.base_delay)
			.field("max_delay", &self.max_delay)
			.field("exponential", &self.exponential)
			.field("jitter_factor", &self.jitter_factor)
			.field("retryable_statuses", &self.retryable_statuses)
			.field("retry_on_transport", &self.retry_on_transport)
			.field("should_retry", &self.should_retry.is_some())
			.field("on_retry", &self.on_retry.is_some())
			.field("cancel", &self.cancel)
			.finish()
	}
}
