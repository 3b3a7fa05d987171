// self
use crate::{_prelude::*, config::millis, error::ConfigError};

/// Static quota settings used until (and whenever) server headers are unavailable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
	/// Daily request budget.
	pub max_requests_per_day: u64,
	/// Per-second request budget, used to derive the minimum interval.
	pub max_requests_per_second: u32,
	/// Explicit minimum spacing between calls; overrides the per-second budget.
	#[serde(rename = "min_request_interval_ms", with = "millis::option")]
	pub min_request_interval: Option<Duration>,
	/// Number of consecutive 429 responses tolerated before giving up.
	pub max_retries: u32,
	/// Base of the exponential 429 backoff.
	#[serde(rename = "base_delay_ms", with = "millis")]
	pub base_delay: Duration,
	/// Upper bound for any 429 backoff.
	#[serde(rename = "max_delay_ms", with = "millis")]
	pub max_delay: Duration,
	/// Relative jitter applied to the exponential backoff component, in `0.0..=1.0`.
	pub jitter: f64,
	/// Daily usage percentage at which the approaching-limit callback fires.
	pub qpd_warning_threshold: f64,
	/// How long per-second header values keep precedence over this configuration.
	#[serde(rename = "header_ttl_ms", with = "millis")]
	pub header_ttl: Duration,
}
impl RateLimitConfig {
	/// Sets the daily request budget.
	pub fn with_max_requests_per_day(mut self, value: u64) -> Self {
		self.max_requests_per_day = value;

		self
	}

	/// Sets the per-second request budget.
	pub fn with_max_requests_per_second(mut self, value: u32) -> Self {
		self.max_requests_per_second = value;

		self
	}

	/// Sets an explicit minimum interval between calls.
	pub fn with_min_request_interval(mut self, interval: Duration) -> Self {
		self.min_request_interval = Some(interval);

		self
	}

	/// Sets the 429 retry budget.
	pub fn with_max_retries(mut self, value: u32) -> Self {
		self.max_retries = value;

		self
	}

	/// Sets the exponential backoff base.
	pub fn with_base_delay(mut self, delay: Duration) -> Self {
		self.base_delay = delay;

		self
	}

	/// Sets the backoff cap.
	pub fn with_max_delay(mut self, delay: Duration) -> Self {
		self.max_delay = delay;

		self
	}

	/// Sets the jitter factor.
	pub fn with_jitter(mut self, factor: f64) -> Self {
		self.jitter = factor;

		self
	}

	/// Sets the approaching-limit threshold (percent).
	pub fn with_qpd_warning_threshold(mut self, percent: f64) -> Self {
		self.qpd_warning_threshold = percent;

		self
	}

	/// Sets how long per-second header values stay authoritative.
	pub fn with_header_ttl(mut self, ttl: Duration) -> Self {
		self.header_ttl = ttl;

		self
	}

	/// Rejects settings the limiter cannot honor.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.max_requests_per_second == 0 {
			return Err(ConfigError::invalid("max_requests_per_second", "must be at least 1"));
		}
		if self.min_request_interval.is_some_and(|interval| interval.is_negative()) {
			return Err(ConfigError::invalid("min_request_interval_ms", "must not be negative"));
		}
		if self.base_delay.is_negative() || self.max_delay < self.base_delay {
			return Err(ConfigError::invalid(
				"max_delay_ms",
				"delays must be non-negative with max_delay >= base_delay",
			));
		}
		if !(0.0..=1.0).contains(&self.jitter) {
			return Err(ConfigError::invalid("jitter", "must be within 0.0..=1.0"));
		}
		if !(self.qpd_warning_threshold > 0. && self.qpd_warning_threshold <= 100.) {
			return Err(ConfigError::invalid("qpd_warning_threshold", "must be within (0, 100]"));
		}
		if !self.header_ttl.is_positive() {
			return Err(ConfigError::invalid("header_ttl_ms", "must be positive"));
		}

		Ok(())
	}
}
impl Default for RateLimitConfig {
	fn default() -> Self {
		Self {
			max_requests_per_day: 10_000,
			max_requests_per_second: 10,
			min_request_interval: None,
			max_retries: 3,
			base_delay: Duration::SECOND,
			max_delay: Duration::seconds(60),
			jitter: 0.1,
			qpd_warning_threshold: 80.,
			header_ttl: Duration::seconds(60),
		}
	}
}
