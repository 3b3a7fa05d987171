//! Serde-friendly configuration aggregate for the resilience layer.
//!
//! Durations travel as integer milliseconds (`*_ms` keys) on the wire. Every section is
//! optional and falls back to its defaults.

// self
use crate::{
	_prelude::*,
	error::ConfigError,
	rate_limit::RateLimitConfig,
	retry::RetryConfig,
	token_manager::TokenManagerConfig,
};

/// Combined settings for the token manager, rate limiter, and retry layer.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
	/// Token lifecycle settings.
	pub token: TokenManagerConfig,
	/// Quota gate settings.
	pub rate_limit: RateLimitConfig,
	/// Retry orchestration settings.
	pub retry: RetryConfig,
}
impl ResilienceConfig {
	/// Parses and validates a JSON document.
	pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
		let config: Self = serde_json::from_str(raw)?;

		config.validate()?;

		Ok(config)
	}

	/// Validates every section.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.token.token_expiry_lookahead.is_negative() {
			return Err(ConfigError::invalid("token_expiry_lookahead_ms", "must not be negative"));
		}

		self.rate_limit.validate()?;
		self.retry.validate()
	}
}

/// `serde(with)` adapter encoding [`Duration`] as integer milliseconds.
pub(crate) mod millis {
	// crates.io
	use serde::{Deserializer, Serializer};
	// self
	use crate::_prelude::*;

	pub(crate) fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_i64(value.whole_milliseconds().clamp(i64::MIN.into(), i64::MAX.into()) as i64)
	}

	pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		i64::deserialize(deserializer).map(Duration::milliseconds)
	}

	/// Same encoding for optional durations; `null` or a missing key maps to `None`.
	pub(crate) mod option {
		// crates.io
		use serde::{Deserializer, Serializer};
		// self
		use crate::_prelude::*;

		pub(crate) fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
		where
			S: Serializer,
		{
			match value {
				Some(duration) => super::serialize(duration, serializer),
				None => serializer.serialize_none(),
			}
		}

		pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
		where
			D: Deserializer<'de>,
		{
			Option::<i64>::deserialize(deserializer).map(|ms| ms.map(Duration::milliseconds))
		}
	}
}
