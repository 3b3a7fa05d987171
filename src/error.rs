//! Crate-level error types shared by the token manager, rate limiter, and retry layer.

// self
use crate::{_prelude::*, rate_limit::RateLimitError, retry::DEFAULT_RETRYABLE_STATUSES};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Token lifecycle failure (no tokens, refresh rejected or unreachable).
	#[error(transparent)]
	Auth(#[from] AuthError),
	/// Quota gate refused the call.
	#[error(transparent)]
	RateLimit(#[from] RateLimitError),
	/// Upstream API answered with a non-success status.
	#[error(transparent)]
	Api(#[from] ApiError),
	/// Transport failure (DNS, TCP, TLS).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Rate-limited responses kept arriving after the configured retry budget.
	#[error("Rate limit retries exhausted after {attempts} attempts.")]
	MaxRetriesExceeded {
		/// Number of 429 responses observed in the failure episode.
		attempts: u32,
	},
	/// Caller cancelled the operation.
	#[error("Operation was aborted.")]
	Aborted,
}
impl Error {
	/// HTTP status carried by the error, if any.
	pub fn status_code(&self) -> Option<u16> {
		match self {
			Self::Api(e) => Some(e.status),
			Self::RateLimit(e) if e.is_retryable() => Some(429),
			_ => None,
		}
	}

	/// Returns `true` for network-level failures that never produced a response.
	pub fn is_transport(&self) -> bool {
		matches!(self, Self::Transport(_))
	}

	/// Returns `true` if the error was produced by a cancelled operation.
	pub fn is_aborted(&self) -> bool {
		matches!(self, Self::Aborted)
	}

	/// Default retry classification: transport failures and the transient status set.
	pub fn retryable(&self) -> bool {
		self.is_transport()
			|| self.status_code().is_some_and(|status| DEFAULT_RETRYABLE_STATUSES.contains(&status))
	}
}

/// Token lifecycle failures. Cloneable so a single refresh outcome can be shared by every
/// caller that waited on it.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum AuthError {
	/// Neither memory nor the token store holds a record.
	#[error("No tokens are available; complete an authorization first.")]
	NoTokens,
	/// The current record cannot be refreshed.
	#[error("Current token record has no refresh token.")]
	MissingRefreshToken,
	/// The refresh exchange failed at the transport level or with a non-success status.
	#[error("Token refresh failed: {reason}.")]
	RefreshFailed {
		/// HTTP status returned by the token endpoint, when one was received.
		status: Option<u16>,
		/// Provider- or transport-supplied reason string.
		reason: String,
	},
}
impl AuthError {
	/// Stable machine-readable code for the failure.
	pub const fn code(&self) -> &'static str {
		match self {
			Self::NoTokens => "no_tokens",
			Self::MissingRefreshToken => "missing_refresh_token",
			Self::RefreshFailed { .. } => "refresh_failed",
		}
	}

	pub(crate) fn refresh_failed(status: Option<u16>, reason: impl Into<String>) -> Self {
		Self::RefreshFailed { status, reason: reason.into() }
	}
}

/// Non-success response from the upstream API.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("API responded with HTTP {status}{}.", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
pub struct ApiError {
	/// HTTP status code.
	pub status: u16,
	/// Optional response summary.
	pub message: Option<String>,
}
impl ApiError {
	/// Creates an error for the provided status.
	pub fn new(status: u16) -> Self {
		Self { status, message: None }
	}

	/// Attaches a short message.
	pub fn with_message(mut self, message: impl Into<String>) -> Self {
		self.message = Some(message.into());

		self
	}

	/// Returns `true` if the status belongs to the default transient set.
	pub fn retryable(&self) -> bool {
		DEFAULT_RETRYABLE_STATUSES.contains(&self.status)
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Token endpoint URL cannot be used.
	#[error("Token endpoint URL is invalid.")]
	InvalidTokenEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Token record builder validation failed.
	#[error("Unable to build token record.")]
	TokenBuild(#[from] crate::auth::TokenRecordBuilderError),
	/// A setting is outside its supported range.
	#[error("Setting `{field}` is invalid: {reason}.")]
	InvalidSetting {
		/// Setting name.
		field: &'static str,
		/// Why the value was rejected.
		reason: String,
	},
	/// Configuration document could not be parsed.
	#[error("Configuration document is malformed.")]
	Parse(#[from] serde_json::Error),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}

	pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
		Self::InvalidSetting { field, reason: reason.into() }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the API.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
