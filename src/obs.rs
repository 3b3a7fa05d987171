//! Optional observability helpers for the resilience layer.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `oauth2_resilience.op` with the `op` and
//!   `stage` fields, plus warn/debug events for malformed headers, store failures, and
//!   retries.
//! - Enable `metrics` to increment the `oauth2_resilience_op_total` counter for every
//!   attempt/success/failure, labeled by `op` + `outcome`, and to publish the
//!   `oauth2_resilience_quota_remaining` gauge whenever the daily quota is observed.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the resilience layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// Refresh-token exchange performed by the token manager.
	TokenRefresh,
	/// Quota gate wait before an outbound call.
	RateLimitWait,
	/// Backoff computed for a 429 response.
	RateLimitBackoff,
	/// Retry orchestration around an arbitrary operation.
	Retry,
	/// Full request composed by the executor.
	Request,
}
impl OpKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::TokenRefresh => "token_refresh",
			OpKind::RateLimitWait => "rate_limit_wait",
			OpKind::RateLimitBackoff => "rate_limit_backoff",
			OpKind::Retry => "retry",
			OpKind::Request => "request",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Entry to an instrumented helper.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
	/// Caller joined an operation already in flight instead of starting its own.
	Coalesced,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::Attempt => "attempt",
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
			OpOutcome::Coalesced => "coalesced",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
