// self
use crate::obs::{OpKind, OpOutcome};

/// Records an operation outcome via the global metrics recorder (when enabled).
pub fn record_op_outcome(kind: OpKind, outcome: OpOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"oauth2_resilience_op_total",
			"op" => kind.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (kind, outcome);
	}
}

/// Publishes the effective daily quota via the global metrics recorder (when enabled).
pub fn record_quota(remaining: u64, limit: u64) {
	#[cfg(feature = "metrics")]
	{
		metrics::gauge!("oauth2_resilience_quota_remaining").set(remaining as f64);
		metrics::gauge!("oauth2_resilience_quota_limit").set(limit as f64);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (remaining, limit);
	}
}
