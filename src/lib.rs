//! Resilience core for OAuth 2.0 protected REST APIs: single-flight token refresh,
//! header-tuned quota gates, and classified retries with jittered backoff.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

#[macro_use]
mod obs_macros;

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod executor;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod rate_limit;
pub mod retry;
pub mod store;
pub mod token_manager;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and fixtures for tests; enabled via `cfg(test)` or the `test`
	//! crate feature.

	pub use crate::{
		_prelude::*,
		clock::{Clock, ManualClock},
	};

	// self
	use crate::{
		auth::{TokenRecord, TokenSecret},
		error::AuthError,
		token_manager::{RefreshFuture, TokenRefresher},
	};

	/// Fixed instant used as the starting point of [`ManualClock`] fixtures.
	pub const FIXTURE_EPOCH: OffsetDateTime = time::macros::datetime!(2025-11-10 12:00 UTC);

	/// Manual clock starting at [`FIXTURE_EPOCH`], shared as both concrete and trait object.
	pub fn manual_clock() -> (Arc<ManualClock>, Arc<dyn Clock>) {
		let clock = Arc::new(ManualClock::new(FIXTURE_EPOCH));
		let shared: Arc<dyn Clock> = clock.clone();

		(clock, shared)
	}

	/// Builds a bearer record that expires `ttl` after `now`.
	pub fn record_expiring(now: OffsetDateTime, ttl: Duration, access: &str) -> TokenRecord {
		TokenRecord::builder()
			.access_token(access)
			.refresh_token(format!("{access}-refresh"))
			.issued_at(now)
			.expires_in(ttl)
			.build()
			.expect("Token record fixture should build successfully.")
	}

	/// Refresher that replays one scripted outcome and counts calls.
	#[derive(Debug)]
	pub struct ScriptedRefresher {
		outcome: Result<TokenRecord, AuthError>,
		calls: std::sync::atomic::AtomicUsize,
	}
	impl ScriptedRefresher {
		/// Creates a refresher that always yields `outcome`.
		pub fn new(outcome: Result<TokenRecord, AuthError>) -> Self {
			Self { outcome, calls: Default::default() }
		}

		/// Number of refresh exchanges performed so far.
		pub fn calls(&self) -> usize {
			self.calls.load(std::sync::atomic::Ordering::SeqCst)
		}
	}
	impl TokenRefresher for ScriptedRefresher {
		fn refresh<'a>(&'a self, _refresh_token: &'a TokenSecret) -> RefreshFuture<'a> {
			Box::pin(async move {
				self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
				tokio::time::sleep(std::time::Duration::from_millis(20)).await;

				self.outcome.clone()
			})
		}
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, BTreeSet, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::Mutex;
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use {time, tokio_util::sync::CancellationToken, url};
#[cfg(test)] use httpmock as _;
