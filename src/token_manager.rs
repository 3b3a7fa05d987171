//! Access-token lifecycle with single-flight refresh.
//!
//! [`TokenManager`] owns the in-memory [`TokenRecord`] and hands out clones. Refreshes are
//! serialized behind an async gate: every caller samples the completed-refresh generation
//! before queuing, and a caller that finds the generation advanced once it holds the gate
//! returns the outcome of the refresh it waited on instead of issuing another exchange. Many
//! providers invalidate a refresh token on first use, so a duplicate exchange would lock the
//! client out.

mod metrics;

pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::{TokenRecord, TokenSecret},
	clock::{Clock, SystemClock},
	config::millis,
	error::AuthError,
	obs::{self, OpKind, OpOutcome, OpSpan},
	store::TokenStore,
};

/// Boxed future returned by [`TokenRefresher::refresh`].
pub type RefreshFuture<'a> =
	Pin<Box<dyn Future<Output = Result<TokenRecord, AuthError>> + 'a + Send>>;

/// Hook invoked with `(access_token, refresh_token, expires_at)` after every successful refresh.
pub type RefreshSaveHook =
	Arc<dyn Fn(&TokenSecret, Option<&TokenSecret>, OffsetDateTime) + Send + Sync>;

/// Performs the `grant_type=refresh_token` exchange.
pub trait TokenRefresher
where
	Self: Send + Sync,
{
	/// Exchanges `refresh_token` for a new record. Transport failures and non-success
	/// responses both surface as [`AuthError::RefreshFailed`].
	fn refresh<'a>(&'a self, refresh_token: &'a TokenSecret) -> RefreshFuture<'a>;
}

/// Token manager settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenManagerConfig {
	/// Tokens expiring within this window are refreshed before use.
	#[serde(rename = "token_expiry_lookahead_ms", with = "millis")]
	pub token_expiry_lookahead: Duration,
}
impl Default for TokenManagerConfig {
	fn default() -> Self {
		Self { token_expiry_lookahead: Duration::seconds(60) }
	}
}

#[derive(Debug, Default)]
struct Flight {
	generation: u64,
	last: Option<Result<TokenRecord, AuthError>>,
}

/// Owner of the current token record.
pub struct TokenManager {
	config: TokenManagerConfig,
	refresher: Arc<dyn TokenRefresher>,
	store: Option<Arc<dyn TokenStore>>,
	clock: Arc<dyn Clock>,
	record: Mutex<Option<TokenRecord>>,
	gate: AsyncMutex<()>,
	flight: Mutex<Flight>,
	refresh_save: Option<RefreshSaveHook>,
	metrics: RefreshMetrics,
}
impl TokenManager {
	/// Creates a manager with no store, default settings, and the system clock.
	pub fn new(refresher: Arc<dyn TokenRefresher>) -> Self {
		Self {
			config: TokenManagerConfig::default(),
			refresher,
			store: None,
			clock: Arc::new(SystemClock),
			record: Mutex::new(None),
			gate: AsyncMutex::new(()),
			flight: Mutex::new(Flight::default()),
			refresh_save: None,
			metrics: RefreshMetrics::default(),
		}
	}

	/// Replaces the settings.
	pub fn with_config(mut self, config: TokenManagerConfig) -> Self {
		self.config = config;

		self
	}

	/// Attaches a store used for lazy loading and persistence.
	pub fn with_store(mut self, store: Arc<dyn TokenStore>) -> Self {
		self.store = Some(store);

		self
	}

	/// Replaces the time source.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Seeds the in-memory record without touching the store.
	pub fn with_record(self, record: TokenRecord) -> Self {
		*self.record.lock() = Some(record);

		self
	}

	/// Registers the post-refresh hook.
	pub fn with_refresh_save<F>(mut self, hook: F) -> Self
	where
		F: 'static + Fn(&TokenSecret, Option<&TokenSecret>, OffsetDateTime) + Send + Sync,
	{
		self.refresh_save = Some(Arc::new(hook));

		self
	}

	/// Active settings.
	pub fn config(&self) -> &TokenManagerConfig {
		&self.config
	}

	/// Refresh counters.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.metrics
	}

	/// Returns a bearer token that stays valid past the lookahead window, refreshing first
	/// when needed.
	pub async fn get_access_token(&self) -> Result<TokenSecret> {
		let record = self.load_current().await?.ok_or(AuthError::NoTokens)?;

		if !self.is_stale(&record) {
			return Ok(record.access_token);
		}

		self.refresh_singleflight(true).await.map(|record| record.access_token)
	}

	/// Performs the refresh exchange; concurrent callers share one exchange and its outcome.
	pub async fn refresh_token(&self) -> Result<TokenRecord> {
		self.refresh_singleflight(false).await
	}

	/// Replaces the record and persists it when a store is attached.
	pub async fn update_tokens(&self, record: TokenRecord) -> Result<()> {
		*self.record.lock() = Some(record.clone());

		if let Some(store) = &self.store {
			store.save(record).await?;
		}

		Ok(())
	}

	/// Clone of the in-memory record.
	pub fn current_tokens(&self) -> Option<TokenRecord> {
		self.record.lock().clone()
	}

	/// `true` when no record is held or it has expired.
	pub fn is_token_expired(&self) -> bool {
		let now = self.clock.now();

		self.record.lock().as_ref().is_none_or(|record| record.is_expired_at(now))
	}

	/// `true` when no record is held or it expires within `within`.
	pub fn will_token_expire_soon(&self, within: Duration) -> bool {
		let now = self.clock.now();

		self.record.lock().as_ref().is_none_or(|record| record.expires_within(now, within))
	}

	/// Time left before expiry; zero when absent or expired.
	pub fn time_until_expiration(&self) -> Duration {
		let now = self.clock.now();

		self.record.lock().as_ref().map_or(Duration::ZERO, |record| record.remaining_at(now))
	}

	/// Drops the record from memory and the store.
	pub async fn clear_tokens(&self) -> Result<()> {
		self.record.lock().take();

		if let Some(store) = &self.store {
			store.clear().await?;
		}

		Ok(())
	}

	async fn refresh_singleflight(&self, recheck_staleness: bool) -> Result<TokenRecord> {
		let span = OpSpan::new(OpKind::TokenRefresh, "refresh_token");

		span.instrument(async move {
			let observed = self.flight.lock().generation;
			let _gate = self.gate.lock().await;

			if let Some(shared) = self.shared_outcome(observed) {
				self.metrics.record_coalesced();
				obs::record_op_outcome(OpKind::TokenRefresh, OpOutcome::Coalesced);

				return shared.map_err(Error::from);
			}

			let current = self.load_current().await?.ok_or(AuthError::NoTokens)?;

			if recheck_staleness && !self.is_stale(&current) {
				return Ok(current);
			}

			let outcome = self.exchange(current).await;
			let mut flight = self.flight.lock();

			flight.generation += 1;
			flight.last = Some(outcome.clone());

			outcome.map_err(Error::from)
		})
		.await
	}

	fn shared_outcome(&self, observed: u64) -> Option<Result<TokenRecord, AuthError>> {
		let flight = self.flight.lock();

		if flight.generation == observed { None } else { flight.last.clone() }
	}

	async fn exchange(&self, current: TokenRecord) -> Result<TokenRecord, AuthError> {
		self.metrics.record_attempt();
		obs::record_op_outcome(OpKind::TokenRefresh, OpOutcome::Attempt);

		let result = self.exchange_inner(current).await;

		match &result {
			Ok(_) => {
				self.metrics.record_success();
				obs::record_op_outcome(OpKind::TokenRefresh, OpOutcome::Success);
			},
			Err(_e) => {
				self.metrics.record_failure();
				obs::record_op_outcome(OpKind::TokenRefresh, OpOutcome::Failure);
				obs_warn!(error = %_e, "Token refresh failed.");
			},
		}

		result
	}

	async fn exchange_inner(&self, current: TokenRecord) -> Result<TokenRecord, AuthError> {
		let previous_refresh = current.refresh_token.ok_or(AuthError::MissingRefreshToken)?;
		let mut record = self.refresher.refresh(&previous_refresh).await?;

		if record.refresh_token.is_none() {
			record.refresh_token = Some(previous_refresh);
		}

		*self.record.lock() = Some(record.clone());

		if let Some(store) = &self.store
			&& let Err(_e) = store.save(record.clone()).await
		{
			obs_warn!(error = %_e, "Refreshed token could not be persisted.");
		}
		if let Some(hook) = &self.refresh_save {
			hook(&record.access_token, record.refresh_token.as_ref(), record.expires_at);
		}

		Ok(record)
	}

	async fn load_current(&self) -> Result<Option<TokenRecord>> {
		if let Some(record) = self.current_tokens() {
			return Ok(Some(record));
		}

		let Some(store) = &self.store else {
			return Ok(None);
		};
		let Some(loaded) = store.load().await? else {
			return Ok(None);
		};
		let mut slot = self.record.lock();

		Ok(Some(slot.get_or_insert(loaded).clone()))
	}

	fn is_stale(&self, record: &TokenRecord) -> bool {
		record.expires_within(self.clock.now(), self.config.token_expiry_lookahead)
	}
}
impl Debug for TokenManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenManager")
			.field("config", &self.config)
			.field("record", &*self.record.lock())
			.field("has_store", &self.store.is_some())
			.field("metrics", &self.metrics)
			.finish()
	}
}
