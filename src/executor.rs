//! Per-call composition of the quota gate, token manager, and retry layer.

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	clock::{Clock, SystemClock},
	error::ApiError,
	obs::{self, OpKind, OpOutcome, OpSpan},
	rate_limit::{HeaderBag, RateLimiter},
	retry::{RetryConfig, with_retry_on},
	token_manager::TokenManager,
};

/// Raw outcome of one transport call, as reported by the caller's HTTP layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiResponse<T> {
	/// HTTP status code.
	pub status: u16,
	/// Response headers, including quota and `retry-after` hints.
	pub headers: HeaderBag,
	/// Decoded body; only returned to the caller for 2xx responses.
	pub body: T,
}
impl<T> ApiResponse<T> {
	/// Creates a response with no headers.
	pub fn new(status: u16, body: T) -> Self {
		Self { status, headers: HeaderBag::default(), body }
	}

	/// Attaches headers.
	pub fn with_headers(mut self, headers: HeaderBag) -> Self {
		self.headers = headers;

		self
	}

	/// `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}
}

/// Runs caller-supplied transport calls behind the rate limiter, bearer-token lookup, and
/// retry policy.
pub struct RequestExecutor {
	tokens: Arc<TokenManager>,
	limiter: Arc<RateLimiter>,
	retry: RetryConfig,
	clock: Arc<dyn Clock>,
}
impl RequestExecutor {
	/// Creates an executor on the system clock.
	pub fn new(tokens: Arc<TokenManager>, limiter: Arc<RateLimiter>, retry: RetryConfig) -> Self {
		Self { tokens, limiter, retry, clock: Arc::new(SystemClock) }
	}

	/// Replaces the clock used for 429 and retry waits.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Shared token manager.
	pub fn tokens(&self) -> &Arc<TokenManager> {
		&self.tokens
	}

	/// Shared rate limiter.
	pub fn limiter(&self) -> &Arc<RateLimiter> {
		&self.limiter
	}

	/// Executes `call` with a valid bearer token.
	///
	/// 429 responses are absorbed by [`RateLimiter::handle_rate_limit_response`] and retried
	/// after its delay. Any other response feeds its quota headers back and ends the 429
	/// episode; non-2xx statuses become [`ApiError`]s that the retry layer classifies.
	pub async fn execute<T, F, Fut>(&self, call: F) -> Result<T>
	where
		F: Fn(TokenSecret) -> Fut,
		Fut: Future<Output = Result<ApiResponse<T>>>,
	{
		let span = OpSpan::new(OpKind::Request, "execute");
		let result = span
			.instrument(with_retry_on(self.clock.as_ref(), || self.attempt(&call), &self.retry))
			.await;

		obs::record_op_outcome(
			OpKind::Request,
			if result.is_ok() { OpOutcome::Success } else { OpOutcome::Failure },
		);

		result
	}

	async fn attempt<T, F, Fut>(&self, call: &F) -> Result<T>
	where
		F: Fn(TokenSecret) -> Fut,
		Fut: Future<Output = Result<ApiResponse<T>>>,
	{
		loop {
			self.limiter.wait_for_rate_limit().await?;

			let token = self.tokens.get_access_token().await?;
			let response = call(token).await?;

			if response.status == 429 {
				let backoff = self.limiter.handle_rate_limit_response(&response.headers)?;

				self.clock.sleep(backoff.delay).await;

				continue;
			}

			self.limiter.update_from_headers(&response.headers);
			self.limiter.reset_retry_count();

			if response.is_success() {
				return Ok(response.body);
			}

			return Err(ApiError::new(response.status).into());
		}
	}
}
impl Debug for RequestExecutor {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestExecutor")
			.field("tokens", &self.tokens)
			.field("limiter", &self.limiter)
			.field("retry", &self.retry)
			.finish()
	}
}
