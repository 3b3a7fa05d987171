// std
use std::{collections::HashMap, sync::Arc, time::Instant};
// crates.io
use parking_lot::Mutex;
use time::{Duration, OffsetDateTime, macros};
// self
use oauth2_resilience::{
	clock::{Clock, ManualClock},
	error::Error,
	rate_limit::{HeaderBag, RateLimitConfig, RateLimitKind, RateLimiter},
};

const EPOCH: OffsetDateTime = macros::datetime!(2025-11-10 12:00 UTC);

fn limiter(config: RateLimitConfig) -> (Arc<ManualClock>, RateLimiter) {
	let clock = Arc::new(ManualClock::new(EPOCH));
	let shared: Arc<dyn Clock> = clock.clone();

	(clock, RateLimiter::with_clock(config, shared))
}

#[tokio::test]
async fn min_interval_spaces_consecutive_calls() {
	let (clock, limiter) = limiter(
		RateLimitConfig::default().with_min_request_interval(Duration::milliseconds(200)),
	);

	limiter.wait_for_rate_limit().await.expect("First call should pass.");
	limiter.wait_for_rate_limit().await.expect("Second call should pass.");

	assert_eq!(clock.sleeps(), vec![Duration::milliseconds(200)]);
	assert_eq!(clock.now() - EPOCH, Duration::milliseconds(200));
	assert_eq!(limiter.status().requests_today, 2);
}

#[tokio::test]
async fn min_interval_holds_on_the_wall_clock() {
	let limiter = RateLimiter::new(
		RateLimitConfig::default().with_min_request_interval(Duration::milliseconds(200)),
	);
	let started = Instant::now();

	limiter.wait_for_rate_limit().await.expect("First call should pass.");
	limiter.wait_for_rate_limit().await.expect("Second call should pass.");

	assert!(started.elapsed() >= std::time::Duration::from_millis(200));
}

#[tokio::test]
async fn per_second_budget_sets_the_default_interval() {
	let (clock, limiter) = limiter(RateLimitConfig::default().with_max_requests_per_second(4));

	for _ in 0..3 {
		limiter.wait_for_rate_limit().await.expect("Call should pass.");
	}

	assert_eq!(clock.total_slept(), Duration::milliseconds(500));
}

#[tokio::test]
async fn header_rate_overrides_static_interval() {
	let (clock, limiter) = limiter(
		RateLimitConfig::default().with_min_request_interval(Duration::milliseconds(500)),
	);

	limiter.wait_for_rate_limit().await.expect("First call should pass.");
	limiter.update_from_headers(&[("X-Limit-Per-Second", "20")]);

	assert_eq!(limiter.status().min_interval, Duration::milliseconds(50));

	limiter.wait_for_rate_limit().await.expect("Second call should pass.");

	assert_eq!(clock.sleeps(), vec![Duration::milliseconds(50)]);
}

#[tokio::test]
async fn daily_quota_is_a_hard_stop_until_reset() {
	let (clock, limiter) = limiter(
		RateLimitConfig::default()
			.with_max_requests_per_day(2)
			.with_min_request_interval(Duration::ZERO),
	);

	limiter.wait_for_rate_limit().await.expect("First call should pass.");
	limiter.wait_for_rate_limit().await.expect("Second call should pass.");

	let err = limiter.wait_for_rate_limit().await.expect_err("Third call should be refused.");

	match err {
		Error::RateLimit(e) => {
			assert_eq!(e.kind, RateLimitKind::QpdExhausted);
			assert_eq!(e.retry_after, Duration::hours(12));
			assert!(!e.is_retryable());
		},
		other => panic!("Unexpected error: {other:?}"),
	}

	assert!(clock.sleeps().is_empty());
	assert!(!limiter.can_make_request());
	assert_eq!(limiter.time_until_next_request(), Duration::hours(12));

	limiter.reset();

	assert_eq!(limiter.status().remaining_today, 2);

	limiter.wait_for_rate_limit().await.expect("Call after reset should pass.");
	limiter.wait_for_rate_limit().await.expect("Call after reset should pass.");

	assert!(limiter.wait_for_rate_limit().await.is_err());

	clock.set(macros::datetime!(2025-11-11 00:00 UTC));

	let status = limiter.status();

	assert_eq!(status.remaining_today, 2);
	assert_eq!(status.requests_today, 0);
	assert_eq!(status.reset_at, macros::datetime!(2025-11-12 00:00 UTC));

	limiter.wait_for_rate_limit().await.expect("Call after midnight should pass.");
}

#[tokio::test]
async fn header_quota_counts_calls_made_since_observation() {
	let (_, limiter) = limiter(
		RateLimitConfig::default()
			.with_max_requests_per_day(1_000)
			.with_min_request_interval(Duration::ZERO),
	);

	limiter.update_from_headers(&[("x-remaining-today", "2"), ("x-limit-per-day", "5000")]);
	limiter.wait_for_rate_limit().await.expect("First call should pass.");
	limiter.wait_for_rate_limit().await.expect("Second call should pass.");

	let err = limiter.wait_for_rate_limit().await.expect_err("Header quota should be spent.");

	assert!(matches!(err, Error::RateLimit(ref e) if e.kind == RateLimitKind::QpdExhausted));

	let status = limiter.status();

	assert!(status.is_from_headers);
	assert_eq!(status.daily_limit, 5_000);
	assert_eq!(status.remaining_today, 0);
}

#[tokio::test]
async fn daily_exhaustion_outlives_the_header_ttl() {
	let (clock, limiter) = limiter(
		RateLimitConfig::default().with_header_ttl(Duration::seconds(60)).with_jitter(0.),
	);
	let err = limiter
		.handle_rate_limit_response(&[("x-limit-per-day", "1000"), ("x-remaining-today", "0")])
		.expect_err("Daily exhaustion should not be retried.");

	assert!(matches!(err, Error::RateLimit(ref e) if e.kind == RateLimitKind::QpdExhausted));

	clock.advance(Duration::seconds(61));

	assert!(!limiter.can_make_request());

	let status = limiter.status();

	assert!(status.is_from_headers);
	assert_eq!(status.daily_limit, 1_000);
	assert_eq!(status.remaining_today, 0);

	let err = limiter.wait_for_rate_limit().await.expect_err("Daily quota should stay spent.");

	assert!(matches!(err, Error::RateLimit(ref e) if e.kind == RateLimitKind::QpdExhausted));

	clock.set(macros::datetime!(2025-11-11 00:00 UTC));
	limiter.wait_for_rate_limit().await.expect("Rollover should restore the quota.");
}

#[test]
fn approaching_limit_fires_on_every_call_over_threshold() {
	let calls = Arc::new(Mutex::new(Vec::new()));
	let sink = calls.clone();
	let (_, limiter) = limiter(RateLimitConfig::default().with_qpd_warning_threshold(80.));
	let limiter = limiter.on_approaching_limit(move |remaining, limit, used| {
		sink.lock().push((remaining, limit, used));
	});
	let mut headers = HashMap::new();

	headers.insert("x-remaining-today".to_owned(), "15000".to_owned());
	headers.insert("x-limit-per-day".to_owned(), "100000".to_owned());

	limiter.update_from_headers(&headers);

	assert_eq!(*calls.lock(), vec![(15_000, 100_000, 85.)]);

	limiter.update_from_headers(&headers);

	assert_eq!(calls.lock().len(), 2);

	headers.insert("x-remaining-today".to_owned(), "50000".to_owned());
	limiter.update_from_headers(&headers);

	assert_eq!(calls.lock().len(), 2);
}

#[test]
fn non_numeric_headers_are_ignored() {
	let (_, limiter) = limiter(RateLimitConfig::default().with_max_requests_per_day(10));

	limiter.update_from_headers(&HeaderBag::new().with("X-Remaining-Today", "plenty"));

	let status = limiter.status();

	assert!(!status.is_from_headers);
	assert_eq!(status.remaining_today, 10);

	limiter.update_from_headers(
		&HeaderBag::new().with("X-Remaining-Today", "-20").with("X-Limit-Per-Day", "abc"),
	);

	let status = limiter.status();

	assert!(status.is_from_headers);
	assert_eq!(status.remaining_today, 0);
	assert_eq!(status.daily_limit, 10);
}

#[test]
fn rate_limit_responses_are_classified() {
	let (_, limiter) = limiter(RateLimitConfig::default().with_jitter(0.));
	let err = limiter
		.handle_rate_limit_response(&[("x-remaining-today", "0"), ("retry-after", "5")])
		.expect_err("Daily exhaustion should not be retried.");

	assert!(matches!(err, Error::RateLimit(ref e) if e.kind == RateLimitKind::QpdExhausted));
	assert_eq!(limiter.status().retry_count, 0);

	let backoff = limiter
		.handle_rate_limit_response(&[("x-remaining-this-second", "0"), ("x-remaining-today", "9")])
		.expect("Per-second exhaustion should be retried.");

	assert_eq!(backoff.kind, RateLimitKind::QpsExhausted);
	assert!(backoff.should_retry);
	assert_eq!(backoff.delay, Duration::SECOND);

	let backoff = limiter
		.handle_rate_limit_response(&HeaderBag::new())
		.expect("Unknown throttling should be retried.");

	assert_eq!(backoff.kind, RateLimitKind::Unknown);
	assert_eq!(backoff.delay, Duration::seconds(2));
}

#[test]
fn retry_after_floors_the_backoff_and_max_delay_caps_it() {
	let (_, limiter) = limiter(
		RateLimitConfig::default()
			.with_jitter(0.)
			.with_base_delay(Duration::SECOND)
			.with_max_delay(Duration::seconds(30))
			.with_max_retries(10),
	);
	let backoff = limiter
		.handle_rate_limit_response(&[("Retry-After", "12")])
		.expect("Backoff should be computed.");

	assert_eq!(backoff.delay, Duration::seconds(12));

	let backoff = limiter
		.handle_rate_limit_response(&[("retry-after", "120")])
		.expect("Backoff should be computed.");

	assert_eq!(backoff.delay, Duration::seconds(30));

	let backoff = limiter
		.handle_rate_limit_response(&[("retry-after", "Mon, 10 Nov 2025 12:00:03 GMT")])
		.expect("Backoff should be computed.");

	assert_eq!(backoff.delay, Duration::seconds(4));
}

#[test]
fn retry_budget_is_enforced_and_resettable() {
	let (_, limiter) = limiter(RateLimitConfig::default().with_max_retries(2).with_jitter(0.));

	for _ in 0..2 {
		limiter.handle_rate_limit_response(&HeaderBag::new()).expect("Within budget.");
	}

	let err = limiter
		.handle_rate_limit_response(&HeaderBag::new())
		.expect_err("Third 429 exceeds the budget.");

	assert!(matches!(err, Error::MaxRetriesExceeded { attempts: 3 }));

	limiter.reset_retry_count();

	let backoff =
		limiter.handle_rate_limit_response(&HeaderBag::new()).expect("Budget should be restored.");

	assert_eq!(backoff.delay, Duration::SECOND);
	assert_eq!(limiter.status().retry_count, 1);
}

#[test]
fn jitter_only_touches_the_exponential_component() {
	let (_, limiter) = limiter(
		RateLimitConfig::default()
			.with_jitter(0.5)
			.with_base_delay(Duration::SECOND)
			.with_max_retries(100),
	);

	for _ in 0..20 {
		let backoff = limiter
			.handle_rate_limit_response(&[("retry-after", "10")])
			.expect("Backoff should be computed.");

		assert!(backoff.delay >= Duration::seconds(10));

		limiter.reset_retry_count();
	}

	for _ in 0..20 {
		let backoff =
			limiter.handle_rate_limit_response(&HeaderBag::new()).expect("Backoff should be computed.");

		assert!(backoff.delay >= Duration::milliseconds(500));
		assert!(backoff.delay <= Duration::milliseconds(1_500));

		limiter.reset_retry_count();
	}
}
