// std
use std::sync::{
	Arc,
	atomic::{AtomicU32, Ordering},
};
// crates.io
use parking_lot::Mutex;
use time::{Duration, OffsetDateTime, macros};
// self
use oauth2_resilience::{
	CancellationToken,
	clock::{Clock, ManualClock},
	error::{ApiError, Error, TransportError},
	retry::{RetryConfig, RetryManager, RetryOverrides, with_retry, with_retry_on},
};

const EPOCH: OffsetDateTime = macros::datetime!(2025-11-10 12:00 UTC);

fn deterministic() -> RetryConfig {
	RetryConfig::default()
		.with_base_delay(Duration::SECOND)
		.with_max_delay(Duration::seconds(30))
		.with_jitter_factor(0.)
}

/// Fails with `status` for the first `failures` attempts, then yields the attempt number.
async fn flaky(attempts: &AtomicU32, failures: u32, status: u16) -> Result<u32, Error> {
	let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;

	if n <= failures { Err(ApiError::new(status).into()) } else { Ok(n) }
}

#[tokio::test]
async fn transient_failures_are_retried_with_growing_delays() {
	let clock = ManualClock::new(EPOCH);
	let attempts = AtomicU32::new(0);
	let retries = Arc::new(Mutex::new(Vec::new()));
	let sink = retries.clone();
	let config = deterministic().with_on_retry(move |n, err| {
		sink.lock().push((n, err.status_code()));
	});
	let value = with_retry_on(&clock, || flaky(&attempts, 2, 500), &config)
		.await
		.expect("Third attempt should succeed.");

	assert_eq!(value, 3);
	assert_eq!(attempts.load(Ordering::SeqCst), 3);
	assert_eq!(*retries.lock(), vec![(1, Some(500)), (2, Some(500))]);
	assert_eq!(clock.sleeps(), vec![Duration::SECOND, Duration::seconds(2)]);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
	let clock = ManualClock::new(EPOCH);
	let attempts = AtomicU32::new(0);
	let err = with_retry_on(&clock, || flaky(&attempts, 5, 400), &deterministic())
		.await
		.expect_err("Bad request should surface immediately.");

	assert_eq!(err.status_code(), Some(400));
	assert_eq!(attempts.load(Ordering::SeqCst), 1);
	assert!(clock.sleeps().is_empty());
}

#[tokio::test]
async fn exhausted_budget_returns_the_last_error() {
	let clock = ManualClock::new(EPOCH);
	let attempts = AtomicU32::new(0);
	let config = deterministic().with_max_retries(2);
	let err = with_retry_on(&clock, || flaky(&attempts, 10, 503), &config)
		.await
		.expect_err("Budget should run out.");

	assert!(matches!(err, Error::Api(ref e) if e.status == 503));
	assert_eq!(attempts.load(Ordering::SeqCst), 3);
	assert_eq!(clock.sleeps().len(), 2);
}

#[tokio::test]
async fn linear_backoff_grows_by_the_base_delay() {
	let clock = ManualClock::new(EPOCH);
	let attempts = AtomicU32::new(0);
	let config = deterministic().with_exponential(false).with_max_retries(3);

	with_retry_on(&clock, || flaky(&attempts, 3, 502), &config)
		.await
		.expect("Fourth attempt should succeed.");

	assert_eq!(clock.sleeps(), vec![Duration::SECOND, Duration::seconds(2), Duration::seconds(3)]);
}

#[tokio::test]
async fn transport_failures_follow_their_own_switch() {
	let clock = ManualClock::new(EPOCH);
	let attempts = AtomicU32::new(0);
	let op = || {
		let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;

		async move {
			if n == 1 {
				Err::<u32, Error>(
					TransportError::Io(std::io::ErrorKind::ConnectionReset.into()).into(),
				)
			} else {
				Ok(n)
			}
		}
	};

	assert_eq!(with_retry_on(&clock, op, &deterministic()).await.expect("Retry should recover."), 2);

	attempts.store(0, Ordering::SeqCst);

	let err = with_retry_on(&clock, op, &deterministic().with_retry_on_transport(false))
		.await
		.expect_err("Transport retries are disabled.");

	assert!(err.is_transport());
	assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn predicate_overrides_status_classification() {
	let clock = ManualClock::new(EPOCH);
	let attempts = AtomicU32::new(0);
	let config = deterministic().with_should_retry(|err| err.status_code() == Some(404));

	with_retry_on(&clock, || flaky(&attempts, 1, 404), &config)
		.await
		.expect("404 should be retried under the custom predicate.");

	assert_eq!(attempts.load(Ordering::SeqCst), 2);

	attempts.store(0, Ordering::SeqCst);

	with_retry_on(&clock, || flaky(&attempts, 1, 503), &config)
		.await
		.expect_err("503 should not be retried under the custom predicate.");

	assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancellation_before_the_first_attempt_skips_the_operation() {
	let clock = ManualClock::new(EPOCH);
	let attempts = AtomicU32::new(0);
	let token = CancellationToken::new();

	token.cancel();

	let err = with_retry_on(&clock, || flaky(&attempts, 0, 200), &deterministic().with_cancel(token))
		.await
		.expect_err("Cancelled run should abort.");

	assert!(err.is_aborted());
	assert_eq!(attempts.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancellation_interrupts_a_pending_wait() {
	let attempts = AtomicU32::new(0);
	let token = CancellationToken::new();
	let config = deterministic().with_base_delay(Duration::seconds(30)).with_cancel(token.clone());
	let canceller = tokio::spawn(async move {
		tokio::time::sleep(std::time::Duration::from_millis(50)).await;
		token.cancel();
	});
	let started = std::time::Instant::now();
	let err = with_retry(|| flaky(&attempts, 10, 503), &config)
		.await
		.expect_err("Cancelled wait should abort.");

	canceller.await.expect("Canceller task should finish.");

	assert!(matches!(err, Error::Aborted));
	assert_eq!(attempts.load(Ordering::SeqCst), 1);
	assert!(started.elapsed() < std::time::Duration::from_secs(5));
}

#[tokio::test]
async fn manager_merges_per_call_overrides() {
	let clock = Arc::new(ManualClock::new(EPOCH));
	let shared: Arc<dyn Clock> = clock.clone();
	let manager = RetryManager::with_clock(deterministic().with_max_retries(1), shared);
	let attempts = AtomicU32::new(0);

	manager
		.execute(|| flaky(&attempts, 5, 503))
		.await
		.expect_err("Default budget allows a single retry.");

	assert_eq!(attempts.load(Ordering::SeqCst), 2);
	assert_eq!(clock.sleeps(), vec![Duration::SECOND]);

	attempts.store(0, Ordering::SeqCst);

	let value = manager
		.execute_with(
			|| flaky(&attempts, 2, 503),
			RetryOverrides::default().max_retries(4).base_delay(Duration::milliseconds(100)),
		)
		.await
		.expect("Overrides should widen the budget.");

	assert_eq!(value, 3);
	assert_eq!(
		clock.sleeps()[1..].to_vec(),
		vec![Duration::milliseconds(100), Duration::milliseconds(200)]
	);
	assert_eq!(manager.config().max_retries, 1);
}
