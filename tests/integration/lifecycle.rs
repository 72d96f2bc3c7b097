//! Integration coverage for registration lifecycle, teardown, and status inspection.

// std
use std::{
	sync::{
		Arc,
		atomic::{AtomicU32, Ordering},
	},
	time::Duration,
};
// crates.io
use rehydrate::{Cache, Error, RegistrationConfig, WorkerStatus};
use tokio::time;

#[tokio::test(start_paused = true)]
async fn rejects_invalid_parameters() {
	let _ = tracing_subscriber::fmt::try_init();

	let cache = Cache::<u32>::new();

	for (ttl, interval) in [(0, 0), (-1, 0), (10, -1), (10, 10), (5, 9)] {
		let err = cache
			.register_function("k", RegistrationConfig::new(ttl, interval), || async { Ok(1) })
			.await
			.unwrap_err();

		assert!(matches!(err, Error::Validation { .. }), "({ttl}, {interval}) got {err:?}");
	}

	// None of the rejected registrations left any trace.
	let err = cache.get("k", Duration::ZERO).await.unwrap_err();

	assert!(matches!(err, Error::NotRegistered { .. }));
}

#[tokio::test(start_paused = true)]
async fn losing_registration_leaves_the_winner_untouched() {
	let _ = tracing_subscriber::fmt::try_init();

	let cache = Cache::new();

	cache
		.register_function("k", RegistrationConfig::new(10, 3), || async { Ok(1) })
		.await
		.unwrap();

	let err = cache
		.register_function("k", RegistrationConfig::new(20, 5), || async { Ok(2) })
		.await
		.unwrap_err();

	assert!(matches!(err, Error::AlreadyRegistered { .. }), "got {err:?}");

	time::sleep(Duration::from_millis(100)).await;

	assert_eq!(*cache.get("k", Duration::from_secs(1)).await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_registrations_have_exactly_one_winner() {
	let _ = tracing_subscriber::fmt::try_init();

	let cache = Cache::<u32>::new();
	let mut attempts = Vec::new();

	for i in 0..8 {
		let cache = cache.clone();

		attempts.push(tokio::spawn(async move {
			cache
				.register_function("k", RegistrationConfig::new(10, 3), move || async move {
					Ok(i)
				})
				.await
				.map(|_| i)
		}));
	}

	let mut winners = Vec::new();
	let mut losers = 0;

	for attempt in attempts {
		match attempt.await.unwrap() {
			Ok(i) => winners.push(i),
			Err(Error::AlreadyRegistered { .. }) => losers += 1,
			Err(err) => panic!("unexpected error: {err:?}"),
		}
	}

	assert_eq!(winners.len(), 1);
	assert_eq!(losers, 7);

	let value = cache.get("k", Duration::from_secs(5)).await.unwrap();

	assert_eq!(*value, winners[0], "the cache serves the winning registration's value");

	cache.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn deregistration_releases_blocked_readers() {
	let _ = tracing_subscriber::fmt::try_init();

	let cache = Cache::<u32>::new();

	cache
		.register_function("k", RegistrationConfig::new(10, 1), || async {
			time::sleep(Duration::from_secs(3600)).await;

			Ok(1)
		})
		.await
		.unwrap();

	let reader = {
		let cache = cache.clone();

		tokio::spawn(async move { cache.get("k", Duration::from_secs(60)).await })
	};

	time::sleep(Duration::from_secs(1)).await;
	cache.deregister("k").await.unwrap();

	let err = reader.await.unwrap().unwrap_err();

	// Blocked readers observe the deregistration, not their own deadline.
	assert!(matches!(err, Error::NotRegistered { .. }), "got {err:?}");

	let err = cache.deregister("k").await.unwrap_err();

	assert!(matches!(err, Error::NotRegistered { .. }), "deregistration is not retryable");
}

#[tokio::test(start_paused = true)]
async fn deregister_then_reregister_round_trips() {
	let _ = tracing_subscriber::fmt::try_init();

	let cache = Cache::new();

	cache
		.register_function("k", RegistrationConfig::new(2, 1), || async { Ok(1) })
		.await
		.unwrap();

	time::sleep(Duration::from_millis(100)).await;
	cache.deregister("k").await.unwrap();
	cache
		.register_function("k", RegistrationConfig::new(2, 1), || async { Ok(2) })
		.await
		.unwrap();

	time::sleep(Duration::from_millis(100)).await;

	assert_eq!(*cache.get("k", Duration::from_secs(1)).await.unwrap(), 2);
}

#[tokio::test(start_paused = true)]
async fn deregistered_slot_serves_until_it_expires() {
	let _ = tracing_subscriber::fmt::try_init();

	let cache = Cache::new();

	cache
		.register_function("k", RegistrationConfig::new(2, 1), || async { Ok(7) })
		.await
		.unwrap();

	time::sleep(Duration::from_millis(100)).await;
	cache.deregister("k").await.unwrap();

	// The last stored value stays visible until its own TTL passes.
	assert_eq!(*cache.get("k", Duration::from_secs(1)).await.unwrap(), 7);

	time::sleep(Duration::from_millis(2500)).await;

	let err = cache.get("k", Duration::from_secs(1)).await.unwrap_err();

	assert!(matches!(err, Error::NotRegistered { .. }), "got {err:?}");
}

#[tokio::test(start_paused = true)]
async fn concurrent_readers_coalesce_on_one_compute() {
	let _ = tracing_subscriber::fmt::try_init();

	let cache = Cache::new();
	let calls = Arc::new(AtomicU32::new(0));
	let counter = calls.clone();

	cache
		.register_function("k", RegistrationConfig::new(10, 3), move || {
			let counter = counter.clone();

			async move {
				counter.fetch_add(1, Ordering::SeqCst);
				time::sleep(Duration::from_secs(2)).await;

				Ok("shared".to_owned())
			}
		})
		.await
		.unwrap();

	let timeout = Duration::from_secs(5);
	let (first, second, third) =
		tokio::join!(cache.get("k", timeout), cache.get("k", timeout), cache.get("k", timeout));
	let (first, second, third) = (first.unwrap(), second.unwrap(), third.unwrap());

	assert!(Arc::ptr_eq(&first, &second));
	assert!(Arc::ptr_eq(&second, &third));
	assert_eq!(calls.load(Ordering::SeqCst), 1, "readers never start their own compute");
}

#[tokio::test(start_paused = true)]
async fn snapshot_tracks_freshness_per_key() {
	let _ = tracing_subscriber::fmt::try_init();

	let cache = Cache::new();
	let calls = Arc::new(AtomicU32::new(0));
	let counter = calls.clone();

	// "fading" succeeds once and fails from then on, so its slot expires without replacement.
	cache
		.register_function("fading", RegistrationConfig::new(3, 2), move || {
			let counter = counter.clone();

			async move {
				if counter.fetch_add(1, Ordering::SeqCst) == 0 {
					Ok(1)
				} else {
					Err("upstream offline".into())
				}
			}
		})
		.await
		.unwrap();
	cache
		.register_function("steady", RegistrationConfig::new(30, 5), || async { Ok(2) })
		.await
		.unwrap();

	time::sleep(Duration::from_millis(100)).await;

	let snapshot = cache.snapshot().await;

	assert_eq!(snapshot.len(), 2);

	time::sleep(Duration::from_millis(3500)).await;

	let snapshot = cache.snapshot().await;

	assert_eq!(snapshot.len(), 1);
	assert_eq!(snapshot.get("steady").map(|v| **v), Some(2));
}

#[tokio::test(start_paused = true)]
async fn statuses_report_worker_and_freshness() {
	let _ = tracing_subscriber::fmt::try_init();

	let cache = Cache::new();

	cache
		.register_function("k", RegistrationConfig::new(10, 3), || async { Ok(1) })
		.await
		.unwrap();

	time::sleep(Duration::from_secs(1)).await;

	let status = cache.status("k").await.unwrap();

	assert_eq!(status.worker, WorkerStatus::Sleeping);
	assert!(status.last_refresh.is_some());
	assert!(matches!(status.expires_in_seconds, Some(seconds) if seconds > 0 && seconds <= 10));
	assert!(status.next_refresh_in_seconds.is_some());
	assert_eq!(status.metrics.refresh_successes, 1);

	assert_eq!(cache.statuses().await.len(), 1);

	let err = cache.status("absent").await.unwrap_err();

	assert!(matches!(err, Error::NotRegistered { .. }));
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_every_worker() {
	let _ = tracing_subscriber::fmt::try_init();

	let cache = Cache::new();
	let calls = Arc::new(AtomicU32::new(0));
	let counter = calls.clone();

	cache
		.register_function("a", RegistrationConfig::new(2, 1), move || {
			let counter = counter.clone();

			async move { Ok(counter.fetch_add(1, Ordering::SeqCst)) }
		})
		.await
		.unwrap();
	cache
		.register_function("b", RegistrationConfig::new(2, 1), || async { Ok(0) })
		.await
		.unwrap();

	time::sleep(Duration::from_millis(100)).await;
	cache.shutdown().await;

	assert!(cache.statuses().await.is_empty());

	let computes_after_shutdown = calls.load(Ordering::SeqCst);

	// Workers are gone: no further computes land and the slots expire on their own.
	time::sleep(Duration::from_secs(5)).await;

	assert_eq!(calls.load(Ordering::SeqCst), computes_after_shutdown);

	for key in ["a", "b"] {
		let err = cache.get(key, Duration::from_millis(100)).await.unwrap_err();

		assert!(matches!(err, Error::NotRegistered { .. }), "got {err:?}");
	}
}
