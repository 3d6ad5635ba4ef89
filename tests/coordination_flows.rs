//! End-to-end coordination flows over the in-memory providers.
//!
//! These exercise the components wired together the way production wires
//! them, substituting `MockKvStore`/`MockSlotRepository`/`MockMessageBus`
//! for Redis and Postgres:
//!
//! - concurrent reservations of overlapping slots admit exactly one winner
//! - sliding-window rate limiting over a shared identifier
//! - lock contention exhausts its retry budget in bounded time
//! - cached values disappear after their TTL
//! - availability cache entries are invalidated after a commit

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, NaiveTime};
use futures::StreamExt;
use greenroom::mocks::{MockKvStore, MockMessageBus, MockSlotRepository};
use greenroom::{
    BOOKING_CREATED_CHANNEL, BookingConfig, BookingConflictResolver, CacheManager,
    DistributedLock, LockConfig, MessageBus, RateLimiter, ReservationOutcome,
    ReservationRequest, SlotInterval, availability_cache_key,
};

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init()
        .ok();
}

fn june_first() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).expect("valid date")
}

fn evening_slot() -> SlotInterval {
    SlotInterval {
        date: june_first(),
        start: NaiveTime::from_hms_opt(20, 0, 0).expect("valid time"),
        end: NaiveTime::from_hms_opt(23, 0, 0).expect("valid time"),
    }
}

fn request(client: &str) -> ReservationRequest {
    ReservationRequest {
        client_name: client.to_string(),
        client_email: format!("{client}@example.com"),
        notes: None,
        amount_cents: Some(25_000),
        idempotency_key: None,
    }
}

fn resolver(
    store: MockKvStore,
    slots: MockSlotRepository,
) -> BookingConflictResolver<MockKvStore, MockSlotRepository> {
    BookingConflictResolver::new(
        store,
        slots,
        LockConfig {
            lease_ms: 5_000,
            max_retries: 5,
            retry_delay_ms: 10,
        },
        BookingConfig {
            deadline_ms: 2_000,
            idempotency_ttl_secs: 86_400,
        },
    )
}

#[tokio::test]
async fn concurrent_overlapping_reservations_admit_exactly_one() {
    init_tracing();
    let store = MockKvStore::new();
    let slots = MockSlotRepository::new();
    let resolver = Arc::new(resolver(store, slots.clone()));

    let first = Arc::clone(&resolver);
    let second = Arc::clone(&resolver);
    let (a, b) = tokio::join!(
        async move { first.reserve("venue-1", evening_slot(), request("ada")).await },
        async move { second.reserve("venue-1", evening_slot(), request("grace")).await },
    );

    let a = a.expect("first reservation ran");
    let b = b.expect("second reservation ran");
    assert_ne!(
        a.is_accepted(),
        b.is_accepted(),
        "exactly one of two overlapping reservations must win"
    );
    assert_eq!(slots.slot_count().await, 1);
}

#[tokio::test]
async fn many_concurrent_reservations_admit_exactly_one() {
    init_tracing();
    let store = MockKvStore::new();
    let slots = MockSlotRepository::new();
    let resolver = Arc::new(resolver(store, slots.clone()));

    let mut handles = Vec::new();
    for i in 0..8 {
        let resolver = Arc::clone(&resolver);
        handles.push(tokio::spawn(async move {
            resolver
                .reserve("venue-1", evening_slot(), request(&format!("client-{i}")))
                .await
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        let outcome = handle
            .await
            .expect("task completed")
            .expect("reservation ran");
        if outcome.is_accepted() {
            accepted += 1;
        }
    }

    assert_eq!(accepted, 1);
    assert_eq!(slots.slot_count().await, 1);
}

#[tokio::test]
async fn sixth_request_in_window_is_rejected() {
    let limiter = RateLimiter::new(MockKvStore::new());
    let window = Duration::from_secs(60);

    for attempt in 1..=5 {
        let decision = limiter.check_limit("ip:1.2.3.4", 5, window).await;
        assert!(decision.allowed, "request {attempt} should be admitted");
    }

    let decision = limiter.check_limit("ip:1.2.3.4", 5, window).await;
    assert!(!decision.allowed);
    assert_eq!(decision.remaining, 0);

    // A different identifier has its own window.
    let other = limiter.check_limit("ip:5.6.7.8", 5, window).await;
    assert!(other.allowed);
}

#[tokio::test]
async fn contended_acquire_gives_up_after_retry_budget() {
    let store = MockKvStore::new();
    let lock = DistributedLock::new(store.clone());

    let holder = lock
        .acquire(
            "lock:venue-1:2024-06-01",
            Duration::from_secs(5),
            0,
            Duration::from_millis(1),
        )
        .await
        .expect("uncontended acquire succeeds");

    let started = Instant::now();
    let contender = lock
        .acquire(
            "lock:venue-1:2024-06-01",
            Duration::from_secs(5),
            3,
            Duration::from_millis(100),
        )
        .await;
    let elapsed = started.elapsed();

    assert!(contender.is_none());
    assert!(
        elapsed >= Duration::from_millis(300),
        "three retries at 100ms should take at least 300ms, took {elapsed:?}"
    );

    assert!(lock.release(&holder).await);
}

#[tokio::test]
async fn cached_value_expires_after_ttl() {
    let cache = CacheManager::new(MockKvStore::new());

    assert!(
        cache
            .set("k", &serde_json::json!({"a": 1}), Duration::from_secs(1))
            .await
    );
    assert_eq!(
        cache.get::<serde_json::Value>("k").await,
        Some(serde_json::json!({"a": 1}))
    );

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(cache.get::<serde_json::Value>("k").await, None);
}

#[tokio::test]
async fn successful_reservation_invalidates_availability_and_publishes() {
    init_tracing();
    let store = MockKvStore::new();
    let slots = MockSlotRepository::new();
    let bus = Arc::new(MockMessageBus::new());
    let resolver = resolver(store.clone(), slots).with_bus(bus.clone());

    let mut events = bus
        .subscribe(&[BOOKING_CREATED_CHANNEL])
        .await
        .expect("subscribed");

    // Plant stale availability entries for the target date.
    let cache = CacheManager::new(store);
    let day_key = availability_cache_key("venue-1", june_first());
    assert!(cache.set(&day_key, &vec!["20:00"], Duration::from_secs(300)).await);
    assert!(
        cache
            .set(
                &format!("{day_key}:detail"),
                &serde_json::json!({"slots": 12}),
                Duration::from_secs(300),
            )
            .await
    );

    let outcome = resolver
        .reserve("venue-1", evening_slot(), request("ada"))
        .await
        .expect("reservation ran");
    assert!(matches!(outcome, ReservationOutcome::Accepted { .. }));

    // Stale availability is gone, so the next read repopulates from the
    // durable store.
    assert_eq!(cache.get::<Vec<String>>(&day_key).await, None);
    assert_eq!(
        cache
            .get::<serde_json::Value>(&format!("{day_key}:detail"))
            .await,
        None
    );

    let event = tokio::time::timeout(Duration::from_secs(1), events.next())
        .await
        .expect("event arrived")
        .expect("stream open");
    assert_eq!(event.channel, BOOKING_CREATED_CHANNEL);
    let payload: serde_json::Value =
        serde_json::from_slice(&event.payload).expect("event is JSON");
    assert_eq!(payload["resource"], "venue-1");
}

#[tokio::test]
async fn rejected_reservation_reports_the_conflicting_interval() {
    let store = MockKvStore::new();
    let slots = MockSlotRepository::new();
    let resolver = resolver(store, slots);

    let outcome = resolver
        .reserve("venue-1", evening_slot(), request("ada"))
        .await
        .expect("first reservation ran");
    assert!(outcome.is_accepted());

    let late_show = SlotInterval {
        date: june_first(),
        start: NaiveTime::from_hms_opt(22, 0, 0).expect("valid time"),
        end: NaiveTime::from_hms_opt(23, 30, 0).expect("valid time"),
    };
    let outcome = resolver
        .reserve("venue-1", late_show, request("grace"))
        .await
        .expect("second reservation ran");

    match outcome {
        ReservationOutcome::Rejected { reason } => {
            let conflicting = reason.conflicting_interval().expect("conflict detail");
            assert!(conflicting.overlaps(&late_show));
        }
        ReservationOutcome::Accepted { .. } => {
            panic!("overlapping reservation must be rejected")
        }
    }
}
