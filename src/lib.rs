//! # Greenroom
//!
//! Coordination layer for a booking platform: a fast key-value store
//! (Redis in production) sits in front of the durable database and carries
//! the cross-cutting concerns every request path shares.
//!
//! ## Components
//!
//! - **[`CacheManager`]**: typed cache-aside reads and writes over any
//!   [`KvStore`], fail-open on store trouble
//! - **[`SessionStore`]**: session lifecycle with sliding TTL refresh
//! - **[`RateLimiter`]**: per-identifier sliding-window limiting over a
//!   sorted set, fail-open
//! - **[`DistributedLock`]**: leased mutual exclusion with owner-checked
//!   release
//! - **[`CacheInvalidator`]**: pattern-based invalidation fanned out over
//!   the [`MessageBus`]
//! - **[`BookingConflictResolver`]**: lock, verify against the durable
//!   store, commit, release, invalidate, publish
//!
//! Components are generic over the [`KvStore`] and [`SlotRepository`]
//! provider traits. Production implementations live in [`stores`];
//! in-memory ones for tests live in [`mocks`] behind the default-on
//! `test-utils` feature.
//!
//! ## Example
//!
//! ```ignore
//! use greenroom::prelude::*;
//!
//! let config = Config::from_env();
//! let store = RedisKvStore::connect(&config.redis.url).await?;
//! let slots = PostgresSlotRepository::connect(&config.postgres).await?;
//! let resolver = BookingConflictResolver::new(
//!     store.clone(),
//!     slots,
//!     config.lock.clone(),
//!     config.booking.clone(),
//! );
//! let outcome = resolver.reserve("venue-1", interval, request).await?;
//! ```

pub mod booking;
pub mod cache;
pub mod config;
pub mod error;
pub mod invalidation;
pub mod lock;
#[cfg(feature = "test-utils")]
pub mod mocks;
pub mod providers;
pub mod rate_limit;
pub mod serialize;
pub mod session;
pub mod state;
pub mod stores;

pub use booking::{BOOKING_CREATED_CHANNEL, BookingConflictResolver};
pub use cache::CacheManager;
pub use config::{BookingConfig, Config, LockConfig, RateLimitPolicy, TtlTier};
pub use error::{CoordinationError, Result};
pub use invalidation::{CacheInvalidator, INVALIDATION_CHANNEL, availability_cache_key};
pub use lock::{DistributedLock, LockGuard};
pub use providers::{KvStore, MessageBus, MessageStream, SlotRepository};
pub use rate_limit::RateLimiter;
pub use serialize::{BincodeSerializer, JsonSerializer, Serializer};
pub use session::SessionStore;
pub use state::{
    BookingId, BookingSlot, PubSubMessage, RateLimitDecision, RejectionReason,
    ReservationOutcome, ReservationRequest, SessionId, SessionRecord, SlotInterval, SlotStatus,
};

/// Convenience imports for wiring the coordination layer together.
pub mod prelude {
    pub use crate::booking::BookingConflictResolver;
    pub use crate::cache::CacheManager;
    pub use crate::config::Config;
    pub use crate::error::{CoordinationError, Result};
    pub use crate::invalidation::CacheInvalidator;
    pub use crate::lock::DistributedLock;
    pub use crate::providers::{KvStore, MessageBus, SlotRepository};
    pub use crate::rate_limit::RateLimiter;
    pub use crate::session::SessionStore;
    pub use crate::state::{
        ReservationOutcome, ReservationRequest, SlotInterval, SlotStatus,
    };
    pub use crate::stores::{PostgresSlotRepository, RedisKvStore, RedisMessageBus};
}
