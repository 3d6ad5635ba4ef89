//! Pub/sub bus trait for cross-instance signals.
//!
//! Delivery is at-most-once and only to currently-subscribed listeners; no
//! message is persisted or redelivered. The bus carries cache invalidation
//! signals and live notifications, never durable business events (those go
//! to the relational store first).

use futures::Stream;
use std::future::Future;
use std::pin::Pin;

use crate::error::Result;
use crate::state::PubSubMessage;

/// Stream of messages from a subscription. Dropping the stream unsubscribes.
pub type MessageStream = Pin<Box<dyn Stream<Item = PubSubMessage> + Send>>;

/// Publish/subscribe fan-out.
///
/// Methods return boxed futures so the trait is object-safe; components that
/// publish opportunistically hold an `Arc<dyn MessageBus>`.
pub trait MessageBus: Send + Sync {
    /// Publish a payload to a channel. Best-effort: a publish with no
    /// subscribers succeeds and the message is dropped.
    fn publish<'a>(
        &'a self,
        channel: &'a str,
        payload: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Subscribe to one or more channels, receiving every message published
    /// to any of them from this point on.
    fn subscribe<'a>(
        &'a self,
        channels: &'a [&'a str],
    ) -> Pin<Box<dyn Future<Output = Result<MessageStream>> + Send + 'a>>;
}
