//! In-memory pub/sub bus for tests, backed by tokio broadcast channels.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::error::{CoordinationError, Result};
use crate::providers::{MessageBus, MessageStream};
use crate::state::PubSubMessage;

const CHANNEL_CAPACITY: usize = 64;

/// In-memory [`MessageBus`]. Messages published to a channel with no
/// subscribers are dropped, matching Redis pub/sub fire-and-forget
/// semantics.
#[derive(Debug, Clone, Default)]
pub struct MockMessageBus {
    channels: Arc<Mutex<HashMap<String, broadcast::Sender<PubSubMessage>>>>,
}

impl MockMessageBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, channel: &str) -> Result<broadcast::Sender<PubSubMessage>> {
        let mut channels = self
            .channels
            .lock()
            .map_err(|_| CoordinationError::Bus("mutex poisoned".into()))?;
        Ok(channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone())
    }
}

impl MessageBus for MockMessageBus {
    fn publish<'a>(
        &'a self,
        channel: &'a str,
        payload: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let sender = self.sender(channel)?;
            let message = PubSubMessage {
                channel: channel.to_string(),
                payload: payload.to_vec(),
            };
            // No subscribers is not an error.
            let _ = sender.send(message);
            Ok(())
        })
    }

    fn subscribe<'a>(
        &'a self,
        channels: &'a [&'a str],
    ) -> Pin<Box<dyn Future<Output = Result<MessageStream>> + Send + 'a>> {
        Box::pin(async move {
            let mut streams = Vec::with_capacity(channels.len());
            for channel in channels {
                let receiver = self.sender(channel)?.subscribe();
                // Lagged receivers skip ahead; dropped messages are
                // acceptable for fire-and-forget delivery.
                let stream = BroadcastStream::new(receiver)
                    .filter_map(|item| async move { item.ok() })
                    .boxed();
                streams.push(stream);
            }
            Ok(Box::pin(futures::stream::select_all(streams)) as MessageStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn published_messages_reach_subscriber() {
        let bus = MockMessageBus::new();
        let mut stream = bus.subscribe(&["orders"]).await.unwrap();

        bus.publish("orders", b"hello").await.unwrap();
        let message = stream.next().await.unwrap();
        assert_eq!(message.channel, "orders");
        assert_eq!(message.payload, b"hello");
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn subscriber_receives_only_its_channels() {
        let bus = MockMessageBus::new();
        let mut stream = bus.subscribe(&["a", "b"]).await.unwrap();

        bus.publish("c", b"ignored").await.unwrap();
        bus.publish("b", b"seen").await.unwrap();

        let message = stream.next().await.unwrap();
        assert_eq!(message.channel, "b");
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn publish_without_subscribers_succeeds() {
        let bus = MockMessageBus::new();
        bus.publish("empty", b"dropped").await.unwrap();
    }
}
