//! Redis pub/sub implementation of the message bus.
//!
//! Redis pub/sub is fire-and-forget: messages reach only currently-connected
//! subscribers and are never persisted, which matches the bus contract
//! exactly. Each subscription holds its own pub/sub connection; dropping the
//! stream closes it and unsubscribes.

use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::future::Future;
use std::pin::Pin;

use crate::error::{CoordinationError, Result};
use crate::providers::{MessageBus, MessageStream};
use crate::state::PubSubMessage;

/// Redis-backed [`MessageBus`].
#[derive(Clone)]
pub struct RedisMessageBus {
    client: Client,
    conn_manager: ConnectionManager,
}

impl RedisMessageBus {
    /// Connect to Redis.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::Bus`] if the client or publish
    /// connection cannot be created.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| CoordinationError::Bus(format!("Failed to create Redis client: {e}")))?;
        let conn_manager = ConnectionManager::new(client.clone()).await.map_err(|e| {
            CoordinationError::Bus(format!("Failed to create Redis connection manager: {e}"))
        })?;
        Ok(Self {
            client,
            conn_manager,
        })
    }
}

impl MessageBus for RedisMessageBus {
    fn publish<'a>(
        &'a self,
        channel: &'a str,
        payload: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        let mut conn = self.conn_manager.clone();
        let channel = channel.to_string();
        let payload = payload.to_vec();
        Box::pin(async move {
            let receivers: i64 = conn
                .publish(&channel, payload)
                .await
                .map_err(|e| CoordinationError::Bus(format!("Publish failed: {e}")))?;
            tracing::debug!(channel = %channel, receivers, "Published message");
            Ok(())
        })
    }

    fn subscribe<'a>(
        &'a self,
        channels: &'a [&'a str],
    ) -> Pin<Box<dyn Future<Output = Result<MessageStream>> + Send + 'a>> {
        let client = self.client.clone();
        let channels: Vec<String> = channels.iter().map(ToString::to_string).collect();
        Box::pin(async move {
            let mut pubsub = client
                .get_async_pubsub()
                .await
                .map_err(|e| CoordinationError::Bus(format!("Subscribe connection failed: {e}")))?;
            for channel in &channels {
                pubsub
                    .subscribe(channel)
                    .await
                    .map_err(|e| CoordinationError::Bus(format!("Subscribe failed: {e}")))?;
            }
            tracing::debug!(channels = ?channels, "Subscribed");

            let stream = pubsub.into_on_message().map(|msg| PubSubMessage {
                channel: msg.get_channel_name().to_string(),
                payload: msg.get_payload_bytes().to_vec(),
            });
            Ok(Box::pin(stream) as MessageStream)
        })
    }
}
