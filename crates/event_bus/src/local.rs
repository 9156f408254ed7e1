use async_trait::async_trait;
use shared::protocol::{ChannelAuth, PresenceData};
use tokio::sync::broadcast;
use tracing::debug;

use crate::{sign_subscription, EventBus, EventBusError};

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedEvent {
    pub channel: String,
    pub event: String,
    pub payload: serde_json::Value,
}

/// In-process bus for development and tests: subscriptions are signed like the
/// hosted bus and published events go to a broadcast channel.
#[derive(Clone)]
pub struct LocalEventBus {
    key: String,
    secret: String,
    events: broadcast::Sender<PublishedEvent>,
}

impl LocalEventBus {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            key: key.into(),
            secret: secret.into(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.events.subscribe()
    }
}

#[async_trait]
impl EventBus for LocalEventBus {
    fn authorize_channel(
        &self,
        socket_id: &str,
        channel_name: &str,
        presence: Option<&PresenceData>,
    ) -> Result<ChannelAuth, EventBusError> {
        sign_subscription(&self.key, &self.secret, socket_id, channel_name, presence)
    }

    async fn publish(
        &self,
        channel_name: &str,
        event: &str,
        payload: &serde_json::Value,
    ) -> Result<(), EventBusError> {
        // No subscribers is not a failure: delivery is best effort.
        let receivers = self
            .events
            .send(PublishedEvent {
                channel: channel_name.to_string(),
                event: event.to_string(),
                payload: payload.clone(),
            })
            .unwrap_or(0);
        debug!(channel = channel_name, event, receivers, "published local event");
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/local_tests.rs"]
mod tests;
