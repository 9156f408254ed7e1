use std::time::Duration;

use event_bus::{EventBus, EventBusError};
use shared::{
    channel::ChannelName,
    protocol::{Delivery, MessageEvent},
};
use tracing::{debug, warn};

pub const MESSAGE_EVENT: &str = "message";

/// Publishes `event` on `channel`, giving up after `timeout`.
pub async fn publish_event(
    bus: &dyn EventBus,
    channel: &ChannelName,
    event: &MessageEvent,
    timeout: Duration,
) -> Result<(), EventBusError> {
    let channel_name = channel.to_string();
    let payload = serde_json::to_value(event)?;
    match tokio::time::timeout(timeout, bus.publish(&channel_name, MESSAGE_EVENT, &payload)).await
    {
        Ok(result) => result,
        Err(_) => Err(EventBusError::Timeout),
    }
}

/// Publishes after a committed write. Failure is reported, never propagated.
pub async fn publish_best_effort(
    bus: &dyn EventBus,
    channel: &ChannelName,
    event: &MessageEvent,
    timeout: Duration,
) -> Delivery {
    match publish_event(bus, channel, event, timeout).await {
        Ok(()) => {
            debug!(channel = %channel, message_id = ?event.message_id, "message fanned out");
            Delivery::Published
        }
        Err(err) => {
            warn!(
                channel = %channel,
                message_id = ?event.message_id,
                error = %err,
                "message stored but live delivery failed"
            );
            Delivery::Failed {
                warning: format!("message stored but not delivered live: {err}"),
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/fanout_tests.rs"]
mod tests;
