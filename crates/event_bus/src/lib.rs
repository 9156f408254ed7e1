//! Publish/subscribe transport used for live fan-out and channel authorization.

use async_trait::async_trait;
use shared::protocol::{ChannelAuth, PresenceData};
use thiserror::Error;

mod local;
mod pusher;
mod signing;

pub use local::{LocalEventBus, PublishedEvent};
pub use pusher::{PusherClient, PusherConfig};
pub use signing::{sign_subscription, validate_socket_id};

#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("invalid socket id `{0}`")]
    InvalidSocketId(String),
    #[error("event bus secret cannot be used as a signing key")]
    InvalidSecret,
    #[error("failed to encode event payload: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("invalid event bus endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
    #[error("event bus request timed out")]
    Timeout,
    #[error("event bus transport error: {0}")]
    Transport(reqwest::Error),
    #[error("event bus rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl From<reqwest::Error> for EventBusError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err)
        }
    }
}

#[async_trait]
pub trait EventBus: Send + Sync {
    /// Signs a subscription for `socket_id` on `channel_name`. `presence` is the
    /// member entry for presence channels and `None` for private ones.
    fn authorize_channel(
        &self,
        socket_id: &str,
        channel_name: &str,
        presence: Option<&PresenceData>,
    ) -> Result<ChannelAuth, EventBusError>;

    async fn publish(
        &self,
        channel_name: &str,
        event: &str,
        payload: &serde_json::Value,
    ) -> Result<(), EventBusError>;
}
