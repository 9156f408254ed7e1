use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use event_bus::{sign_subscription, EventBus, EventBusError};
use shared::{
    domain::{Principal, UserId},
    protocol::{ChannelAuth, PresenceData},
};
use storage::Storage;

use crate::{ApiContext, LobbyConfig};

#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    pub channel: String,
    pub event: String,
    pub payload: serde_json::Value,
}

/// Records every publish; optionally fails them all.
#[derive(Default)]
pub struct RecordingBus {
    pub published: Mutex<Vec<Published>>,
    pub fail_publish: bool,
}

impl RecordingBus {
    pub fn failing() -> Self {
        Self {
            fail_publish: true,
            ..Self::default()
        }
    }

    pub fn published(&self) -> Vec<Published> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventBus for RecordingBus {
    fn authorize_channel(
        &self,
        socket_id: &str,
        channel_name: &str,
        presence: Option<&PresenceData>,
    ) -> Result<ChannelAuth, EventBusError> {
        sign_subscription("test-key", "test-secret", socket_id, channel_name, presence)
    }

    async fn publish(
        &self,
        channel_name: &str,
        event: &str,
        payload: &serde_json::Value,
    ) -> Result<(), EventBusError> {
        if self.fail_publish {
            return Err(EventBusError::Rejected {
                status: 503,
                body: "unavailable".into(),
            });
        }
        self.published.lock().unwrap().push(Published {
            channel: channel_name.to_string(),
            event: event.to_string(),
            payload: payload.clone(),
        });
        Ok(())
    }
}

/// Never answers a publish.
pub struct HangingBus;

#[async_trait]
impl EventBus for HangingBus {
    fn authorize_channel(
        &self,
        socket_id: &str,
        channel_name: &str,
        presence: Option<&PresenceData>,
    ) -> Result<ChannelAuth, EventBusError> {
        sign_subscription("test-key", "test-secret", socket_id, channel_name, presence)
    }

    async fn publish(
        &self,
        _channel_name: &str,
        _event: &str,
        _payload: &serde_json::Value,
    ) -> Result<(), EventBusError> {
        std::future::pending().await
    }
}

pub async fn context(bus: Arc<dyn EventBus>, lobby: LobbyConfig) -> ApiContext {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    ApiContext {
        storage,
        bus,
        lobby,
        publish_timeout: Duration::from_millis(200),
    }
}

/// Inserts an account with a fixed id and returns its principal.
pub async fn account(storage: &Storage, id: i64, username: &str) -> Principal {
    sqlx::query("INSERT INTO accounts (id, username) VALUES (?, ?)")
        .bind(id)
        .bind(username)
        .execute(storage.pool())
        .await
        .expect("account");
    principal(id, username)
}

pub fn principal(id: i64, username: &str) -> Principal {
    Principal {
        account_id: UserId(id),
        username: username.to_string(),
        firstname: None,
        lastname: None,
        is_admin: false,
    }
}
