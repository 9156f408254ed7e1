use std::time::Duration;

use async_trait::async_trait;
use md5::{Digest, Md5};
use serde::Serialize;
use shared::protocol::{ChannelAuth, PresenceData};
use tracing::{debug, warn};
use url::Url;

use crate::signing::hmac_hex;
use crate::{sign_subscription, EventBus, EventBusError};

const AUTH_VERSION: &str = "1.0";

#[derive(Debug, Clone)]
pub struct PusherConfig {
    pub app_id: String,
    pub key: String,
    pub secret: String,
    /// Host (optionally with port) of the REST endpoint, e.g. `api-eu.pusher.com`.
    pub host: String,
    pub use_tls: bool,
    pub timeout: Duration,
}

impl PusherConfig {
    pub fn for_cluster(
        app_id: impl Into<String>,
        key: impl Into<String>,
        secret: impl Into<String>,
        cluster: &str,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            key: key.into(),
            secret: secret.into(),
            host: format!("api-{cluster}.pusher.com"),
            use_tls: true,
            timeout: Duration::from_secs(3),
        }
    }
}

#[derive(Serialize)]
struct TriggerBody<'a> {
    name: &'a str,
    channels: [&'a str; 1],
    data: String,
}

/// Client for a hosted Pusher-protocol bus: signs subscriptions locally and
/// triggers events over the signed REST API.
#[derive(Clone)]
pub struct PusherClient {
    config: PusherConfig,
    http: reqwest::Client,
}

impl PusherClient {
    pub fn new(config: PusherConfig) -> Result<Self, EventBusError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, http })
    }

    fn events_path(&self) -> String {
        format!("/apps/{}/events", self.config.app_id)
    }

    pub(crate) fn signed_events_url(
        &self,
        body: &str,
        timestamp: i64,
    ) -> Result<Url, EventBusError> {
        let path = self.events_path();
        let body_md5 = hex::encode(Md5::digest(body.as_bytes()));

        // Parameters must be sorted by key for the signature.
        let params = [
            ("auth_key", self.config.key.clone()),
            ("auth_timestamp", timestamp.to_string()),
            ("auth_version", AUTH_VERSION.to_string()),
            ("body_md5", body_md5),
        ];
        let query = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let signature = hmac_hex(&self.config.secret, &format!("POST\n{path}\n{query}"))?;

        let scheme = if self.config.use_tls { "https" } else { "http" };
        let mut url = Url::parse(&format!("{scheme}://{}{path}", self.config.host))?;
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &params {
                pairs.append_pair(k, v);
            }
            pairs.append_pair("auth_signature", &signature);
        }
        Ok(url)
    }
}

#[async_trait]
impl EventBus for PusherClient {
    fn authorize_channel(
        &self,
        socket_id: &str,
        channel_name: &str,
        presence: Option<&PresenceData>,
    ) -> Result<ChannelAuth, EventBusError> {
        sign_subscription(
            &self.config.key,
            &self.config.secret,
            socket_id,
            channel_name,
            presence,
        )
    }

    async fn publish(
        &self,
        channel_name: &str,
        event: &str,
        payload: &serde_json::Value,
    ) -> Result<(), EventBusError> {
        let body = serde_json::to_string(&TriggerBody {
            name: event,
            channels: [channel_name],
            data: serde_json::to_string(payload)?,
        })?;
        let url = self.signed_events_url(&body, chrono::Utc::now().timestamp())?;

        let response = self
            .http
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(channel = channel_name, event, "event published");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        warn!(channel = channel_name, event, status = status.as_u16(), "event bus rejected publish");
        Err(EventBusError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
#[path = "tests/pusher_tests.rs"]
mod tests;
