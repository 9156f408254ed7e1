use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use event_bus::{EventBus, LocalEventBus, PusherClient, PusherConfig};
use server_api::{ApiContext, JwtIdentityProvider, LobbyConfig};
use shared::domain::ConversationId;
use storage::{Storage, StorageOptions};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod routes;

use config::{load_settings, EventBusKind, Settings};
use routes::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings()?;
    if settings.uses_default_jwt_secret() {
        warn!("jwt_secret not configured; using the development default");
    }

    let database_url = settings.database_url.clone();
    let storage = Storage::connect(StorageOptions {
        max_connections: settings.max_connections,
        acquire_timeout: settings.acquire_timeout(),
        ..StorageOptions::new(&database_url)
    })
    .await
    .map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let lobby = LobbyConfig {
        channel: settings.lobby_channel.clone(),
        conversation_id: settings.lobby_conversation_id.map(ConversationId),
    };
    match lobby.conversation_id {
        Some(id) => info!(channel = %lobby.channel, conversation_id = %id, "lobby messages are stored"),
        None => warn!(channel = %lobby.channel, "no lobby conversation configured; lobby messages are published only"),
    }

    let api = ApiContext {
        storage,
        bus: build_event_bus(&settings)?,
        lobby,
        publish_timeout: settings.publish_timeout(),
    };
    let state = AppState {
        api,
        identity: JwtIdentityProvider::new(&settings.jwt_secret),
    };
    let app = build_router(Arc::new(state), settings.body_limit_bytes);

    let addr: SocketAddr = settings
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address `{}`", settings.bind_addr))?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_event_bus(settings: &Settings) -> anyhow::Result<Arc<dyn EventBus>> {
    let pusher = &settings.pusher;
    match settings.event_bus {
        EventBusKind::Local => {
            info!("using in-process event bus");
            Ok(Arc::new(LocalEventBus::new(
                pusher.key.clone().unwrap_or_else(|| "local-key".into()),
                pusher.secret.clone().unwrap_or_else(|| "local-secret".into()),
            )))
        }
        EventBusKind::Pusher => {
            let app_id = pusher.app_id.clone().context("PUSHER_APP_ID is required")?;
            let key = pusher.key.clone().context("PUSHER_KEY is required")?;
            let secret = pusher.secret.clone().context("PUSHER_SECRET is required")?;
            let cluster = pusher.cluster.as_deref().unwrap_or("mt1");

            let mut config = PusherConfig::for_cluster(app_id, key, secret, cluster);
            if let Some(host) = &pusher.host {
                config.host = host.clone();
            }
            config.timeout = settings.publish_timeout();
            info!(host = %config.host, "using pusher event bus");
            Ok(Arc::new(PusherClient::new(config)?))
        }
    }
}
