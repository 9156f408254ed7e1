use std::{collections::HashMap, fs, time::Duration};

use anyhow::{bail, Context};

const DEFAULT_JWT_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventBusKind {
    Pusher,
    Local,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PusherSettings {
    pub app_id: Option<String>,
    pub key: Option<String>,
    pub secret: Option<String>,
    pub cluster: Option<String>,
    pub host: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: String,
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
    pub jwt_secret: String,
    pub event_bus: EventBusKind,
    pub pusher: PusherSettings,
    pub publish_timeout_ms: u64,
    pub lobby_channel: String,
    pub lobby_conversation_id: Option<i64>,
    pub body_limit_bytes: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".into(),
            database_url: "sqlite://./data/chat.db".into(),
            max_connections: 5,
            acquire_timeout_ms: 5_000,
            jwt_secret: DEFAULT_JWT_SECRET.into(),
            event_bus: EventBusKind::Local,
            pusher: PusherSettings::default(),
            publish_timeout_ms: 3_000,
            lobby_channel: "presence-lobby".into(),
            lobby_conversation_id: None,
            body_limit_bytes: 256 * 1024,
        }
    }
}

impl Settings {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_millis(self.publish_timeout_ms)
    }

    pub fn uses_default_jwt_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_JWT_SECRET
    }
}

/// Reads `server.toml` from the working directory, then the process environment.
pub fn load_settings() -> anyhow::Result<Settings> {
    let file = fs::read_to_string("server.toml").ok();
    load_settings_from(file.as_deref(), |name| std::env::var(name).ok())
}

/// Later sources win: defaults, then flat `server.toml` keys, then bare
/// environment names, then their `APP__` forms.
pub fn load_settings_from(
    file: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let file_cfg = match file {
        Some(raw) => toml::from_str::<HashMap<String, toml::Value>>(raw)
            .context("failed to parse server.toml")?,
        None => HashMap::new(),
    };

    let lookup = |key: &str, env_names: &[&str]| -> Option<String> {
        let mut value = file_cfg.get(key).map(|v| match v {
            toml::Value::String(s) => s.clone(),
            other => other.to_string(),
        });
        for name in env_names {
            if let Some(v) = env(name) {
                value = Some(v);
            }
        }
        value
    };

    let mut settings = Settings::default();

    if let Some(v) = lookup("bind_addr", &["SERVER_BIND", "APP__BIND_ADDR"]) {
        settings.bind_addr = v;
    }
    if let Some(v) = lookup("database_url", &["DATABASE_URL", "APP__DATABASE_URL"]) {
        settings.database_url = v;
    }
    settings.database_url = normalize_database_url(&settings.database_url);

    if let Some(v) = lookup("max_connections", &["APP__MAX_CONNECTIONS"]) {
        settings.max_connections = parse_number("max_connections", &v)?;
    }
    if let Some(v) = lookup("acquire_timeout_ms", &["APP__ACQUIRE_TIMEOUT_MS"]) {
        settings.acquire_timeout_ms = parse_number("acquire_timeout_ms", &v)?;
    }
    if let Some(v) = lookup("jwt_secret", &["JWT_SECRET", "APP__JWT_SECRET"]) {
        settings.jwt_secret = v;
    }

    if let Some(v) = lookup("event_bus", &["APP__EVENT_BUS"]) {
        settings.event_bus = match v.trim().to_ascii_lowercase().as_str() {
            "pusher" => EventBusKind::Pusher,
            "local" => EventBusKind::Local,
            other => bail!("unknown event_bus `{other}`; expected `pusher` or `local`"),
        };
    }
    settings.pusher = PusherSettings {
        app_id: lookup("pusher_app_id", &["PUSHER_APP_ID", "APP__PUSHER_APP_ID"]),
        key: lookup("pusher_key", &["PUSHER_KEY", "APP__PUSHER_KEY"]),
        secret: lookup("pusher_secret", &["PUSHER_SECRET", "APP__PUSHER_SECRET"]),
        cluster: lookup("pusher_cluster", &["PUSHER_CLUSTER", "APP__PUSHER_CLUSTER"]),
        host: lookup("pusher_host", &["PUSHER_HOST", "APP__PUSHER_HOST"]),
    };

    if let Some(v) = lookup("publish_timeout_ms", &["APP__PUBLISH_TIMEOUT_MS"]) {
        settings.publish_timeout_ms = parse_number("publish_timeout_ms", &v)?;
    }
    if let Some(v) = lookup("lobby_channel", &["APP__LOBBY_CHANNEL"]) {
        settings.lobby_channel = v;
    }
    if let Some(v) = lookup(
        "lobby_conversation_id",
        &["LOBBY_CONVERSATION_ID", "APP__LOBBY_CONVERSATION_ID"],
    ) {
        let id: i64 = parse_number("lobby_conversation_id", &v)?;
        settings.lobby_conversation_id = (id > 0).then_some(id);
    }
    if let Some(v) = lookup("body_limit_bytes", &["APP__BODY_LIMIT_BYTES"]) {
        settings.body_limit_bytes = parse_number("body_limit_bytes", &v)?;
    }

    Ok(settings)
}

fn parse_number<T>(key: &str, raw: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("invalid value `{raw}` for {key}"))
}

pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:") {
        return raw_database_url.to_string();
    }

    let path = if let Some(path) = raw_database_url.strip_prefix("sqlite://") {
        path
    } else if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        path
    } else if raw_database_url.contains("://") {
        return raw_database_url.to_string();
    } else {
        raw_database_url
    };

    let path = path.replace('\\', "/");
    if has_drive_letter(&path) {
        format!("sqlite:{path}")
    } else {
        format!("sqlite://{path}")
    }
}

fn has_drive_letter(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'/'
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
