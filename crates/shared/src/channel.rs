//! Channel names understood by the event bus.
//!
//! Every place that needs to know whether a channel name is valid (subscription
//! authorization, the send path, fan-out) goes through [`ChannelName::parse`].

use std::{fmt, str::FromStr};

use thiserror::Error;

use crate::domain::{DmPair, UserId};

pub const PRESENCE_PREFIX: &str = "presence-";
pub const DIRECT_MESSAGE_PREFIX: &str = "private-chat-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelName {
    /// A shared room; `room` is everything after [`PRESENCE_PREFIX`].
    Presence { room: String },
    DirectMessage(DmPair),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid channel name `{0}`")]
pub struct InvalidChannel(pub String);

impl ChannelName {
    pub fn parse(name: &str) -> Result<Self, InvalidChannel> {
        let invalid = || InvalidChannel(name.to_string());

        if let Some(room) = name.strip_prefix(PRESENCE_PREFIX) {
            if room.is_empty() || !room.chars().all(is_presence_char) {
                return Err(invalid());
            }
            return Ok(Self::Presence {
                room: room.to_string(),
            });
        }

        if let Some(ids) = name.strip_prefix(DIRECT_MESSAGE_PREFIX) {
            let (a, b) = ids.split_once('-').ok_or_else(invalid)?;
            let a = parse_account_id(a).ok_or_else(invalid)?;
            let b = parse_account_id(b).ok_or_else(invalid)?;
            let pair = DmPair::new(a, b).map_err(|_| invalid())?;
            return Ok(Self::DirectMessage(pair));
        }

        Err(invalid())
    }

}

/// Renders the canonical form: direct-message ids are always `low-high`.
impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Presence { room } => write!(f, "{PRESENCE_PREFIX}{room}"),
            Self::DirectMessage(pair) => {
                write!(f, "{DIRECT_MESSAGE_PREFIX}{}-{}", pair.low(), pair.high())
            }
        }
    }
}

impl FromStr for ChannelName {
    type Err = InvalidChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn is_presence_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':' | '.' | '=' | ',')
}

// Digits only, positive, no leading zeros: one spelling per account id.
fn parse_account_id(raw: &str) -> Option<UserId> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) || raw.starts_with('0') {
        return None;
    }
    raw.parse::<i64>().ok().map(UserId)
}

#[cfg(test)]
#[path = "tests/channel_tests.rs"]
mod tests;
