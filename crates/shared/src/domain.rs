use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(ConversationId);
id_newtype!(MessageId);
id_newtype!(AttachmentId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    Dm,
    Lobby,
}

impl ConversationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dm => "dm",
            Self::Lobby => "lobby",
        }
    }
}

/// Informational only: nothing gates access on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Owner,
    Member,
}

impl MemberRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Member => "member",
        }
    }

    pub fn from_db(value: &str) -> Self {
        match value {
            "owner" => Self::Owner,
            _ => Self::Member,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Audio,
    Video,
    File,
}

impl AttachmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::File => "file",
        }
    }

    pub fn from_db(value: &str) -> Self {
        match value {
            "image" => Self::Image,
            "audio" => Self::Audio,
            "video" => Self::Video,
            _ => Self::File,
        }
    }
}

/// The two participants of a direct-message conversation, ordered `(low, high)`.
///
/// A pair always holds two distinct ids, so `DmPair::new(a, b)` and
/// `DmPair::new(b, a)` compare equal and name the same conversation and channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DmPair {
    low: UserId,
    high: UserId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("a direct conversation needs two different accounts")]
pub struct SelfConversation;

impl DmPair {
    pub fn new(a: UserId, b: UserId) -> Result<Self, SelfConversation> {
        if a == b {
            return Err(SelfConversation);
        }
        Ok(Self {
            low: a.min(b),
            high: a.max(b),
        })
    }

    pub fn low(&self) -> UserId {
        self.low
    }

    pub fn high(&self) -> UserId {
        self.high
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.low == user_id || self.high == user_id
    }

    /// The participant that is not `user_id`, if `user_id` is part of the pair.
    pub fn peer_of(&self, user_id: UserId) -> Option<UserId> {
        if user_id == self.low {
            Some(self.high)
        } else if user_id == self.high {
            Some(self.low)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("message body is empty")]
pub struct EmptyBody;

/// Message text after trimming; never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MessageBody(String);

impl MessageBody {
    pub fn parse(raw: &str) -> Result<Self, EmptyBody> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(EmptyBody);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The authenticated caller, as supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub account_id: UserId,
    pub username: String,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
