use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    AttachmentId, AttachmentKind, ConversationId, ConversationKind, MemberRole, MessageId,
    Principal, UserId,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageRequest {
    pub room: String,
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentInput>,
}

fn default_storage_provider() -> String {
    "local".to_string()
}

/// Attachment metadata supplied by the sender; the bytes live in external storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentInput {
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    #[serde(default = "default_storage_provider")]
    pub storage_provider: String,
    pub storage_key: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub byte_size: Option<i64>,
    #[serde(default)]
    pub width: Option<i64>,
    #[serde(default)]
    pub height: Option<i64>,
    #[serde(default)]
    pub duration_sec: Option<f64>,
    #[serde(default, alias = "checksum_sha256")]
    pub checksum: Option<String>,
}

impl AttachmentInput {
    pub fn new(kind: AttachmentKind, storage_key: impl Into<String>) -> Self {
        Self {
            kind,
            storage_provider: default_storage_provider(),
            storage_key: storage_key.into(),
            url: None,
            file_name: None,
            mime_type: None,
            byte_size: None,
            width: None,
            height: None,
            duration_sec: None,
            checksum: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttachmentPayload {
    pub id: AttachmentId,
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub byte_size: Option<i64>,
    #[serde(default)]
    pub width: Option<i64>,
    #[serde(default)]
    pub height: Option<i64>,
    #[serde(default)]
    pub duration_sec: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    #[serde(default)]
    pub sender_username: Option<String>,
    pub body: String,
    pub kind: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub edited_at: Option<DateTime<Utc>>,
    pub attachments: Vec<AttachmentPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesPage {
    pub messages: Vec<MessagePayload>,
}

/// Payload fanned out on the `message` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub from: String,
    pub sender_id: UserId,
    pub text: String,
    /// Milliseconds since the Unix epoch.
    pub at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
    #[serde(default)]
    pub attachments: Vec<AttachmentPayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Delivery {
    Published,
    /// The live event could not be published; stored data is unaffected.
    Failed { warning: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SendOutcome {
    Stored {
        conversation_id: ConversationId,
        message_id: MessageId,
        delivery: Delivery,
    },
    /// Lobby message delivered live only, because no lobby conversation is provisioned.
    NotStored { delivery: Delivery },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveDmResponse {
    pub conversation_id: ConversationId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
    pub firstname: String,
    pub lastname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsersResponse {
    pub users: Vec<UserSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSummary {
    pub user_id: UserId,
    pub username: String,
    pub role: MemberRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembersResponse {
    pub members: Vec<MemberSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastConversation {
    pub kind: ConversationKind,
    pub conversation_id: ConversationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<UserId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelAuthRequest {
    pub channel_name: String,
    pub socket_id: String,
}

/// Signed subscription credential returned to the subscribing client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAuth {
    pub auth: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_data: Option<String>,
    /// Channel that live messages are published on, when it differs from the
    /// subscribed name spelling (direct messages publish as `low-high`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub live_channel: Option<String>,
}

/// Member entry published on presence channels. `user_id` must be unique per
/// account or the bus cannot deduplicate the member list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceData {
    pub user_id: String,
    pub user_info: PresenceUserInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceUserInfo {
    pub id: UserId,
    pub username: String,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    #[serde(rename = "isAdmin")]
    pub is_admin: bool,
}

impl From<&Principal> for PresenceData {
    fn from(principal: &Principal) -> Self {
        Self {
            user_id: principal.account_id.to_string(),
            user_info: PresenceUserInfo {
                id: principal.account_id,
                username: principal.username.clone(),
                firstname: principal.firstname.clone(),
                lastname: principal.lastname.clone(),
                is_admin: principal.is_admin,
            },
        }
    }
}
