use std::{sync::Arc, time::Duration};

use event_bus::EventBus;
use shared::domain::{ConversationId, UserId};
use storage::Storage;

mod authorize;
mod conversations;
mod error;
mod fanout;
mod identity;
mod messaging;

pub use authorize::authorize_channel;
pub use conversations::{last_conversation, list_members, list_users, resolve_dm};
pub use error::ChatError;
pub use fanout::{publish_best_effort, publish_event, MESSAGE_EVENT};
pub use identity::{Claims, IssueError, JwtIdentityProvider};
pub use messaging::{list_messages, send_message, DEFAULT_PAGE_SIZE};

/// The shared room every authenticated account may join.
#[derive(Debug, Clone)]
pub struct LobbyConfig {
    pub channel: String,
    /// Conversation that stores lobby messages. `None` means lobby messages are
    /// published live but never stored.
    pub conversation_id: Option<ConversationId>,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            channel: "presence-lobby".to_string(),
            conversation_id: None,
        }
    }
}

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub bus: Arc<dyn EventBus>,
    pub lobby: LobbyConfig,
    pub publish_timeout: Duration,
}

async fn ensure_member(
    ctx: &ApiContext,
    conversation_id: ConversationId,
    user_id: UserId,
) -> Result<(), ChatError> {
    if ctx.storage.is_member(conversation_id, user_id).await? {
        return Ok(());
    }
    // Only looked up once access is already denied.
    match ctx.storage.conversation_kind(conversation_id).await? {
        Some(_) => Err(ChatError::Authorization(
            "not a member of this conversation".into(),
        )),
        None => Err(ChatError::NotFound(format!(
            "conversation {conversation_id} not found"
        ))),
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod support;
