use chrono::Utc;
use shared::{
    channel::ChannelName,
    domain::{ConversationId, MessageBody, MessageId, Principal},
    protocol::{
        AttachmentInput, Delivery, MessageEvent, MessagesPage, SendMessageRequest, SendOutcome,
    },
};
use storage::MAX_PAGE_SIZE;
use tracing::info;

use crate::{ensure_member, fanout, ApiContext, ChatError};

pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Stores a message in the conversation named by `request.room` and fans it out.
///
/// All validation happens before the first write. Once the message is committed
/// the call succeeds; a failed publish only downgrades the reported delivery.
pub async fn send_message(
    ctx: &ApiContext,
    principal: &Principal,
    request: &SendMessageRequest,
) -> Result<SendOutcome, ChatError> {
    let channel = ChannelName::parse(&request.room)?;
    let body = MessageBody::parse(&request.text)?;
    validate_attachments(&request.attachments)?;
    let me = principal.account_id;

    let (conversation_id, channel) = match channel {
        ChannelName::DirectMessage(pair) => {
            let Some(other) = pair.peer_of(me) else {
                return Err(ChatError::Authorization(
                    "channel belongs to other accounts".into(),
                ));
            };
            if !ctx.storage.account_exists(other).await? {
                return Err(ChatError::Validation(format!("unknown account {other}")));
            }
            let conversation_id = ctx.storage.resolve_or_create_dm(pair, me).await?;
            (conversation_id, ChannelName::DirectMessage(pair))
        }
        ChannelName::Presence { .. } => {
            if request.room != ctx.lobby.channel {
                return Err(ChatError::Validation(format!(
                    "unknown room `{}`",
                    request.room
                )));
            }
            match ctx.lobby.conversation_id {
                Some(lobby_id) => (lobby_id, channel),
                None if !request.attachments.is_empty() => {
                    return Err(ChatError::Validation(
                        "attachments cannot be sent to a lobby that does not store messages"
                            .into(),
                    ));
                }
                None => return publish_unstored(ctx, principal, &channel, &body).await,
            }
        }
    };

    ensure_member(ctx, conversation_id, me).await?;
    let appended = ctx
        .storage
        .append_message(conversation_id, me, &body, &request.attachments)
        .await?;
    info!(
        conversation_id = %conversation_id,
        message_id = %appended.message_id,
        sender_id = %me,
        attachments = appended.attachments.len(),
        "message stored"
    );

    let event = MessageEvent {
        from: principal.username.clone(),
        sender_id: me,
        text: body.as_str().to_string(),
        at: appended.created_at.timestamp_millis(),
        conversation_id: Some(conversation_id),
        message_id: Some(appended.message_id),
        attachments: appended.attachments,
    };
    let delivery =
        fanout::publish_best_effort(ctx.bus.as_ref(), &channel, &event, ctx.publish_timeout).await;

    Ok(SendOutcome::Stored {
        conversation_id,
        message_id: appended.message_id,
        delivery,
    })
}

/// Lobby message with no lobby conversation provisioned: nothing is stored, so
/// a failed publish means the message is lost and is reported as an error.
async fn publish_unstored(
    ctx: &ApiContext,
    principal: &Principal,
    channel: &ChannelName,
    body: &MessageBody,
) -> Result<SendOutcome, ChatError> {
    let event = MessageEvent {
        from: principal.username.clone(),
        sender_id: principal.account_id,
        text: body.as_str().to_string(),
        at: Utc::now().timestamp_millis(),
        conversation_id: None,
        message_id: None,
        attachments: Vec::new(),
    };
    fanout::publish_event(ctx.bus.as_ref(), channel, &event, ctx.publish_timeout).await?;
    info!(channel = %channel, sender_id = %principal.account_id, "lobby message published without storage");
    Ok(SendOutcome::NotStored {
        delivery: Delivery::Published,
    })
}

fn validate_attachments(attachments: &[AttachmentInput]) -> Result<(), ChatError> {
    for (index, attachment) in attachments.iter().enumerate() {
        let invalid = |field: &str| {
            ChatError::Validation(format!("attachment {index}: invalid {field}"))
        };
        if attachment.storage_key.trim().is_empty() {
            return Err(invalid("storage_key"));
        }
        if attachment.storage_provider.trim().is_empty() {
            return Err(invalid("storage_provider"));
        }
        if attachment.byte_size.is_some_and(|v| v < 0) {
            return Err(invalid("byte_size"));
        }
        if attachment.width.is_some_and(|v| v < 0) {
            return Err(invalid("width"));
        }
        if attachment.height.is_some_and(|v| v < 0) {
            return Err(invalid("height"));
        }
        if attachment
            .duration_sec
            .is_some_and(|v| !v.is_finite() || v < 0.0)
        {
            return Err(invalid("duration_sec"));
        }
    }
    Ok(())
}

/// One page of history, oldest first. `before_id` values that are not positive
/// are ignored, as is a missing `limit` (which falls back to
/// [`DEFAULT_PAGE_SIZE`]).
pub async fn list_messages(
    ctx: &ApiContext,
    principal: &Principal,
    conversation_id: ConversationId,
    limit: Option<i64>,
    before_id: Option<i64>,
) -> Result<MessagesPage, ChatError> {
    ensure_member(ctx, conversation_id, principal.account_id).await?;

    let limit = limit
        .map(|l| l.clamp(1, i64::from(MAX_PAGE_SIZE)) as u32)
        .unwrap_or(DEFAULT_PAGE_SIZE);
    let before = before_id.filter(|id| *id > 0).map(MessageId);

    let messages = ctx
        .storage
        .fetch_messages(conversation_id, limit, before)
        .await?;
    Ok(MessagesPage { messages })
}

#[cfg(test)]
#[path = "tests/messaging_tests.rs"]
mod tests;
