use shared::{
    domain::{ConversationId, ConversationKind, DmPair, Principal, UserId},
    protocol::{
        LastConversation, MemberSummary, MembersResponse, ResolveDmResponse, UsersResponse,
    },
};
use tracing::debug;

use crate::{ensure_member, ApiContext, ChatError};

/// Returns the caller's direct conversation with `other_id`, creating it on first use.
pub async fn resolve_dm(
    ctx: &ApiContext,
    principal: &Principal,
    other_id: UserId,
) -> Result<ResolveDmResponse, ChatError> {
    if other_id.0 <= 0 {
        return Err(ChatError::Validation(format!("invalid account id {other_id}")));
    }
    let pair = DmPair::new(principal.account_id, other_id)?;
    if !ctx.storage.account_exists(other_id).await? {
        return Err(ChatError::Validation(format!("unknown account {other_id}")));
    }
    let conversation_id = ctx
        .storage
        .resolve_or_create_dm(pair, principal.account_id)
        .await?;
    debug!(conversation_id = %conversation_id, user_id = %principal.account_id, "direct conversation resolved");
    Ok(ResolveDmResponse { conversation_id })
}

pub async fn list_users(ctx: &ApiContext) -> Result<UsersResponse, ChatError> {
    Ok(UsersResponse {
        users: ctx.storage.list_accounts().await?,
    })
}

pub async fn list_members(
    ctx: &ApiContext,
    principal: &Principal,
    conversation_id: ConversationId,
) -> Result<MembersResponse, ChatError> {
    ensure_member(ctx, conversation_id, principal.account_id).await?;
    let members = ctx.storage.list_members(conversation_id).await?;
    Ok(MembersResponse {
        members: members
            .into_iter()
            .map(|member| MemberSummary {
                user_id: member.user_id,
                username: member.username.unwrap_or_default(),
                role: member.role,
            })
            .collect(),
    })
}

pub async fn last_conversation(
    ctx: &ApiContext,
    principal: &Principal,
) -> Result<Option<LastConversation>, ChatError> {
    let last = ctx.storage.last_dm_for_user(principal.account_id).await?;
    Ok(last.map(|(conversation_id, peer_id)| LastConversation {
        kind: ConversationKind::Dm,
        conversation_id,
        peer_id: Some(peer_id),
    }))
}

#[cfg(test)]
#[path = "tests/conversations_tests.rs"]
mod tests;
