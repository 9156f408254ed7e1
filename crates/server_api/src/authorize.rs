use shared::{
    channel::ChannelName,
    domain::{MemberRole, Principal},
    protocol::{ChannelAuth, PresenceData},
};
use tracing::{debug, info};

use crate::{ApiContext, ChatError};

/// Checks that `principal` may subscribe to `channel_name` and has the event
/// bus sign the subscription.
///
/// Direct-message channels admit only the two accounts they name. Presence
/// channels admit any caller; joining the configured lobby channel also records
/// lobby membership when a lobby conversation is provisioned.
pub async fn authorize_channel(
    ctx: &ApiContext,
    principal: &Principal,
    channel_name: &str,
    socket_id: &str,
) -> Result<ChannelAuth, ChatError> {
    let channel = ChannelName::parse(channel_name)?;
    let me = principal.account_id;

    let auth = match &channel {
        ChannelName::DirectMessage(pair) => {
            if !pair.contains(me) {
                return Err(ChatError::Authorization(
                    "channel belongs to other accounts".into(),
                ));
            }
            // Sign the name as subscribed; the bus matches it byte for byte.
            let mut auth = ctx.bus.authorize_channel(socket_id, channel_name, None)?;
            let live = channel.to_string();
            if live != channel_name {
                auth.live_channel = Some(live);
            }
            auth
        }
        ChannelName::Presence { .. } => {
            let presence = PresenceData::from(principal);
            let auth = ctx
                .bus
                .authorize_channel(socket_id, channel_name, Some(&presence))?;
            if channel_name == ctx.lobby.channel {
                if let Some(lobby_id) = ctx.lobby.conversation_id {
                    ctx.storage
                        .add_member(lobby_id, me, MemberRole::Member)
                        .await?;
                    debug!(user_id = %me, conversation_id = %lobby_id, "lobby membership ensured");
                }
            }
            auth
        }
    };

    info!(user_id = %me, channel = channel_name, "channel subscription authorized");
    Ok(auth)
}

#[cfg(test)]
#[path = "tests/authorize_tests.rs"]
mod tests;
