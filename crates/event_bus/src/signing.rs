use hmac::{Hmac, Mac};
use sha2::Sha256;
use shared::protocol::{ChannelAuth, PresenceData};

use crate::EventBusError;

type HmacSha256 = Hmac<Sha256>;

pub(crate) fn hmac_hex(secret: &str, payload: &str) -> Result<String, EventBusError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| EventBusError::InvalidSecret)?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Socket ids are assigned by the bus as `<digits>.<digits>`.
pub fn validate_socket_id(socket_id: &str) -> Result<(), EventBusError> {
    let valid = socket_id.split_once('.').is_some_and(|(left, right)| {
        !left.is_empty()
            && !right.is_empty()
            && left.bytes().all(|b| b.is_ascii_digit())
            && right.bytes().all(|b| b.is_ascii_digit())
    });
    if valid {
        Ok(())
    } else {
        Err(EventBusError::InvalidSocketId(socket_id.to_string()))
    }
}

/// Builds the `key:signature` credential over `socket_id:channel[:channel_data]`.
pub fn sign_subscription(
    key: &str,
    secret: &str,
    socket_id: &str,
    channel_name: &str,
    presence: Option<&PresenceData>,
) -> Result<ChannelAuth, EventBusError> {
    validate_socket_id(socket_id)?;

    let channel_data = presence.map(serde_json::to_string).transpose()?;
    let mut string_to_sign = format!("{socket_id}:{channel_name}");
    if let Some(data) = &channel_data {
        string_to_sign.push(':');
        string_to_sign.push_str(data);
    }

    let signature = hmac_hex(secret, &string_to_sign)?;
    Ok(ChannelAuth {
        auth: format!("{key}:{signature}"),
        channel_data,
        live_channel: None,
    })
}

#[cfg(test)]
#[path = "tests/signing_tests.rs"]
mod tests;
