use super::*;
use shared::domain::UserId;
use shared::protocol::PresenceUserInfo;

const KEY: &str = "278d425bdf160c739803";
const SECRET: &str = "7ad3773142a6692b25b8";

#[test]
fn private_channel_signature_matches_reference_vector() {
    let auth = sign_subscription(KEY, SECRET, "1234.1234", "private-foobar", None).expect("sign");
    assert_eq!(
        auth.auth,
        "278d425bdf160c739803:58df8b0c36d6982b82c3ecf6b4662e34fe8c25bba48f5369f135bf843651c3a4"
    );
    assert!(auth.channel_data.is_none());
}

#[test]
fn presence_signature_covers_channel_data() {
    let presence = PresenceData {
        user_id: "7".into(),
        user_info: PresenceUserInfo {
            id: UserId(7),
            username: "ada".into(),
            firstname: Some("Ada".into()),
            lastname: None,
            is_admin: false,
        },
    };
    let auth = sign_subscription(KEY, SECRET, "1234.1234", "presence-lobby", Some(&presence))
        .expect("sign");

    let data = auth.channel_data.expect("channel data");
    let decoded: PresenceData = serde_json::from_str(&data).expect("decode");
    assert_eq!(decoded, presence);
    assert!(data.contains("\"isAdmin\":false"));

    let expected = hmac_hex(SECRET, &format!("1234.1234:presence-lobby:{data}")).expect("mac");
    assert_eq!(auth.auth, format!("{KEY}:{expected}"));
}

#[test]
fn socket_id_must_be_two_digit_groups() {
    assert!(validate_socket_id("123.456").is_ok());
    for bad in ["", "123", "123.", ".456", "12a.456", "1.2.3", "1234.1234:x"] {
        assert!(
            matches!(validate_socket_id(bad), Err(EventBusError::InvalidSocketId(_))),
            "{bad:?} accepted"
        );
    }
}

#[test]
fn invalid_socket_id_is_rejected_before_signing() {
    let err = sign_subscription(KEY, SECRET, "nope", "private-foobar", None).unwrap_err();
    assert!(matches!(err, EventBusError::InvalidSocketId(id) if id == "nope"));
}
