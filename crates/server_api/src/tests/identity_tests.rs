use super::*;

fn ada() -> Principal {
    Principal {
        account_id: UserId(3),
        username: "ada".into(),
        firstname: Some("Ada".into()),
        lastname: Some("Lovelace".into()),
        is_admin: true,
    }
}

#[test]
fn issued_token_verifies_to_same_principal() {
    let idp = JwtIdentityProvider::new("secret");
    let token = idp.issue(&ada(), Duration::minutes(5)).expect("issue");
    assert_eq!(idp.verify(&token).expect("verify"), ada());
}

#[test]
fn issue_refuses_lifetimes_past_the_calendar() {
    let idp = JwtIdentityProvider::new("secret");
    let err = idp.issue(&ada(), Duration::days(365 * 400_000)).unwrap_err();
    assert!(matches!(err, IssueError::LifetimeOutOfRange));
}

#[test]
fn bearer_header_is_required() {
    let idp = JwtIdentityProvider::new("secret");
    let token = idp.issue(&ada(), Duration::minutes(5)).expect("issue");

    assert!(idp.verify_bearer(Some(format!("Bearer {token}").as_str())).is_ok());
    for header in [None, Some(""), Some("Bearer "), Some(token.as_str()), Some("Basic abc")] {
        assert!(matches!(
            idp.verify_bearer(header),
            Err(ChatError::Authentication(_))
        ));
    }
}

#[test]
fn wrong_secret_and_expired_tokens_are_rejected() {
    let idp = JwtIdentityProvider::new("secret");
    let other = JwtIdentityProvider::new("other");
    let token = other.issue(&ada(), Duration::minutes(5)).expect("issue");
    assert!(matches!(idp.verify(&token), Err(ChatError::Authentication(_))));

    let expired = idp.issue(&ada(), Duration::minutes(-10)).expect("issue");
    assert!(matches!(idp.verify(&expired), Err(ChatError::Authentication(_))));
}
