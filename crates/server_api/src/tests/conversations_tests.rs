use std::sync::Arc;

use shared::domain::MemberRole;

use super::*;
use crate::{
    support::{account, context, principal, RecordingBus},
    LobbyConfig,
};

#[tokio::test]
async fn resolve_dm_is_stable_for_both_sides() {
    let ctx = context(Arc::new(RecordingBus::default()), LobbyConfig::default()).await;
    let ada = account(&ctx.storage, 3, "ada").await;
    let bob = account(&ctx.storage, 9, "bob").await;

    let first = resolve_dm(&ctx, &ada, UserId(9)).await.expect("resolve");
    let second = resolve_dm(&ctx, &bob, UserId(3)).await.expect("resolve");
    assert_eq!(first.conversation_id, second.conversation_id);
}

#[tokio::test]
async fn resolve_dm_rejects_self_and_unknown_accounts() {
    let ctx = context(Arc::new(RecordingBus::default()), LobbyConfig::default()).await;
    let ada = account(&ctx.storage, 3, "ada").await;

    for other in [3, 77, 0, -2] {
        let err = resolve_dm(&ctx, &ada, UserId(other)).await.unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)), "{other}");
    }
}

#[tokio::test]
async fn members_are_listed_for_members_only() {
    let ctx = context(Arc::new(RecordingBus::default()), LobbyConfig::default()).await;
    let ada = account(&ctx.storage, 3, "ada").await;
    account(&ctx.storage, 9, "bob").await;
    let conversation = resolve_dm(&ctx, &ada, UserId(9))
        .await
        .expect("resolve")
        .conversation_id;

    let members = list_members(&ctx, &ada, conversation).await.expect("members");
    let summary: Vec<(i64, &str, MemberRole)> = members
        .members
        .iter()
        .map(|m| (m.user_id.0, m.username.as_str(), m.role))
        .collect();
    assert_eq!(
        summary,
        vec![(3, "ada", MemberRole::Owner), (9, "bob", MemberRole::Member)]
    );

    let err = list_members(&ctx, &principal(5, "eve"), conversation)
        .await
        .unwrap_err();
    assert!(matches!(err, ChatError::Authorization(_)));
}

#[tokio::test]
async fn last_conversation_reports_peer() {
    let ctx = context(Arc::new(RecordingBus::default()), LobbyConfig::default()).await;
    let ada = account(&ctx.storage, 3, "ada").await;
    account(&ctx.storage, 9, "bob").await;

    assert!(last_conversation(&ctx, &ada).await.expect("none").is_none());

    let conversation = resolve_dm(&ctx, &ada, UserId(9))
        .await
        .expect("resolve")
        .conversation_id;
    let last = last_conversation(&ctx, &ada)
        .await
        .expect("last")
        .expect("some");
    assert_eq!(last.kind, ConversationKind::Dm);
    assert_eq!(last.conversation_id, conversation);
    assert_eq!(last.peer_id, Some(UserId(9)));
}

#[tokio::test]
async fn users_are_listed() {
    let ctx = context(Arc::new(RecordingBus::default()), LobbyConfig::default()).await;
    account(&ctx.storage, 3, "ada").await;
    account(&ctx.storage, 9, "bob").await;

    let users = list_users(&ctx).await.expect("users").users;
    let names: Vec<&str> = users.iter().map(|u| u.username.as_str()).collect();
    assert_eq!(names, vec!["ada", "bob"]);
    assert_eq!(users[0].firstname, "");
}
