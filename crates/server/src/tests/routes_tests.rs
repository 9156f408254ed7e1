use std::time::Duration;

use axum::{
    body::{self, Body},
    http::Request,
};
use event_bus::LocalEventBus;
use serde_json::{json, Value};
use server_api::LobbyConfig;
use storage::{NewAccount, Storage};
use tower::ServiceExt;

use super::*;

struct TestApp {
    router: Router,
    bus: LocalEventBus,
    storage: Storage,
    identity: JwtIdentityProvider,
}

impl TestApp {
    async fn new() -> Self {
        let storage = Storage::new("sqlite::memory:").await.expect("db");
        let bus = LocalEventBus::new("local-key", "local-secret");
        let identity = JwtIdentityProvider::new("test-secret");
        let api = ApiContext {
            storage: storage.clone(),
            bus: Arc::new(bus.clone()),
            lobby: LobbyConfig::default(),
            publish_timeout: Duration::from_secs(1),
        };
        let router = build_router(
            Arc::new(AppState {
                api,
                identity: identity.clone(),
            }),
            4 * 1024,
        );
        Self {
            router,
            bus,
            storage,
            identity,
        }
    }

    async fn account(&self, username: &str) -> (Principal, String) {
        let id = self
            .storage
            .upsert_account(NewAccount {
                username,
                ..NewAccount::default()
            })
            .await
            .expect("account");
        let principal = Principal {
            account_id: id,
            username: username.to_string(),
            firstname: None,
            lastname: None,
            is_admin: false,
        };
        let token = self
            .identity
            .issue(&principal, chrono::Duration::minutes(5))
            .expect("token");
        (principal, token)
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }
}

fn get(uri: &str, token: &str) -> Request<Body> {
    Request::get(uri)
        .header("authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .expect("request")
}

fn post_json(uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

#[tokio::test]
async fn healthz_reports_ok_when_storage_is_ready() {
    let app = TestApp::new().await;
    let response = app
        .router
        .clone()
        .oneshot(Request::get("/healthz").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn chat_routes_require_bearer_token() {
    let app = TestApp::new().await;
    let request = Request::get("/api/chat/users")
        .body(Body::empty())
        .expect("request");
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");

    let (status, _) = app.send(get("/api/chat/users", "not-a-jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn direct_message_round_trip_over_http() {
    let app = TestApp::new().await;
    let (ada, ada_token) = app.account("ada").await;
    let (bob, bob_token) = app.account("bob").await;
    let (_, eve_token) = app.account("eve").await;
    let mut events = app.bus.subscribe();

    // Non-canonical order on purpose: fan-out still uses the canonical name.
    let room = format!("private-chat-{}-{}", bob.account_id, ada.account_id);
    let (status, outcome) = app
        .send(post_json(
            "/api/chat/send",
            &ada_token,
            json!({ "room": room, "text": "  hi bob  " }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{outcome}");
    assert_eq!(outcome["outcome"], "stored");
    assert_eq!(outcome["delivery"]["status"], "published");
    let conversation_id = outcome["conversation_id"].as_i64().expect("conversation id");

    let event = events.recv().await.expect("event");
    assert_eq!(
        event.channel,
        format!("private-chat-{}-{}", ada.account_id, bob.account_id)
    );
    assert_eq!(event.event, "message");
    assert_eq!(event.payload["text"], "hi bob");
    assert_eq!(event.payload["from"], "ada");

    let uri = format!("/api/chat/messages?conversationId={conversation_id}&limit=10");
    let (status, page) = app.send(get(&uri, &bob_token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["messages"][0]["body"], "hi bob");
    assert_eq!(page["messages"][0]["sender_username"], "ada");

    let (status, body) = app.send(get(&uri, &eve_token)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");

    let (status, last) = app.send(get("/api/chat/last", &bob_token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(last["kind"], "dm");
    assert_eq!(last["conversation_id"], conversation_id);
    assert_eq!(last["peer_id"], ada.account_id.0);

    let members_uri = format!("/api/chat/conversations/{conversation_id}/members");
    let (status, members) = app.send(get(&members_uri, &ada_token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(members["members"].as_array().expect("members").len(), 2);
}

#[tokio::test]
async fn send_validation_errors_are_bad_requests() {
    let app = TestApp::new().await;
    let (_, ada_token) = app.account("ada").await;
    let (bob, _) = app.account("bob").await;

    let room = format!("private-chat-1-{}", bob.account_id);
    let (status, body) = app
        .send(post_json(
            "/api/chat/send",
            &ada_token,
            json!({ "room": room, "text": "   " }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");

    let (status, body) = app
        .send(post_json("/api/chat/send", &ada_token, json!({ "room": 5 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");
}

#[tokio::test]
async fn lobby_send_without_conversation_is_reported_as_not_stored() {
    let app = TestApp::new().await;
    let (_, ada_token) = app.account("ada").await;
    let mut events = app.bus.subscribe();

    let (status, outcome) = app
        .send(post_json(
            "/api/chat/send",
            &ada_token,
            json!({ "room": "presence-lobby", "text": "hello lobby" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["outcome"], "not_stored");
    assert_eq!(events.recv().await.expect("event").channel, "presence-lobby");
}

#[tokio::test]
async fn pusher_auth_accepts_form_and_json() {
    let app = TestApp::new().await;
    let (ada, ada_token) = app.account("ada").await;
    let (bob, _) = app.account("bob").await;
    let channel = format!("private-chat-{}-{}", ada.account_id, bob.account_id);

    let form = Request::post("/pusher/auth")
        .header("authorization", format!("Bearer {ada_token}"))
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(format!("socket_id=123.456&channel_name={channel}")))
        .expect("request");
    let (status, auth) = app.send(form).await;
    assert_eq!(status, StatusCode::OK);
    assert!(auth["auth"].as_str().expect("auth").starts_with("local-key:"));
    assert!(auth.get("channel_data").is_none());

    let (status, auth) = app
        .send(post_json(
            "/pusher/auth",
            &ada_token,
            json!({ "socket_id": "123.456", "channel_name": "presence-lobby" }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let data: Value =
        serde_json::from_str(auth["channel_data"].as_str().expect("channel data")).expect("json");
    assert_eq!(data["user_id"], ada.account_id.to_string());
}

#[tokio::test]
async fn pusher_auth_rejects_outsiders_and_bad_names() {
    let app = TestApp::new().await;
    let (_, eve_token) = app.account("eve").await;

    let (status, body) = app
        .send(post_json(
            "/pusher/auth",
            &eve_token,
            json!({ "socket_id": "1.1", "channel_name": "private-chat-7-12" }),
        ))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");

    let (status, _) = app
        .send(post_json(
            "/pusher/auth",
            &eve_token,
            json!({ "socket_id": "1.1", "channel_name": "private-chat-7" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(post_json(
            "/pusher/auth",
            &eve_token,
            json!({ "socket_id": "nope", "channel_name": "presence-lobby" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn resolve_dm_and_users_routes() {
    let app = TestApp::new().await;
    let (ada, ada_token) = app.account("ada").await;
    let (bob, bob_token) = app.account("bob").await;

    let (status, first) = app
        .send(get(
            &format!("/api/chat/resolve-dm?otherId={}", bob.account_id),
            &ada_token,
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (_, second) = app
        .send(get(
            &format!("/api/chat/resolve-dm?otherId={}", ada.account_id),
            &bob_token,
        ))
        .await;
    assert_eq!(first["conversation_id"], second["conversation_id"]);

    let (status, _) = app
        .send(get(
            &format!("/api/chat/resolve-dm?otherId={}", ada.account_id),
            &ada_token,
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.send(get("/api/chat/resolve-dm", &ada_token)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, users) = app.send(get("/api/chat/users", &ada_token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users["users"].as_array().expect("users").len(), 2);
}

#[tokio::test]
async fn last_conversation_is_null_without_history() {
    let app = TestApp::new().await;
    let (_, token) = app.account("ada").await;
    let (status, body) = app.send(get("/api/chat/last", &token)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_null());
}

#[tokio::test]
async fn members_route_reports_bad_ids_and_unknown_conversations() {
    let app = TestApp::new().await;
    let (_, token) = app.account("ada").await;

    let (status, body) = app
        .send(get("/api/chat/conversations/abc/members", &token))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");

    let (status, body) = app
        .send(get("/api/chat/conversations/404/members", &token))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn oversized_bodies_are_rejected() {
    let app = TestApp::new().await;
    let (_, token) = app.account("ada").await;
    let body = json!({ "room": "presence-lobby", "text": "x".repeat(8 * 1024) }).to_string();
    let request = Request::post("/api/chat/send")
        .header("authorization", format!("Bearer {token}"))
        .header("content-type", "application/json")
        .header("content-length", body.len())
        .body(Body::from(body))
        .expect("request");
    let response = app.router.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[test]
fn storage_failures_map_to_generic_500() {
    let response = HttpError(ApiError::new(ErrorCode::Storage, "internal storage error"))
        .into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(status_for(ErrorCode::EventBus), StatusCode::BAD_GATEWAY);
}
