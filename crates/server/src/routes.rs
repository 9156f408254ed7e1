use std::sync::Arc;

use axum::{
    async_trait,
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts, Path, Query, Request, State,
    },
    http::{header, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::Deserialize;
use server_api::{ApiContext, ChatError, JwtIdentityProvider};
use shared::{
    domain::{ConversationId, Principal, UserId},
    error::{ApiError, ErrorCode},
    protocol::{
        ChannelAuth, ChannelAuthRequest, LastConversation, MembersResponse, MessagesPage,
        ResolveDmResponse, SendMessageRequest, SendOutcome, UsersResponse,
    },
};
use tower_http::limit::RequestBodyLimitLayer;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) api: ApiContext,
    pub(crate) identity: JwtIdentityProvider,
}

type SharedState = Arc<AppState>;

pub(crate) fn build_router(state: SharedState, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/pusher/auth", post(pusher_auth))
        .route("/api/chat/send", post(http_send_message))
        .route("/api/chat/messages", get(http_list_messages))
        .route("/api/chat/resolve-dm", get(http_resolve_dm))
        .route("/api/chat/users", get(http_list_users))
        .route("/api/chat/last", get(http_last_conversation))
        .route(
            "/api/chat/conversations/:conversation_id/members",
            get(http_list_members),
        )
        .layer(RequestBodyLimitLayer::new(body_limit_bytes))
        .with_state(state)
}

pub(crate) struct HttpError(ApiError);

impl HttpError {
    fn validation(message: impl Into<String>) -> Self {
        Self(ApiError::new(ErrorCode::Validation, message))
    }
}

impl From<ChatError> for HttpError {
    fn from(err: ChatError) -> Self {
        Self(err.into())
    }
}

impl From<JsonRejection> for HttpError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<QueryRejection> for HttpError {
    fn from(rejection: QueryRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

impl From<PathRejection> for HttpError {
    fn from(rejection: PathRejection) -> Self {
        Self::validation(rejection.body_text())
    }
}

pub(crate) fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Storage => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorCode::EventBus => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (status_for(self.0.code), Json(self.0)).into_response()
    }
}

/// The caller identified by the `Authorization: Bearer` header.
pub(crate) struct Authenticated(pub(crate) Principal);

#[async_trait]
impl FromRequestParts<SharedState> for Authenticated {
    type Rejection = HttpError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        Ok(Self(state.identity.verify_bearer(header)?))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagesQuery {
    conversation_id: i64,
    limit: Option<i64>,
    before_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveDmQuery {
    other_id: i64,
}

async fn healthz(State(state): State<SharedState>) -> Result<&'static str, HttpError> {
    state
        .api
        .storage
        .health_check()
        .await
        .map_err(ChatError::from)?;
    Ok("ok")
}

/// Subscription auth. Websocket clients post a form; JSON is accepted too.
async fn pusher_auth(
    State(state): State<SharedState>,
    Authenticated(principal): Authenticated,
    request: Request,
) -> Result<Json<ChannelAuth>, HttpError> {
    let is_json = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/json"));

    let body = if is_json {
        let Json(body) = Json::<ChannelAuthRequest>::from_request(request, &state).await?;
        body
    } else {
        let Form(body) = Form::<ChannelAuthRequest>::from_request(request, &state)
            .await
            .map_err(|rejection| HttpError::validation(rejection.body_text()))?;
        body
    };

    let auth = server_api::authorize_channel(
        &state.api,
        &principal,
        &body.channel_name,
        &body.socket_id,
    )
    .await?;
    Ok(Json(auth))
}

async fn http_send_message(
    State(state): State<SharedState>,
    Authenticated(principal): Authenticated,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Json<SendOutcome>, HttpError> {
    let Json(request) = body?;
    let outcome = server_api::send_message(&state.api, &principal, &request).await?;
    Ok(Json(outcome))
}

async fn http_list_messages(
    State(state): State<SharedState>,
    Authenticated(principal): Authenticated,
    query: Result<Query<MessagesQuery>, QueryRejection>,
) -> Result<Json<MessagesPage>, HttpError> {
    let Query(query) = query?;
    let page = server_api::list_messages(
        &state.api,
        &principal,
        ConversationId(query.conversation_id),
        query.limit,
        query.before_id,
    )
    .await?;
    Ok(Json(page))
}

async fn http_resolve_dm(
    State(state): State<SharedState>,
    Authenticated(principal): Authenticated,
    query: Result<Query<ResolveDmQuery>, QueryRejection>,
) -> Result<Json<ResolveDmResponse>, HttpError> {
    let Query(query) = query?;
    let resolved = server_api::resolve_dm(&state.api, &principal, UserId(query.other_id)).await?;
    Ok(Json(resolved))
}

async fn http_list_users(
    State(state): State<SharedState>,
    Authenticated(_principal): Authenticated,
) -> Result<Json<UsersResponse>, HttpError> {
    Ok(Json(server_api::list_users(&state.api).await?))
}

async fn http_last_conversation(
    State(state): State<SharedState>,
    Authenticated(principal): Authenticated,
) -> Result<Json<Option<LastConversation>>, HttpError> {
    Ok(Json(
        server_api::last_conversation(&state.api, &principal).await?,
    ))
}

async fn http_list_members(
    State(state): State<SharedState>,
    Authenticated(principal): Authenticated,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<MembersResponse>, HttpError> {
    let Path(conversation_id) = path?;
    let members =
        server_api::list_members(&state.api, &principal, ConversationId(conversation_id)).await?;
    Ok(Json(members))
}

#[cfg(test)]
#[path = "tests/routes_tests.rs"]
mod tests;
