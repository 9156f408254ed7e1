use event_bus::EventBusError;
use shared::{
    channel::InvalidChannel,
    domain::{EmptyBody, SelfConversation},
    error::{ApiError, ErrorCode},
};
use storage::StorageError;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Authentication(String),
    #[error("{0}")]
    Authorization(String),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    EventBus(#[from] EventBusError),
}

impl From<InvalidChannel> for ChatError {
    fn from(err: InvalidChannel) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<EmptyBody> for ChatError {
    fn from(_: EmptyBody) -> Self {
        Self::Validation("message text is empty".into())
    }
}

impl From<SelfConversation> for ChatError {
    fn from(_: SelfConversation) -> Self {
        Self::Validation("cannot open a conversation with yourself".into())
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Validation(message) => ApiError::new(ErrorCode::Validation, message),
            ChatError::Authentication(message) => ApiError::new(ErrorCode::Unauthorized, message),
            ChatError::Authorization(message) => ApiError::new(ErrorCode::Forbidden, message),
            ChatError::NotFound(message) => ApiError::new(ErrorCode::NotFound, message),
            ChatError::Storage(err) => {
                error!(error = %err, "storage failure");
                ApiError::new(ErrorCode::Storage, "internal storage error")
            }
            ChatError::EventBus(EventBusError::InvalidSocketId(id)) => {
                ApiError::new(ErrorCode::Validation, format!("invalid socket id `{id}`"))
            }
            ChatError::EventBus(err) => {
                error!(error = %err, "event bus failure");
                ApiError::new(ErrorCode::EventBus, "event bus unavailable")
            }
        }
    }
}
