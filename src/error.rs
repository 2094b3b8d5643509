use crate::domain::message::{ErrorPayload, PayloadTag};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Server error [{code}]: {text}")]
    Protocol { code: String, text: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Why a single request did not produce a response payload.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestError {
    #[error("server error [{}]: {}", .0.code, .0.text)]
    Server(ErrorPayload),
    #[error("request abandoned: {0}")]
    Abandoned(String),
    #[error("no response within {0:?}")]
    TimedOut(Duration),
    #[error("expected a {expected} response, got {got}")]
    TagMismatch { expected: PayloadTag, got: PayloadTag },
    #[error("failed to send request: {0}")]
    Send(String),
}

impl From<RequestError> for ClientError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Server(payload) => ClientError::Protocol {
                code: payload.code,
                text: payload.text,
            },
            other => ClientError::Transport(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
