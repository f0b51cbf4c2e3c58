//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`].
//!
//! **Security note:** signature failures return an empty 401 so callers learn
//! nothing about why verification failed. Internal errors are logged with full
//! detail and answered with a generic message.

use std::time::Duration;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sdbot_core::{BatchReport, RelayError};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("unauthorized")]
    Unauthorized,

    /// The caller sent an invalid or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The compute target could not take the job. The message is returned to
    /// the caller as-is.
    #[error("dispatch failed: {0}")]
    Dispatch(String),

    /// Some notifications in a batch failed; the report says which.
    #[error("{} of {} notifications failed", .0.failed, .0.outcomes.len())]
    Delivery(BatchReport),

    #[error("handler exceeded its {0:?} deadline")]
    Timeout(Duration),

    /// An unclassified internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message) = match self {
            ServerError::Unauthorized => return StatusCode::UNAUTHORIZED.into_response(),
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ServerError::Dispatch(m) => {
                error!(error = %m, "job dispatch failed");
                (StatusCode::INTERNAL_SERVER_ERROR, m)
            }
            ServerError::Delivery(report) => {
                warn!(failed = report.failed, "notification batch partially failed");
                return (StatusCode::BAD_GATEWAY, Json(report)).into_response();
            }
            ServerError::Timeout(deadline) => {
                error!(?deadline, "handler deadline exceeded");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "deadline exceeded".to_owned(),
                )
            }
            ServerError::Internal(m) => {
                error!(message = %m, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
        };
        (status, Json(json!({ "error": client_message }))).into_response()
    }
}

impl From<RelayError> for ServerError {
    fn from(e: RelayError) -> Self {
        match e {
            RelayError::Unauthorized => ServerError::Unauthorized,
            RelayError::Malformed(e) => ServerError::BadRequest(e.to_string()),
            RelayError::Dispatch(e) => ServerError::Dispatch(e.to_string()),
            RelayError::Chat(e) => ServerError::Internal(e.to_string()),
        }
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(e: anyhow::Error) -> Self {
        error!(error = ?e, "converting anyhow error to ServerError::Internal");
        ServerError::Internal(e.to_string())
    }
}
