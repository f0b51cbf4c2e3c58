//! Discord interaction webhook.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use sdbot_core::signature::{SIGNATURE_HEADER, TIMESTAMP_HEADER};
use sdbot_types::InteractionResponse;
use serde_json::Value;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(post_interaction))]
pub struct InteractionsApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/interactions", post(post_interaction))
}

/// Verify and answer one interaction.
///
/// Pings are answered with `{"type":1}`. An `ai` command dispatches one
/// image job and echoes it back to the channel.
#[utoipa::path(
    post,
    path = "/interactions",
    tag = "interactions",
    params(
        ("x-signature-ed25519" = String, Header, description = "Hex Ed25519 signature of timestamp + body"),
        ("x-signature-timestamp" = String, Header, description = "Timestamp the signature covers"),
    ),
    request_body(content = Value, content_type = "application/json"),
    responses(
        (status = 200, description = "Interaction answered", body = Value),
        (status = 400, description = "Body is not valid JSON"),
        (status = 401, description = "Signature missing or invalid"),
        (status = 500, description = "Job dispatch failed or deadline exceeded"),
    )
)]
pub async fn post_interaction(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<InteractionResponse>, ServerError> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let deadline = state.config.interaction_timeout;

    let response = tokio::time::timeout(
        deadline,
        state
            .interactions
            .handle(header(SIGNATURE_HEADER), header(TIMESTAMP_HEADER), &body),
    )
    .await
    .map_err(|_| ServerError::Timeout(deadline))??;

    Ok(Json(response))
}
