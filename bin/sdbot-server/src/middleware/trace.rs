use std::time::Instant;

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use sdbot_core::signature::SIGNATURE_HEADER;
use serde_json::json;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

pub static X_TRACE_ID: &str = "x-trace-id";

/// Longest body prefix written to the debug log.
const BODY_PREVIEW: usize = 512;

/// Largest request body buffered. Interactions and store events are a few KiB.
pub const MAX_REQUEST_BODY: usize = 1024 * 1024;

/// Assigns or propagates `x-trace-id`, wraps the request in an
/// `http_request` span and logs status and latency.
///
/// Bodies are buffered and passed on byte-for-byte; the interaction route
/// verifies a signature over them.
pub async fn trace_middleware(req: Request<Body>, next: Next) -> Response {
    let started = Instant::now();
    let trace_id = incoming_trace_id(req.headers()).unwrap_or_else(Uuid::new_v4);
    let trace_header = HeaderValue::from_str(&trace_id.to_string()).ok();

    let span = info_span!(
        "http_request",
        trace_id = %trace_id,
        method = %req.method(),
        path = %req.uri().path(),
        signed = req.headers().contains_key(SIGNATURE_HEADER),
    );

    async move {
        info!("→ request started");
        let (mut parts, body) = req.into_parts();
        let body = match buffer_request(&parts.headers, body).await {
            Ok(body) => body,
            Err(mut rejection) => {
                if let Some(value) = trace_header {
                    rejection.headers_mut().insert(X_TRACE_ID, value);
                }
                info!(
                    status = rejection.status().as_u16(),
                    latency_ms = started.elapsed().as_millis(),
                    "← request body rejected"
                );
                return rejection;
            }
        };
        if let Some(value) = &trace_header {
            parts.headers.insert(X_TRACE_ID, value.clone());
        }

        let response = next.run(Request::from_parts(parts, Body::from(body))).await;

        let (mut parts, body) = response.into_parts();
        let body = buffer("response", &parts.headers, body).await;
        if let Some(value) = trace_header {
            parts.headers.insert(X_TRACE_ID, value);
        }

        info!(
            status = parts.status.as_u16(),
            latency_ms = started.elapsed().as_millis(),
            "← response finished"
        );
        Response::from_parts(parts, Body::from(body))
    }
    .instrument(span)
    .await
}

fn incoming_trace_id(headers: &HeaderMap) -> Option<Uuid> {
    let raw = headers.get(X_TRACE_ID)?.to_str().ok()?;
    Uuid::parse_str(raw).ok()
}

/// Buffer at most [`MAX_REQUEST_BODY`] bytes; larger bodies get 413 before
/// any handler runs.
async fn buffer_request(headers: &HeaderMap, body: Body) -> Result<Bytes, Response> {
    let bytes = match Limited::new(body, MAX_REQUEST_BODY).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            warn!(limit = MAX_REQUEST_BODY, "request body too large");
            return Err((
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(json!({ "error": "request body too large" })),
            )
                .into_response());
        }
        Err(e) => {
            warn!(error = %e, "request body could not be read");
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "request body could not be read" })),
            )
                .into_response());
        }
    };
    log_body("request", headers, &bytes);
    Ok(bytes)
}

async fn buffer(direction: &'static str, headers: &HeaderMap, body: Body) -> Bytes {
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(direction, error = %e, "body could not be read");
            return Bytes::new();
        }
    };
    log_body(direction, headers, &bytes);
    bytes
}

fn log_body(direction: &'static str, headers: &HeaderMap, bytes: &Bytes) {
    if bytes.is_empty() {
        return;
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    match preview(content_type, bytes) {
        Some(text) => debug!(direction, size = bytes.len(), body = text, "body"),
        None => debug!(direction, content_type, size = bytes.len(), "binary body"),
    }
}

/// JSON or text bodies, cut at a char boundary near [`BODY_PREVIEW`].
fn preview<'a>(content_type: &str, bytes: &'a [u8]) -> Option<&'a str> {
    if !(content_type.contains("json") || content_type.starts_with("text/")) {
        return None;
    }
    let text = std::str::from_utf8(bytes).ok()?;
    let mut end = text.len().min(BODY_PREVIEW);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    Some(&text[..end])
}
