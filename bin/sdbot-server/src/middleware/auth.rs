use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;

use crate::state::AppState;

/// Require `Authorization: Bearer <SDBOT_NOTIFY_TOKEN>` when a token is
/// configured. Without one the route is open.
pub async fn check_notify_token(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(expected) = state.config.notify_token.as_deref() {
        let provided = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if !provided.is_some_and(|p| token_eq(p.as_bytes(), expected.as_bytes())) {
            return (
                StatusCode::UNAUTHORIZED,
                axum::Json(serde_json::json!({ "error": "unauthorised" })),
            )
                .into_response();
        }
    }
    next.run(req).await
}

fn token_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}

#[cfg(test)]
mod test {
    use super::token_eq;

    #[test]
    fn tokens_must_match_exactly() {
        assert!(token_eq(b"s3cret", b"s3cret"));
        assert!(!token_eq(b"s3cret", b"s3creT"));
        assert!(!token_eq(b"s3cre", b"s3cret"));
        assert!(!token_eq(b"", b"s3cret"));
    }
}
