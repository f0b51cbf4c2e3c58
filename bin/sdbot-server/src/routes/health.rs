//! Liveness and readiness.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use utoipa::{OpenApi, ToSchema};

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(get_health), components(schemas(Health)))]
pub struct HealthApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(get_health))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Health {
    /// `ok`, or `degraded` when interactions cannot be accepted.
    pub status: &'static str,
    pub version: &'static str,
    /// Bucket new jobs write their artifacts to.
    pub bucket: String,
    /// Whether a public key is loaded for interaction signatures.
    pub interactions_verified: bool,
    /// Whether `/notifications` requires a bearer token.
    pub notifications_authenticated: bool,
}

/// Always 200; `status` says whether the relay can do useful work.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Relay is up", body = Health)
    )
)]
pub async fn get_health(State(state): State<Arc<AppState>>) -> Json<Health> {
    let verified = state.interactions.verifies_signatures();
    Json(Health {
        status: if verified { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        bucket: state.interactions.bucket().to_owned(),
        interactions_verified: verified,
        notifications_authenticated: state.config.notify_token.is_some(),
    })
}

#[cfg(test)]
mod test {
    use sdbot_core::testing::{FakeChat, RecordingDispatcher};

    use super::*;
    use crate::config::Config;
    use crate::state::test_support::harness;

    #[tokio::test]
    async fn reports_readiness_from_state() {
        let config = Config {
            notify_token: Some("t".into()),
            ..Config::default()
        };
        let h = harness(config, RecordingDispatcher::default(), FakeChat::default());

        let Json(health) = get_health(State(h.state)).await;
        assert_eq!(health.status, "ok");
        assert!(!health.version.is_empty());
        assert!(health.interactions_verified);
        assert!(health.notifications_authenticated);
    }
}
