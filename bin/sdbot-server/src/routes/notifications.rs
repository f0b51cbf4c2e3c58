//! Store notifications: deliver finished artifacts.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router, middleware};
use sdbot_core::BatchReport;
use sdbot_types::StoreEvent;
use serde_json::Value;
use tracing::info;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::middleware::auth;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(post_notifications))]
pub struct NotificationsApi;

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/notifications", post(post_notifications))
        .route_layer(middleware::from_fn_with_state(state, auth::check_notify_token))
}

/// Deliver every object in an S3-style event batch to its origin channel.
///
/// Returns 200 with the batch report when no notification failed, 502 with
/// the same report otherwise so the sender can redeliver.
#[utoipa::path(
    post,
    path = "/notifications",
    tag = "notifications",
    request_body(content = Value, content_type = "application/json"),
    responses(
        (status = 200, description = "Batch delivered or skipped", body = Value),
        (status = 400, description = "Body is not a store event"),
        (status = 401, description = "Missing or wrong bearer token"),
        (status = 502, description = "Some notifications failed", body = Value),
    )
)]
pub async fn post_notifications(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<BatchReport>, ServerError> {
    let event: StoreEvent =
        serde_json::from_slice(&body).map_err(|e| ServerError::BadRequest(e.to_string()))?;
    let notifications = event.notifications();
    info!(count = notifications.len(), "store notifications received");

    let report = state.delivery.deliver(&notifications).await?;
    if report.has_failures() {
        return Err(ServerError::Delivery(report));
    }
    Ok(Json(report))
}

#[cfg(test)]
mod test {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use sdbot_core::testing::{FakeChat, RecordingDispatcher};
    use serde_json::json;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::routes;
    use crate::state::test_support::{Harness, harness};

    fn setup(config: Config) -> Harness {
        let config = Config {
            bucket: "art".into(),
            ..config
        };
        let chat = FakeChat::default()
            .with_channel("10", "20")
            .with_user("30", "alice");
        harness(config, RecordingDispatcher::default(), chat)
    }

    fn event(keys: &[&str]) -> Vec<u8> {
        event_in("art", keys)
    }

    fn event_in(bucket: &str, keys: &[&str]) -> Vec<u8> {
        let records: Vec<_> = keys
            .iter()
            .map(|k| json!({ "s3": { "bucket": { "name": bucket }, "object": { "key": k, "size": 3 } } }))
            .collect();
        json!({ "Records": records }).to_string().into_bytes()
    }

    fn request(body: Vec<u8>, token: Option<&str>) -> Request<Body> {
        let mut builder =
            Request::post("/notifications").header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn json_body(resp: axum::response::Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn delivers_each_notification() {
        let h = setup(Config::default());
        h.store.insert("art", "output/10/20/30/1", b"a".as_slice(), Some("{}"));
        h.store.insert("art", "output/10/20/30/2", b"b".as_slice(), Some("{}"));

        let resp = routes::build(h.state.clone())
            .oneshot(request(event(&["output/10/20/30/1", "output/10/20/30/2"]), None))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["delivered"], 2);
        assert_eq!(h.chat.sent().len(), 2);
    }

    #[tokio::test]
    async fn unknown_channel_is_not_a_fault() {
        let h = setup(Config::default());
        h.store.insert("art", "output/10/99/30/1", b"a".as_slice(), None);

        let resp = routes::build(h.state.clone())
            .oneshot(request(event(&["output/10/99/30/1"]), None))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["skipped"], 1);
        assert!(h.chat.sent().is_empty());
    }

    #[tokio::test]
    async fn other_buckets_are_never_posted() {
        let h = setup(Config::default());
        h.store.insert("private", "output/10/20/30/1", b"a".as_slice(), None);

        let resp = routes::build(h.state.clone())
            .oneshot(request(event_in("private", &["output/10/20/30/1"]), None))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let json = json_body(resp).await;
        assert_eq!(json["skipped"], 1);
        assert_eq!(json["delivered"], 0);
        assert!(h.chat.sent().is_empty());
    }

    #[tokio::test]
    async fn partial_failure_is_502_with_report() {
        let h = setup(Config::default());
        h.store.insert("art", "output/10/20/30/1", b"a".as_slice(), None);

        let resp = routes::build(h.state.clone())
            .oneshot(request(event(&["output/10/20/30/1", "output/10/20/30/2"]), None))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let json = json_body(resp).await;
        assert_eq!(json["delivered"], 1);
        assert_eq!(json["failed"], 1);
        assert_eq!(json["outcomes"][1]["outcome"], "failed");
        assert_eq!(h.chat.sent().len(), 1);
    }

    #[tokio::test]
    async fn token_is_enforced_when_configured() {
        let config = Config {
            notify_token: Some("s3cret".into()),
            ..Config::default()
        };
        let h = setup(config);

        let app = routes::build(h.state.clone());
        let denied = app
            .clone()
            .oneshot(request(event(&[]), Some("wrong")))
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let allowed = app.oneshot(request(event(&[]), Some("s3cret"))).await.unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn non_event_body_is_400() {
        let h = setup(Config::default());
        let resp = routes::build(h.state.clone())
            .oneshot(request(b"\"nope\"".to_vec(), None))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
