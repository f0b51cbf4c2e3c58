//! Axum router construction.
//!
//! [`build`] assembles the complete application router, including:
//! - Middleware layers (panic catching, per-request trace-ID injection)
//! - Optional Swagger UI (enable with `SDBOT_ENABLE_SWAGGER=true`)
//! - Health / heartbeat and OpenAPI document routes
//! - `/interactions` and `/notifications`

pub mod doc;
mod health;
mod interactions;
mod notifications;

use std::any::Any;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router, middleware};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::error;
use utoipa_swagger_ui::SwaggerUi;

use crate::middleware::trace;
use crate::state::AppState;

pub const OPENAPI_PATH: &str = "/api-docs/openapi.json";

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .merge(health::router())
        .merge(interactions::router())
        .merge(notifications::router(state.clone()));

    let api_doc = doc::get_docs();
    if state.config.enable_swagger {
        app = app.merge(SwaggerUi::new("/swagger-ui").url(OPENAPI_PATH, api_doc));
    } else {
        app = app.route(
            OPENAPI_PATH,
            get(move || {
                let doc = api_doc.clone();
                async move { Json(doc) }
            }),
        );
    }

    app
        // Outermost layers execute first on the way in.
        .layer(ServiceBuilder::new().layer(CatchPanicLayer::custom(panic_response)))
        .layer(middleware::from_fn(trace::trace_middleware))
        .with_state(state)
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    error!(panic = detail, "handler panicked");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal server error" })),
    )
        .into_response()
}
