use utoipa::OpenApi;

use crate::routes::health::HealthApi;
use crate::routes::interactions::InteractionsApi;
use crate::routes::notifications::NotificationsApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "sdbot-server",
        description = "Discord relay for the image-generation runtime"
    ),
    tags(
        (name = "health", description = "Liveness and readiness"),
        (name = "interactions", description = "Signed Discord interaction webhook"),
        (name = "notifications", description = "Artifact store object-created events")
    )
)]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(HealthApi::openapi());
    root.merge(InteractionsApi::openapi());
    root.merge(NotificationsApi::openapi());
    root
}
