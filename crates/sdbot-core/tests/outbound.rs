//! Outbound clients against local stand-in servers.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use sdbot_core::chat::{ChatError, ChatPlatform, ChatSession, FileAttachment, OutgoingMessage};
use sdbot_core::commands::CommandRegistrar;
use sdbot_core::discord::DiscordClient;
use sdbot_core::dispatch::{DispatchError, HttpDispatcher, JobDispatcher};
use sdbot_core::sigv4::{Credentials, RequestSigner};
use sdbot_core::store::{ContentStore, HttpStore, StoreError};
use sdbot_types::JobDescription;
use serde_json::{Value, json};

const TIMEOUT: Duration = Duration::from_secs(5);

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn job() -> JobDescription {
    serde_json::from_value(json!({
        "prompt": "a red fox",
        "seed": 7,
        "s3_bucket_name": "art",
        "s3_object_name": "output/10/20/30/900"
    }))
    .unwrap()
}

// ── dispatch ─────────────────────────────────────────────────────────────────

type Captured = Arc<Mutex<Vec<(Option<String>, Value)>>>;

async fn record_invoke(
    State(seen): State<Captured>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    let mode = headers
        .get("x-amz-invocation-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    seen.lock().unwrap().push((mode, body));
    StatusCode::ACCEPTED
}

#[tokio::test]
async fn dispatcher_posts_job_as_async_event() {
    let seen = Captured::default();
    let base = spawn(
        Router::new()
            .route("/invoke", post(record_invoke))
            .with_state(seen.clone()),
    )
    .await;

    let dispatcher = HttpDispatcher::new(format!("{base}/invoke"), TIMEOUT).unwrap();
    dispatcher.dispatch(&job()).await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0.as_deref(), Some("Event"));
    assert_eq!(seen[0].1["prompt"], "a red fox");
    assert_eq!(seen[0].1["s3_object_name"], "output/10/20/30/900");
    assert!(seen[0].1.get("mask").is_none());
}

#[tokio::test]
async fn dispatcher_reports_rejection() {
    let base = spawn(Router::new().route(
        "/invoke",
        post(|| async { (StatusCode::TOO_MANY_REQUESTS, "throttled") }),
    ))
    .await;

    let err = HttpDispatcher::new(format!("{base}/invoke"), TIMEOUT)
        .unwrap()
        .dispatch(&job())
        .await
        .unwrap_err();
    match err {
        DispatchError::Rejected { status, body } => {
            assert_eq!(status.as_u16(), 429);
            assert_eq!(body, "throttled");
        }
        other => panic!("unexpected error: {other}"),
    }
}

// ── store ────────────────────────────────────────────────────────────────────

async fn serve_object(Path((bucket, key)): Path<(String, String)>) -> impl IntoResponse {
    if bucket == "art" && key == "output/10/20/30/900.png" {
        (
            StatusCode::OK,
            [
                ("content-type", "image/png"),
                ("x-amz-meta-json", r#"{"prompt":"fox"}"#),
                ("x-amz-meta-origin", "runtime"),
            ],
            b"PNG".to_vec(),
        )
            .into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

#[tokio::test]
async fn http_store_reads_body_and_user_metadata() {
    let base = spawn(Router::new().route("/{bucket}/{*key}", get(serve_object))).await;
    let store = HttpStore::new(&base, TIMEOUT).unwrap();

    let obj = store.fetch("art", "output/10/20/30/900.png").await.unwrap();
    assert_eq!(&obj.body[..], b"PNG");
    assert_eq!(obj.content_type.as_deref(), Some("image/png"));
    assert_eq!(obj.request_summary(), Some(r#"{"prompt":"fox"}"#));
    assert_eq!(
        obj.metadata,
        BTreeMap::from([
            ("json".to_owned(), r#"{"prompt":"fox"}"#.to_owned()),
            ("origin".to_owned(), "runtime".to_owned()),
        ])
    );

    let err = store.fetch("art", "output/missing").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

fn signer() -> RequestSigner {
    RequestSigner::new(
        Credentials {
            access_key_id: "AKIDSDBOT".into(),
            secret_access_key: "not-so-secret".into(),
            session_token: Some("session".into()),
        },
        "eu-west-1",
    )
}

/// A private bucket: answers only requests whose SigV4 signature it can
/// reproduce.
async fn private_object(uri: Uri, headers: HeaderMap) -> impl IntoResponse {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned()
    };
    let Ok(when) = chrono::NaiveDateTime::parse_from_str(&header("x-amz-date"), "%Y%m%dT%H%M%SZ")
    else {
        return StatusCode::FORBIDDEN.into_response();
    };
    let expected = signer()
        .sign("GET", &header("host"), uri.path(), &[], when.and_utc())
        .unwrap();
    let authorized = expected
        .iter()
        .all(|(name, value)| header(name.as_str()) == *value);
    if !authorized || uri.path() != "/art/output/10/20/30/9%200.png" {
        return StatusCode::FORBIDDEN.into_response();
    }
    (StatusCode::OK, [("content-type", "image/png")], b"PNG".to_vec()).into_response()
}

#[tokio::test]
async fn http_store_signs_requests_for_private_buckets() {
    let base = spawn(Router::new().fallback(private_object)).await;
    let key = "output/10/20/30/9 0.png";

    let anonymous = HttpStore::new(&base, TIMEOUT).unwrap();
    let err = anonymous.fetch("art", key).await.unwrap_err();
    assert!(matches!(err, StoreError::Status { status, .. } if status.as_u16() == 403));

    let signed = HttpStore::new(&base, TIMEOUT).unwrap().with_signer(signer());
    let obj = signed.fetch("art", key).await.unwrap();
    assert_eq!(&obj.body[..], b"PNG");
}

// ── discord ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct DiscordLog {
    posted: Vec<(String, Value, Vec<(String, Option<String>, Vec<u8>)>)>,
    deleted: Vec<String>,
    overwritten: Vec<Value>,
}

type Log = Arc<Mutex<DiscordLog>>;

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("authorization").and_then(|v| v.to_str().ok()) == Some("Bot tok")
}

async fn me(headers: HeaderMap) -> impl IntoResponse {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(json!({ "id": "77", "username": "sdbot", "bot": true })).into_response()
}

async fn user(Path(id): Path<String>) -> impl IntoResponse {
    match id.as_str() {
        "30" => Json(json!({ "id": "30", "username": "alice" })).into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn channel(Path(id): Path<String>) -> impl IntoResponse {
    match id.as_str() {
        "20" => Json(json!({ "id": "20", "type": 0, "guild_id": "10", "name": "art" })).into_response(),
        "21" => Json(json!({ "id": "21", "type": 4, "guild_id": "10" })).into_response(),
        "22" => StatusCode::FORBIDDEN.into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn post_message(
    State(log): State<Log>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let mut payload = Value::Null;
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_owned();
        if name == "payload_json" {
            payload = serde_json::from_str(&field.text().await.unwrap()).unwrap();
        } else {
            let filename = field.file_name().unwrap_or_default().to_owned();
            let content_type = field.content_type().map(str::to_owned);
            files.push((filename, content_type, field.bytes().await.unwrap().to_vec()));
        }
    }
    log.lock().unwrap().posted.push((id, payload, files));
    Json(json!({ "id": "5000" }))
}

async fn list_commands(Path(_app): Path<String>) -> Json<Value> {
    Json(json!([
        { "id": "c1", "name": "old", "application_id": "77" },
        { "id": "c2", "name": "ai", "application_id": "77" }
    ]))
}

async fn delete_command(
    State(log): State<Log>,
    Path((_app, id)): Path<(String, String)>,
) -> StatusCode {
    log.lock().unwrap().deleted.push(id);
    StatusCode::NO_CONTENT
}

async fn overwrite_commands(
    State(log): State<Log>,
    Path(app): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    assert_eq!(app, "77");
    let registered: Vec<Value> = body
        .as_array()
        .unwrap()
        .iter()
        .enumerate()
        .map(|(i, c)| json!({ "id": format!("n{i}"), "name": c["name"] }))
        .collect();
    log.lock().unwrap().overwritten.push(body);
    Json(Value::Array(registered))
}

async fn discord() -> (String, Log) {
    let log = Log::default();
    let router = Router::new()
        .route("/users/@me", get(me))
        .route("/users/{id}", get(user))
        .route("/channels/{id}", get(channel))
        .route("/channels/{id}/messages", post(post_message))
        .route(
            "/applications/{app}/commands",
            get(list_commands).put(overwrite_commands),
        )
        .route("/applications/{app}/commands/{id}", delete(delete_command))
        .with_state(log.clone());
    (spawn(router).await, log)
}

#[tokio::test]
async fn session_resolves_channels_and_users() {
    let (base, _) = discord().await;
    let client = DiscordClient::new(&base, "tok", TIMEOUT).unwrap();
    let session = client.connect().await.unwrap();

    let art = session.text_channel("10", "20").await.unwrap().unwrap();
    assert_eq!(art.name.as_deref(), Some("art"));
    // Wrong guild, category channel, no access, missing.
    assert!(session.text_channel("11", "20").await.unwrap().is_none());
    assert!(session.text_channel("10", "21").await.unwrap().is_none());
    assert!(session.text_channel("10", "22").await.unwrap().is_none());
    assert!(session.text_channel("10", "23").await.unwrap().is_none());

    assert_eq!(session.user("30").await.unwrap().unwrap().username, "alice");
    assert!(session.user("31").await.unwrap().is_none());
    session.close().await;
}

#[tokio::test]
async fn session_posts_multipart_message_with_file() {
    let (base, log) = discord().await;
    let session = DiscordClient::new(&base, "tok", TIMEOUT)
        .unwrap()
        .connect()
        .await
        .unwrap();
    let channel = session.text_channel("10", "20").await.unwrap().unwrap();

    session
        .send(
            &channel,
            OutgoingMessage {
                content: "> <@30> {}".into(),
                allowed_user_mentions: vec!["30".into()],
                attachment: Some(FileAttachment {
                    filename: "900.png".into(),
                    content_type: Some("image/png".into()),
                    data: bytes::Bytes::from_static(b"PNG"),
                }),
            },
        )
        .await
        .unwrap();
    session.close().await;

    let log = log.lock().unwrap();
    assert_eq!(log.posted.len(), 1);
    let (channel_id, payload, files) = &log.posted[0];
    assert_eq!(channel_id, "20");
    assert_eq!(payload["content"], "> <@30> {}");
    assert_eq!(payload["allowed_mentions"]["users"], json!(["30"]));
    assert_eq!(payload["attachments"][0]["filename"], "900.png");
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].0, "900.png");
    assert_eq!(files[0].1.as_deref(), Some("image/png"));
    assert_eq!(files[0].2, b"PNG");
}

#[tokio::test]
async fn bad_token_fails_login() {
    let (base, _) = discord().await;
    let err = DiscordClient::new(&base, "nope", TIMEOUT)
        .unwrap()
        .connect()
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ChatError::Unauthorized));
}

#[tokio::test]
async fn registrar_replaces_global_commands() {
    let (base, log) = discord().await;
    let registrar = CommandRegistrar::new(DiscordClient::new(&base, "tok", TIMEOUT).unwrap());

    let report = registrar.sync().await.unwrap();

    assert_eq!(report.application_id, "77");
    assert_eq!(report.removed, vec!["old".to_owned(), "ai".to_owned()]);
    assert_eq!(report.registered, vec!["ai".to_owned()]);

    let log = log.lock().unwrap();
    assert_eq!(log.deleted, vec!["c1".to_owned(), "c2".to_owned()]);
    let sent = &log.overwritten[0][0];
    assert_eq!(sent["name"], "ai");
    assert_eq!(sent["dm_permission"], false);
    assert_eq!(sent["options"][0]["name"], "prompt");
}
