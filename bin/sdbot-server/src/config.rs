//! Server configuration, loaded from environment variables at startup.

use std::path::PathBuf;
use std::time::Duration;

use sdbot_core::discord::DEFAULT_API_BASE;

/// Where finished artifacts are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    /// S3-compatible endpoint, path-style addressing.
    Http(String),
    /// Local directory laid out as `{root}/{bucket}/{key}`.
    Dir(PathBuf),
}

/// Runtime configuration for sdbot-server.
///
/// Credentials have no default; `serve` refuses to start without the ones it
/// needs, but the server can be built without any of them for tests.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:3000"`).
    pub bind_address: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Hex-encoded Ed25519 public key of the Discord application. Without it
    /// every interaction is rejected.
    pub public_key: Option<String>,

    pub bot_token: Option<String>,

    /// Bucket generated images are written to.
    pub bucket: String,

    /// Endpoint fronting the image-generation runtime.
    pub compute_url: Option<String>,

    pub store: StoreConfig,

    /// Signing region for the HTTP store (default: `us-east-1`).
    pub store_region: String,

    /// Access key for the HTTP store. With the secret key set, every store
    /// request is SigV4-signed; otherwise requests are anonymous.
    pub store_access_key_id: Option<String>,

    pub store_secret_access_key: Option<String>,

    /// Session token accompanying temporary credentials.
    pub store_session_token: Option<String>,

    /// Discord REST base URL (default: v10).
    pub discord_api: String,

    /// Deadline for answering an interaction. Discord gives up after 3 s.
    pub interaction_timeout: Duration,

    /// Timeout for every outbound HTTP call.
    pub http_timeout: Duration,

    /// Bearer token required on `/notifications` when set.
    pub notify_token: Option<String>,

    pub enable_swagger: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_owned(),
            log_level: "info".to_owned(),
            log_json: false,
            public_key: None,
            bot_token: None,
            bucket: "sdbot".to_owned(),
            compute_url: None,
            store: StoreConfig::Dir(PathBuf::from("./artifacts")),
            store_region: "us-east-1".to_owned(),
            store_access_key_id: None,
            store_secret_access_key: None,
            store_session_token: None,
            discord_api: DEFAULT_API_BASE.to_owned(),
            interaction_timeout: Duration::from_millis(3000),
            http_timeout: Duration::from_millis(10_000),
            notify_token: None,
            enable_swagger: false,
        }
    }
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        let store = match env_opt("SDBOT_STORE_URL") {
            Some(url) => StoreConfig::Http(url),
            None => env_opt("SDBOT_STORE_DIR")
                .map(|dir| StoreConfig::Dir(PathBuf::from(dir)))
                .unwrap_or(d.store),
        };
        Self {
            bind_address: env_or("SDBOT_BIND", &d.bind_address),
            log_level: env_or("SDBOT_LOG", &d.log_level),
            log_json: env_flag("SDBOT_LOG_JSON"),
            public_key: env_opt("SDBOT_PUBLIC_KEY"),
            bot_token: env_opt("SDBOT_BOT_TOKEN"),
            bucket: env_or("SDBOT_BUCKET", &d.bucket),
            compute_url: env_opt("SDBOT_COMPUTE_URL"),
            store,
            store_region: env_opt_any(&["SDBOT_STORE_REGION", "AWS_REGION"]).unwrap_or(d.store_region),
            store_access_key_id: env_opt_any(&["SDBOT_STORE_ACCESS_KEY_ID", "AWS_ACCESS_KEY_ID"]),
            store_secret_access_key: env_opt_any(&[
                "SDBOT_STORE_SECRET_ACCESS_KEY",
                "AWS_SECRET_ACCESS_KEY",
            ]),
            store_session_token: env_opt_any(&["SDBOT_STORE_SESSION_TOKEN", "AWS_SESSION_TOKEN"]),
            discord_api: env_or("SDBOT_DISCORD_API", &d.discord_api),
            interaction_timeout: Duration::from_millis(parse_env(
                "SDBOT_INTERACTION_TIMEOUT_MS",
                3000,
            )),
            http_timeout: Duration::from_millis(parse_env("SDBOT_HTTP_TIMEOUT_MS", 10_000)),
            notify_token: env_opt("SDBOT_NOTIFY_TOKEN"),
            enable_swagger: env_flag("SDBOT_ENABLE_SWAGGER"),
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

/// Unset and empty are both `None`.
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// First of `keys` that is set and non-empty.
fn env_opt_any(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| env_opt(key))
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
