//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use anyhow::Context;
use sdbot_core::discord::DiscordClient;
use sdbot_core::dispatch::HttpDispatcher;
use sdbot_core::signature::SignatureVerifier;
use sdbot_core::sigv4::{Credentials, RequestSigner};
use sdbot_core::store::{ContentStore, DirStore, HttpStore};
use sdbot_core::{ArtifactDelivery, InteractionHandler};
use tracing::{info, warn};

use crate::config::{Config, StoreConfig};

#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Answers `/interactions`.
    pub interactions: Arc<InteractionHandler>,
    /// Answers `/notifications`.
    pub delivery: Arc<ArtifactDelivery>,
}

impl AppState {
    /// Wire the real outbound clients from configuration.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let verifier = match config.public_key.as_deref() {
            Some(key) => Some(SignatureVerifier::from_hex(key).context("SDBOT_PUBLIC_KEY")?),
            None => {
                warn!("SDBOT_PUBLIC_KEY is not set; every interaction will be rejected");
                None
            }
        };

        if config.notify_token.is_none() {
            warn!("SDBOT_NOTIFY_TOKEN is not set; /notifications accepts unauthenticated requests");
        }

        let compute_url = config
            .compute_url
            .as_deref()
            .context("SDBOT_COMPUTE_URL must be set")?;
        let dispatcher = HttpDispatcher::new(compute_url, config.http_timeout)
            .context("building compute client")?;

        let store: Arc<dyn ContentStore> = match &config.store {
            StoreConfig::Http(url) => {
                let store =
                    HttpStore::new(url, config.http_timeout).context("building store client")?;
                match store_signer(&config)? {
                    Some(signer) => {
                        info!(%url, region = signer.region(), "reading artifacts from HTTP store, signed");
                        Arc::new(store.with_signer(signer))
                    }
                    None => {
                        warn!(%url, "reading artifacts from HTTP store anonymously; private buckets will answer 403");
                        Arc::new(store)
                    }
                }
            }
            StoreConfig::Dir(root) => {
                info!(root = %root.display(), "reading artifacts from local directory");
                Arc::new(DirStore::new(root))
            }
        };

        let token = config
            .bot_token
            .as_deref()
            .context("SDBOT_BOT_TOKEN must be set")?;
        let chat = DiscordClient::new(&config.discord_api, token, config.http_timeout)
            .context("building Discord client")?;

        Ok(Self {
            interactions: Arc::new(InteractionHandler::new(
                verifier,
                Arc::new(dispatcher),
                &config.bucket,
            )),
            delivery: Arc::new(ArtifactDelivery::new(store, Arc::new(chat), &config.bucket)),
            config: Arc::new(config),
        })
    }
}

/// Both halves of the key pair, or neither.
fn store_signer(config: &Config) -> anyhow::Result<Option<RequestSigner>> {
    match (
        config.store_access_key_id.as_deref(),
        config.store_secret_access_key.as_deref(),
    ) {
        (Some(access_key_id), Some(secret_access_key)) => Ok(Some(RequestSigner::new(
            Credentials {
                access_key_id: access_key_id.to_owned(),
                secret_access_key: secret_access_key.to_owned(),
                session_token: config.store_session_token.clone(),
            },
            &config.store_region,
        ))),
        (None, None) => Ok(None),
        _ => anyhow::bail!(
            "SDBOT_STORE_ACCESS_KEY_ID and SDBOT_STORE_SECRET_ACCESS_KEY must be set together"
        ),
    }
}
