//! Read access to the artifact store.
//!
//! [`ContentStore`] is the seam the response handler fetches artifacts
//! through. [`HttpStore`] talks to an S3-compatible endpoint using
//! path-style URLs, signing requests when given credentials; [`DirStore`]
//! keeps objects on the local filesystem and is what development setups and
//! tests use.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use reqwest::{StatusCode, Url};
use thiserror::Error;
use tracing::debug;

use crate::sigv4::{RequestSigner, SigningError, encode_path};

/// Prefix of user-defined metadata headers on S3-compatible stores.
pub const USER_METADATA_PREFIX: &str = "x-amz-meta-";

/// Metadata entry holding the JSON summary of the original request.
pub const REQUEST_SUMMARY_KEY: &str = "json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("store returned {status} for {bucket}/{key}")]
    Status {
        status: StatusCode,
        bucket: String,
        key: String,
    },

    #[error("store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object metadata is not valid JSON: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("key escapes the store root: {0}")]
    InvalidKey(String),

    #[error("invalid object URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error(transparent)]
    Signing(#[from] SigningError),
}

/// A stored artifact: its bytes plus user-defined metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl StoredObject {
    /// JSON summary of the request that produced this artifact, if the
    /// runtime recorded one.
    pub fn request_summary(&self) -> Option<&str> {
        self.metadata.get(REQUEST_SUMMARY_KEY).map(String::as_str)
    }
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<StoredObject, StoreError>;
}

// ── HTTP (S3-compatible) ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct HttpStore {
    client: reqwest::Client,
    endpoint: String,
    signer: Option<RequestSigner>,
}

impl HttpStore {
    /// `endpoint` is the store's base URL; objects are read from
    /// `{endpoint}/{bucket}/{key}`. Requests are anonymous until
    /// [`HttpStore::with_signer`] is called.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("sdbot/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_owned(),
            signer: None,
        })
    }

    /// Sign every request with SigV4, as private buckets require.
    pub fn with_signer(mut self, signer: RequestSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    fn object_url(&self, bucket: &str, key: &str) -> Result<Url, StoreError> {
        let raw = format!("{}/{}", self.endpoint, encode_path(&format!("{bucket}/{key}")));
        Url::parse(&raw).map_err(|e| StoreError::InvalidUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })
    }
}

/// `Host` header value reqwest sends for `url`.
fn host_header(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    })
}

#[async_trait]
impl ContentStore for HttpStore {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<StoredObject, StoreError> {
        let url = self.object_url(bucket, key)?;
        debug!(%url, signed = self.signer.is_some(), "fetching object");

        let mut request = self.client.get(url.clone());
        if let Some(signer) = &self.signer {
            let host = host_header(&url).ok_or_else(|| StoreError::InvalidUrl {
                url: url.to_string(),
                reason: "no host".to_owned(),
            })?;
            for (name, value) in signer.sign("GET", &host, url.path(), &[], Utc::now())? {
                request = request.header(name, value);
            }
        }

        let resp = request.send().await?;
        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(StoreError::NotFound {
                bucket: bucket.to_owned(),
                key: key.to_owned(),
            });
        }
        if !status.is_success() {
            return Err(StoreError::Status {
                status,
                bucket: bucket.to_owned(),
                key: key.to_owned(),
            });
        }

        let headers = resp.headers();
        let content_type = headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let metadata = headers
            .iter()
            .filter_map(|(name, value)| {
                let field = name.as_str().strip_prefix(USER_METADATA_PREFIX)?;
                Some((field.to_owned(), value.to_str().ok()?.to_owned()))
            })
            .collect();

        let body = resp.bytes().await?;
        Ok(StoredObject {
            body,
            content_type,
            metadata,
        })
    }
}

// ── Local directory ──────────────────────────────────────────────────────────

/// Stores `{root}/{bucket}/{key}` as the object body and
/// `{root}/{bucket}/{key}.meta.json` as a flat string map of metadata.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

const METADATA_SUFFIX: &str = ".meta.json";

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(bucket).join(key);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StoreError::InvalidKey(format!("{bucket}/{key}")));
        }
        Ok(self.root.join(relative))
    }

    fn metadata_path(object: &Path) -> PathBuf {
        let mut name = object.as_os_str().to_owned();
        name.push(METADATA_SUFFIX);
        PathBuf::from(name)
    }

    /// Write an object, creating intermediate directories.
    pub async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        metadata: &BTreeMap<String, String>,
    ) -> Result<(), StoreError> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, body).await?;
        tokio::fs::write(Self::metadata_path(&path), serde_json::to_vec(metadata)?).await?;
        Ok(())
    }
}

#[async_trait]
impl ContentStore for DirStore {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<StoredObject, StoreError> {
        let path = self.object_path(bucket, key)?;
        let body = match tokio::fs::read(&path).await {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    bucket: bucket.to_owned(),
                    key: key.to_owned(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let metadata = match tokio::fs::read(Self::metadata_path(&path)).await {
            Ok(raw) => serde_json::from_slice(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(StoredObject {
            body,
            content_type: None,
            metadata,
        })
    }
}
