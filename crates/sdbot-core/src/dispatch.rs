//! Hand-off of job descriptions to the image-generation runtime.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use sdbot_types::JobDescription;
use thiserror::Error;
use tracing::{debug, info};

/// Header asking the runtime's front door to queue the job and return
/// immediately instead of waiting for the result.
pub const INVOCATION_TYPE_HEADER: &str = "x-amz-invocation-type";
const INVOCATION_TYPE_EVENT: &str = "Event";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("compute target unreachable: {0}")]
    Http(#[from] reqwest::Error),

    #[error("compute target rejected the job ({status}): {body}")]
    Rejected { status: StatusCode, body: String },
}

/// Something that accepts a job and runs it later. Implementations return
/// once the job has been accepted, never after it completes.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn dispatch(&self, job: &JobDescription) -> Result<(), DispatchError>;
}

/// Posts jobs as JSON to an HTTP endpoint fronting the runtime.
#[derive(Debug, Clone)]
pub struct HttpDispatcher {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpDispatcher {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("sdbot/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl JobDispatcher for HttpDispatcher {
    async fn dispatch(&self, job: &JobDescription) -> Result<(), DispatchError> {
        debug!(endpoint = %self.endpoint, key = job.output_key(), "dispatching job");

        let resp = self
            .client
            .post(&self.endpoint)
            .header(INVOCATION_TYPE_HEADER, INVOCATION_TYPE_EVENT)
            .json(job)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DispatchError::Rejected { status, body });
        }

        info!(key = job.output_key(), %status, "job accepted by compute target");
        Ok(())
    }
}
