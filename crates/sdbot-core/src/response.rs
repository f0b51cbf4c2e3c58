//! Response handler: posts finished artifacts back to their origin channel.
//!
//! Each batch opens exactly one chat session, fans out over the
//! notifications concurrently, and closes the session once every
//! notification has settled. A notification that cannot be delivered never
//! affects its siblings.

use std::sync::Arc;

use futures::future::join_all;
use sdbot_types::{OutputKey, StoreNotification};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::chat::{ChatError, ChatPlatform, ChatSession, FileAttachment, OutgoingMessage};
use crate::error::RelayError;
use crate::store::{ContentStore, StoreError};

/// Longest message body the platform accepts, in characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;

const DEFAULT_EXTENSION: &str = "png";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Delivered { key: String, channel_id: String },
    /// The notification does not point at anything deliverable. Not a fault.
    Skipped { key: String, reason: String },
    Failed { key: String, error: String },
}

/// Per-batch summary, in notification order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub delivered: usize,
    pub skipped: usize,
    pub failed: usize,
    pub outcomes: Vec<DeliveryOutcome>,
}

impl BatchReport {
    pub fn from_outcomes(outcomes: Vec<DeliveryOutcome>) -> Self {
        let mut report = Self::default();
        for outcome in &outcomes {
            match outcome {
                DeliveryOutcome::Delivered { .. } => report.delivered += 1,
                DeliveryOutcome::Skipped { .. } => report.skipped += 1,
                DeliveryOutcome::Failed { .. } => report.failed += 1,
            }
        }
        report.outcomes = outcomes;
        report
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

#[derive(Debug, Error)]
enum Fault {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Chat(#[from] ChatError),
}

pub struct ArtifactDelivery {
    store: Arc<dyn ContentStore>,
    chat: Arc<dyn ChatPlatform>,
    bucket: String,
}

impl std::fmt::Debug for ArtifactDelivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactDelivery")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl ArtifactDelivery {
    /// Only notifications for `bucket`, the one jobs write to, are delivered.
    pub fn new(
        store: Arc<dyn ContentStore>,
        chat: Arc<dyn ChatPlatform>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            store,
            chat,
            bucket: bucket.into(),
        }
    }

    /// Deliver one batch. Only a failed login fails the call as a whole.
    pub async fn deliver(
        &self,
        notifications: &[StoreNotification],
    ) -> Result<BatchReport, RelayError> {
        if notifications.is_empty() {
            debug!("empty notification batch");
            return Ok(BatchReport::default());
        }

        let session = self.chat.connect().await?;
        let outcomes = join_all(
            notifications
                .iter()
                .map(|n| self.deliver_one(session.as_ref(), n)),
        )
        .await;
        session.close().await;

        let report = BatchReport::from_outcomes(outcomes);
        info!(
            delivered = report.delivered,
            skipped = report.skipped,
            failed = report.failed,
            "notification batch settled"
        );
        Ok(report)
    }

    async fn deliver_one(
        &self,
        session: &dyn ChatSession,
        notification: &StoreNotification,
    ) -> DeliveryOutcome {
        let key = notification.decoded_key();
        if notification.bucket != self.bucket {
            warn!(bucket = %notification.bucket, %key, "notification for foreign bucket ignored");
            return DeliveryOutcome::Skipped {
                key,
                reason: format!("bucket {} is not {}", notification.bucket, self.bucket),
            };
        }
        match try_deliver(self.store.as_ref(), session, &self.bucket, &key).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(bucket = %self.bucket, %key, error = %e, "delivery failed");
                DeliveryOutcome::Failed {
                    key,
                    error: e.to_string(),
                }
            }
        }
    }
}

async fn try_deliver(
    store: &dyn ContentStore,
    session: &dyn ChatSession,
    bucket: &str,
    key: &str,
) -> Result<DeliveryOutcome, Fault> {
    let skip = |reason: String| -> Result<DeliveryOutcome, Fault> {
        debug!(%key, %reason, "skipping notification");
        Ok(DeliveryOutcome::Skipped {
            key: key.to_owned(),
            reason,
        })
    };

    let origin = match OutputKey::parse(key) {
        Ok(origin) => origin,
        Err(e) => return skip(e.to_string()),
    };
    let Some(channel) = session
        .text_channel(&origin.guild_id, &origin.channel_id)
        .await?
    else {
        return skip(format!(
            "channel {} is not a text channel in guild {}",
            origin.channel_id, origin.guild_id
        ));
    };
    let Some(user) = session.user(&origin.user_id).await? else {
        return skip(format!("user {} not found", origin.user_id));
    };

    let object = store.fetch(bucket, key).await?;

    let mut content = format!("> {}", user.mention());
    if let Some(summary) = object.request_summary() {
        content.push(' ');
        content.push_str(summary);
    }

    let extension = key_extension(key).unwrap_or(DEFAULT_EXTENSION);
    let content_type = object.content_type.clone().or_else(|| {
        (extension == DEFAULT_EXTENSION).then(|| "image/png".to_owned())
    });

    let message = OutgoingMessage {
        content: truncate_chars(content, MAX_MESSAGE_CHARS),
        allowed_user_mentions: vec![user.id.clone()],
        attachment: Some(FileAttachment {
            filename: format!("{}.{extension}", origin.request_id),
            content_type,
            data: object.body,
        }),
    };
    session.send(&channel, message).await?;

    info!(%key, channel_id = %channel.id, user_id = %user.id, "artifact delivered");
    Ok(DeliveryOutcome::Delivered {
        key: key.to_owned(),
        channel_id: channel.id,
    })
}

/// Extension on the request segment, if any.
fn key_extension(key: &str) -> Option<&str> {
    let last = key.rsplit('/').next()?;
    let (_, ext) = last.split_once('.')?;
    (!ext.is_empty()).then_some(ext)
}

fn truncate_chars(mut s: String, max: usize) -> String {
    if let Some((idx, _)) = s.char_indices().nth(max) {
        s.truncate(idx);
    }
    s
}
