//! Chat-platform seam used by the response handler.
//!
//! A [`ChatPlatform`] hands out one [`ChatSession`] per invocation. The
//! session is owned by the caller and must be closed with
//! [`ChatSession::close`] once the batch is done; nothing is shared across
//! invocations.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat platform request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("chat platform returned {status} for {route}: {body}")]
    Status {
        status: StatusCode,
        route: String,
        body: String,
    },

    #[error("bot token rejected by chat platform")]
    Unauthorized,

    #[error("could not encode message payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A channel the bot can post into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRef {
    pub id: String,
    pub guild_id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatUser {
    pub id: String,
    pub username: String,
}

impl ChatUser {
    /// Inline mention that pings the user.
    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileAttachment {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub content: String,
    /// Users the message may ping; everyone else mentioned stays silent.
    pub allowed_user_mentions: Vec<String>,
    pub attachment: Option<FileAttachment>,
}

#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Log in and open a session scoped to the current invocation.
    async fn connect(&self) -> Result<Box<dyn ChatSession>, ChatError>;
}

#[async_trait]
pub trait ChatSession: Send + Sync {
    /// Resolve a text-capable channel inside `guild_id`. `Ok(None)` when the
    /// channel does not exist, is not visible to the bot, belongs to another
    /// guild, or cannot carry messages.
    async fn text_channel(
        &self,
        guild_id: &str,
        channel_id: &str,
    ) -> Result<Option<ChannelRef>, ChatError>;

    /// `Ok(None)` when the user is unknown to the platform.
    async fn user(&self, user_id: &str) -> Result<Option<ChatUser>, ChatError>;

    async fn send(&self, channel: &ChannelRef, message: OutgoingMessage) -> Result<(), ChatError>;

    /// End the session. Called exactly once, after the last `send`.
    async fn close(self: Box<Self>);
}
