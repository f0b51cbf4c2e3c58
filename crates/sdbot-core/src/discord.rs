//! Discord REST client.
//!
//! Implements [`ChatPlatform`] over the v10 HTTP API and carries the
//! application-command endpoints used by [`crate::commands`]. Rate limits
//! surface as [`ChatError::Status`] with `429`; nothing is retried.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use sdbot_types::command::ApplicationCommand;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info};

use crate::chat::{ChannelRef, ChatError, ChatPlatform, ChatSession, ChatUser, OutgoingMessage};

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Channel types that accept messages: guild text, DM, voice (text chat),
/// group DM, announcement, the three thread kinds, and stage.
const TEXT_CAPABLE_CHANNEL_TYPES: [u8; 9] = [0, 1, 2, 3, 5, 10, 11, 12, 13];

#[derive(Debug, Clone)]
pub struct DiscordClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl DiscordClient {
    pub fn new(
        api_base: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ChatError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(
                "DiscordBot (sdbot, ",
                env!("CARGO_PKG_VERSION"),
                ")"
            ))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_owned(),
            token: token.into(),
        })
    }

    /// Validate the bot token and open a session bound to the bot user.
    pub async fn login(&self) -> Result<DiscordSession, ChatError> {
        let route = "/users/@me";
        let resp = self.request(reqwest::Method::GET, route).send().await?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(ChatError::Unauthorized);
        }
        let me: ApiUser = ensure_success(resp, route).await?.json().await?;
        info!(bot_id = %me.id, bot = %me.username, "chat session opened");
        Ok(DiscordSession {
            client: self.clone(),
            bot: me.into(),
        })
    }

    fn request(&self, method: reqwest::Method, route: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{route}", self.api_base))
            .header(AUTHORIZATION, format!("Bot {}", self.token))
    }
}

#[async_trait]
impl ChatPlatform for DiscordClient {
    async fn connect(&self) -> Result<Box<dyn ChatSession>, ChatError> {
        Ok(Box::new(self.login().await?))
    }
}

/// A logged-in session. Cheap to hold; all state lives in the HTTP pool.
#[derive(Debug)]
pub struct DiscordSession {
    client: DiscordClient,
    bot: ChatUser,
}

impl DiscordSession {
    pub fn bot(&self) -> &ChatUser {
        &self.bot
    }

    /// Application id; for bot accounts it equals the bot user id.
    pub fn application_id(&self) -> &str {
        &self.bot.id
    }

    /// GET a resource, mapping 403/404 to `None`.
    async fn get_optional<T: DeserializeOwned>(&self, route: &str) -> Result<Option<T>, ChatError> {
        let resp = self
            .client
            .request(reqwest::Method::GET, route)
            .send()
            .await?;
        if matches!(resp.status(), StatusCode::NOT_FOUND | StatusCode::FORBIDDEN) {
            debug!(route, status = %resp.status(), "resource not visible");
            return Ok(None);
        }
        Ok(Some(ensure_success(resp, route).await?.json().await?))
    }

    pub async fn list_commands(&self) -> Result<Vec<RegisteredCommand>, ChatError> {
        let route = format!("/applications/{}/commands", self.application_id());
        let resp = self
            .client
            .request(reqwest::Method::GET, &route)
            .send()
            .await?;
        Ok(ensure_success(resp, &route).await?.json().await?)
    }

    pub async fn delete_command(&self, command_id: &str) -> Result<(), ChatError> {
        let route = format!(
            "/applications/{}/commands/{command_id}",
            self.application_id()
        );
        let resp = self
            .client
            .request(reqwest::Method::DELETE, &route)
            .send()
            .await?;
        ensure_success(resp, &route).await?;
        Ok(())
    }

    /// Replace the application's global commands with `commands`.
    pub async fn overwrite_commands(
        &self,
        commands: &[ApplicationCommand],
    ) -> Result<Vec<RegisteredCommand>, ChatError> {
        let route = format!("/applications/{}/commands", self.application_id());
        let resp = self
            .client
            .request(reqwest::Method::PUT, &route)
            .json(commands)
            .send()
            .await?;
        Ok(ensure_success(resp, &route).await?.json().await?)
    }
}

#[async_trait]
impl ChatSession for DiscordSession {
    async fn text_channel(
        &self,
        guild_id: &str,
        channel_id: &str,
    ) -> Result<Option<ChannelRef>, ChatError> {
        let channel: Option<ApiChannel> = self.get_optional(&format!("/channels/{channel_id}")).await?;
        Ok(channel.and_then(|c| c.into_text_channel(guild_id)))
    }

    async fn user(&self, user_id: &str) -> Result<Option<ChatUser>, ChatError> {
        let user: Option<ApiUser> = self.get_optional(&format!("/users/{user_id}")).await?;
        Ok(user.map(ChatUser::from))
    }

    async fn send(&self, channel: &ChannelRef, message: OutgoingMessage) -> Result<(), ChatError> {
        let route = format!("/channels/{}/messages", channel.id);

        let attachments: Vec<_> = message
            .attachment
            .iter()
            .enumerate()
            .map(|(i, file)| json!({ "id": i, "filename": file.filename }))
            .collect();
        let payload = json!({
            "content": message.content,
            "allowed_mentions": { "users": message.allowed_user_mentions },
            "attachments": attachments,
        });

        let mut form = Form::new().text("payload_json", serde_json::to_string(&payload)?);
        if let Some(file) = message.attachment {
            let mut part = Part::bytes(file.data.to_vec()).file_name(file.filename);
            if let Some(content_type) = file.content_type.as_deref() {
                part = part.mime_str(content_type)?;
            }
            form = form.part("files[0]", part);
        }

        let resp = self
            .client
            .request(reqwest::Method::POST, &route)
            .multipart(form)
            .send()
            .await?;
        ensure_success(resp, &route).await?;
        debug!(channel_id = %channel.id, "message posted");
        Ok(())
    }

    async fn close(self: Box<Self>) {
        info!(bot_id = %self.bot.id, "chat session closed");
    }
}

async fn ensure_success(resp: Response, route: &str) -> Result<Response, ChatError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ChatError::Status {
        status,
        route: route.to_owned(),
        body,
    })
}

// ── API shapes ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiUser {
    id: String,
    #[serde(default)]
    username: String,
}

impl From<ApiUser> for ChatUser {
    fn from(u: ApiUser) -> Self {
        ChatUser {
            id: u.id,
            username: u.username,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiChannel {
    id: String,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    guild_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

impl ApiChannel {
    fn into_text_channel(self, guild_id: &str) -> Option<ChannelRef> {
        if !TEXT_CAPABLE_CHANNEL_TYPES.contains(&self.kind) {
            return None;
        }
        if self.guild_id.as_deref() != Some(guild_id) {
            return None;
        }
        Some(ChannelRef {
            id: self.id,
            guild_id: self.guild_id,
            name: self.name,
        })
    }
}

/// A command as returned by the command endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegisteredCommand {
    pub id: String,
    pub name: String,
}
