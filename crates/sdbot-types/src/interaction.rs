//! Discord interaction payloads, inbound and outbound.
//!
//! Only the subset of the interaction schema the relay reads is modelled.
//! Unknown fields are ignored so platform additions never break decoding.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Interaction type numbers as sent by the platform.
pub mod kind {
    pub const PING: u8 = 1;
    pub const APPLICATION_COMMAND: u8 = 2;
}

/// Message flag that hides the reply from everyone but the invoking user.
pub const EPHEMERAL: u64 = 1 << 6;

/// A decoded inbound interaction.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawInteraction")]
pub enum Interaction {
    Ping,
    ApplicationCommand(CommandInvocation),
    /// Any interaction type the relay does not act on (components,
    /// autocomplete, modals).
    Other { kind: u8 },
}

impl Interaction {
    pub fn from_slice(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }
}

/// An application command invocation (interaction type 2).
#[derive(Debug, Clone, PartialEq)]
pub struct CommandInvocation {
    /// Interaction id; doubles as the request id of the generated job.
    pub id: String,
    pub channel_id: String,
    /// `None` when the command was invoked outside a guild.
    pub guild_id: Option<String>,
    pub user: User,
    pub data: CommandData,
}

impl CommandInvocation {
    /// Find an option by name.
    pub fn option(&self, name: &str) -> Option<&CommandOption> {
        self.data.options.iter().find(|o| o.name == name)
    }

    /// String value of a named option.
    pub fn string_option(&self, name: &str) -> Option<&str> {
        self.option(name).and_then(|o| o.value.as_str())
    }

    /// Integer value of a named option. Returns `None` when the option is
    /// absent; `Some(Err(raw))` when present but not an integer.
    pub fn integer_option(&self, name: &str) -> Option<Result<i64, Value>> {
        self.option(name)
            .map(|o| o.value.as_i64().ok_or_else(|| o.value.clone()))
    }

    /// Resolve an attachment-typed option to the attachment's URL through
    /// the `resolved.attachments` side table.
    pub fn attachment_url(&self, name: &str) -> Option<&str> {
        let id = self.string_option(name)?;
        self.data
            .resolved
            .as_ref()?
            .attachments
            .get(id)
            .map(|a| a.url.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub user: User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandData {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub options: Vec<CommandOption>,
    #[serde(default)]
    pub resolved: Option<Resolved>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandOption {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: u8,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Resolved {
    #[serde(default)]
    pub attachments: HashMap<String, Attachment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// Wire shape before classification. The platform tags interactions with an
/// integer `type`, which serde's internally tagged enums cannot match on.
#[derive(Debug, Deserialize)]
struct RawInteraction {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    id: String,
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    guild_id: Option<String>,
    #[serde(default)]
    member: Option<Member>,
    #[serde(default)]
    user: Option<User>,
    #[serde(default)]
    data: Option<CommandData>,
}

impl TryFrom<RawInteraction> for Interaction {
    type Error = String;

    fn try_from(raw: RawInteraction) -> Result<Self, Self::Error> {
        match raw.kind {
            kind::PING => Ok(Interaction::Ping),
            kind::APPLICATION_COMMAND => {
                let data = raw.data.ok_or("application command without `data`")?;
                let channel_id = raw
                    .channel_id
                    .ok_or("application command without `channel_id`")?;
                // Guild invocations carry `member.user`, direct messages `user`.
                let user = raw
                    .member
                    .map(|m| m.user)
                    .or(raw.user)
                    .ok_or("application command without invoking user")?;
                Ok(Interaction::ApplicationCommand(CommandInvocation {
                    id: raw.id,
                    channel_id,
                    guild_id: raw.guild_id,
                    user,
                    data,
                }))
            }
            other => Ok(Interaction::Other { kind: other }),
        }
    }
}

// ── Responses ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionResponseType {
    Pong = 1,
    ChannelMessageWithSource = 4,
}

impl Serialize for InteractionResponseType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractionResponse {
    #[serde(rename = "type")]
    pub kind: InteractionResponseType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<MessageData>,
}

impl InteractionResponse {
    pub fn pong() -> Self {
        Self {
            kind: InteractionResponseType::Pong,
            data: None,
        }
    }

    pub fn message(data: MessageData) -> Self {
        Self {
            kind: InteractionResponseType::ChannelMessageWithSource,
            data: Some(data),
        }
    }

    /// A reply visible only to the invoking user.
    pub fn ephemeral(content: impl Into<String>) -> Self {
        Self::message(MessageData {
            content: content.into(),
            embeds: Vec::new(),
            flags: Some(EPHEMERAL),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageData {
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flags: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    pub image: EmbedImage,
}

impl Embed {
    pub fn image(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            image: EmbedImage { url: url.into() },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedImage {
    pub url: String,
}
