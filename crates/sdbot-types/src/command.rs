//! The `ai` slash command: option names and the registration payload.

use serde::Serialize;

use crate::job::{MAX_GUIDANCE_SCALE, MAX_INFERENCE_STEPS, MAX_SEED, Model};

/// Name of the only command the relay dispatches jobs for.
pub const AI_COMMAND: &str = "ai";

/// Option names of the `ai` command.
pub mod option {
    pub const PROMPT: &str = "prompt";
    pub const INIT_IMAGE: &str = "init-image";
    pub const MODEL: &str = "model";
    pub const NUM_INFERENCE_STEPS: &str = "num-inference-steps";
    pub const GUIDANCE_SCALE: &str = "guidance-scale";
    pub const SEED: &str = "seed";
    pub const MASK: &str = "mask";
}

/// Application command option types used by the `ai` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionType {
    String = 3,
    Integer = 4,
    Attachment = 11,
}

impl Serialize for OptionType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

/// A global chat-input command as accepted by the bulk-overwrite endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApplicationCommand {
    pub name: String,
    pub description: String,
    pub options: Vec<CommandOptionSpec>,
    pub dm_permission: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandOptionSpec {
    #[serde(rename = "type")]
    pub kind: OptionType,
    pub name: String,
    pub description: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<Choice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_value: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_value: Option<i64>,
}

impl CommandOptionSpec {
    fn new(kind: OptionType, name: &str) -> Self {
        Self {
            kind,
            name: name.to_owned(),
            description: name.to_owned(),
            required: false,
            choices: Vec::new(),
            min_value: None,
            max_value: None,
        }
    }

    fn range(mut self, min: i64, max: i64) -> Self {
        self.min_value = Some(min);
        self.max_value = Some(max);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Choice {
    pub name: String,
    pub value: String,
}

/// Definition of the `ai` command. Every option is optional on the platform
/// side; the relay itself rejects invocations without a prompt.
pub fn ai_command() -> ApplicationCommand {
    let model = CommandOptionSpec {
        choices: Model::ALL
            .iter()
            .map(|m| Choice {
                name: m.choice_name().to_owned(),
                value: m.to_string(),
            })
            .collect(),
        ..CommandOptionSpec::new(OptionType::String, option::MODEL)
    };

    ApplicationCommand {
        name: AI_COMMAND.to_owned(),
        description: "Generate an image from a text prompt".to_owned(),
        options: vec![
            CommandOptionSpec::new(OptionType::String, option::PROMPT),
            CommandOptionSpec::new(OptionType::Attachment, option::INIT_IMAGE),
            model,
            CommandOptionSpec::new(OptionType::Integer, option::NUM_INFERENCE_STEPS)
                .range(1, i64::from(MAX_INFERENCE_STEPS)),
            CommandOptionSpec::new(OptionType::Integer, option::GUIDANCE_SCALE)
                .range(0, i64::from(MAX_GUIDANCE_SCALE)),
            CommandOptionSpec::new(OptionType::Integer, option::SEED).range(0, i64::from(MAX_SEED)),
            CommandOptionSpec::new(OptionType::Attachment, option::MASK),
        ],
        dm_permission: false,
    }
}
