//! The job description handed to the image-generation runtime.
//!
//! Serialized field names are the runtime's input contract and must not be
//! renamed. Optional parameters are omitted when unset so the runtime applies
//! its own defaults.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;
use validator::{Validate, ValidationErrors};

use crate::command::option;
use crate::interaction::CommandInvocation;
use crate::key::OutputKey;

/// Diffusion checkpoints the runtime knows how to load.
///
/// Parsing accepts both the checkpoint id and the short choice name shown in
/// the slash-command picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum Model {
    #[serde(rename = "CompVis/stable-diffusion")]
    #[strum(to_string = "CompVis/stable-diffusion", serialize = "stable-diffusion")]
    StableDiffusion,
    #[serde(rename = "hakurei/waifu-diffusion")]
    #[strum(to_string = "hakurei/waifu-diffusion", serialize = "waifu-diffusion")]
    WaifuDiffusion,
}

impl Model {
    pub const ALL: [Model; 2] = [Model::StableDiffusion, Model::WaifuDiffusion];

    /// Short name shown in the command's choice list.
    pub fn choice_name(self) -> &'static str {
        match self {
            Model::StableDiffusion => "stable-diffusion",
            Model::WaifuDiffusion => "waifu-diffusion",
        }
    }
}

/// Upper bound of the `seed` option (`2^31 - 1`).
pub const MAX_SEED: u32 = i32::MAX as u32;
pub const MAX_INFERENCE_STEPS: u8 = 32;
pub const MAX_GUIDANCE_SCALE: u8 = 15;

/// Why a command invocation could not be turned into a job. All variants are
/// user errors and are reported back to the invoking user.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("missing required option `prompt`")]
    MissingPrompt,

    #[error("this command can only be used inside a server")]
    OutsideGuild,

    #[error("invalid `{name}` option: {reason}")]
    InvalidOption { name: &'static str, reason: String },

    #[error("option out of range: {0}")]
    OutOfRange(String),
}

impl JobError {
    fn from_validation(errors: ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .keys()
            .map(|field| field.replace('_', "-"))
            .collect();
        fields.sort();
        JobError::OutOfRange(fields.join(", "))
    }
}

/// One generation request, immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct JobDescription {
    #[validate(length(min = 1))]
    prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    init_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model: Option<Model>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 32))]
    num_inference_steps: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(max = 15))]
    guidance_scale: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    mask: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(max = 2_147_483_647))]
    seed: Option<u32>,
    s3_bucket_name: String,
    s3_object_name: String,
}

impl JobDescription {
    /// Build a job from an `ai` command invocation.
    ///
    /// The output key is derived from the guild, channel, invoking user and
    /// interaction id, so it is unique per request.
    pub fn from_invocation(cmd: &CommandInvocation, bucket: &str) -> Result<Self, JobError> {
        let prompt = cmd
            .string_option(option::PROMPT)
            .filter(|p| !p.trim().is_empty())
            .ok_or(JobError::MissingPrompt)?;
        let guild_id = cmd.guild_id.as_deref().ok_or(JobError::OutsideGuild)?;

        let model = cmd
            .string_option(option::MODEL)
            .map(|raw| {
                raw.parse::<Model>().map_err(|_| JobError::InvalidOption {
                    name: option::MODEL,
                    reason: format!("unknown model `{raw}`"),
                })
            })
            .transpose()?;

        let key = OutputKey::new(guild_id, &cmd.channel_id, &cmd.user.id, &cmd.id);

        let job = Self {
            prompt: prompt.to_owned(),
            init_image: cmd.attachment_url(option::INIT_IMAGE).map(str::to_owned),
            model,
            num_inference_steps: integer_option(cmd, option::NUM_INFERENCE_STEPS)?,
            guidance_scale: integer_option(cmd, option::GUIDANCE_SCALE)?,
            mask: cmd.attachment_url(option::MASK).map(str::to_owned),
            seed: integer_option(cmd, option::SEED)?,
            s3_bucket_name: bucket.to_owned(),
            s3_object_name: key.to_string(),
        };
        job.validate().map_err(JobError::from_validation)?;
        Ok(job)
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn model(&self) -> Option<Model> {
        self.model
    }

    pub fn num_inference_steps(&self) -> Option<u8> {
        self.num_inference_steps
    }

    pub fn guidance_scale(&self) -> Option<u8> {
        self.guidance_scale
    }

    pub fn seed(&self) -> Option<u32> {
        self.seed
    }

    pub fn init_image(&self) -> Option<&str> {
        self.init_image.as_deref()
    }

    pub fn mask(&self) -> Option<&str> {
        self.mask.as_deref()
    }

    pub fn bucket(&self) -> &str {
        &self.s3_bucket_name
    }

    /// Store key the runtime must write the artifact to.
    pub fn output_key(&self) -> &str {
        &self.s3_object_name
    }
}

fn integer_option<T: TryFrom<i64>>(
    cmd: &CommandInvocation,
    name: &'static str,
) -> Result<Option<T>, JobError> {
    match cmd.integer_option(name) {
        None => Ok(None),
        Some(Ok(v)) => T::try_from(v).map(Some).map_err(|_| JobError::InvalidOption {
            name,
            reason: format!("{v} is out of range"),
        }),
        Some(Err(raw)) => Err(JobError::InvalidOption {
            name,
            reason: format!("expected an integer, got {raw}"),
        }),
    }
}
