//! Content-store key hierarchy for generated artifacts.
//!
//! Every artifact lands under `output/{guild}/{channel}/{user}/{request}`.
//! The request handler renders the key when it builds a job; the response
//! handler parses it back to find where the artifact must be delivered.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Top-level prefix shared by all artifact keys. Store notifications are
/// filtered on this prefix.
pub const OUTPUT_PREFIX: &str = "output/";

/// Origin identifiers encoded in an artifact key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputKey {
    pub guild_id: String,
    pub channel_id: String,
    pub user_id: String,
    pub request_id: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("key does not start with `output/`: {0}")]
    MissingPrefix(String),

    #[error("expected four segments after `output/`: {0}")]
    SegmentCount(String),

    #[error("{segment} segment is not a numeric id in key {key}")]
    NotSnowflake { segment: &'static str, key: String },

    #[error("empty request id in key {0}")]
    EmptyRequest(String),
}

impl OutputKey {
    pub fn new(
        guild_id: impl Into<String>,
        channel_id: impl Into<String>,
        user_id: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            guild_id: guild_id.into(),
            channel_id: channel_id.into(),
            user_id: user_id.into(),
            request_id: request_id.into(),
        }
    }

    /// Recover the origin identifiers from a stored object key.
    ///
    /// The guild, channel and user segments must be decimal ids. A file
    /// extension on the last segment (`…/123.png`) is not part of the
    /// request id.
    pub fn parse(key: &str) -> Result<Self, KeyError> {
        let rest = key
            .strip_prefix(OUTPUT_PREFIX)
            .ok_or_else(|| KeyError::MissingPrefix(key.to_owned()))?;

        let segments: Vec<&str> = rest.split('/').collect();
        let [guild, channel, user, request] = segments.as_slice() else {
            return Err(KeyError::SegmentCount(key.to_owned()));
        };

        for (segment, value) in [("guild", guild), ("channel", channel), ("user", user)] {
            if !is_snowflake(value) {
                return Err(KeyError::NotSnowflake {
                    segment,
                    key: key.to_owned(),
                });
            }
        }

        let request = request
            .split_once('.')
            .map_or(*request, |(stem, _extension)| stem);
        if request.is_empty() {
            return Err(KeyError::EmptyRequest(key.to_owned()));
        }

        Ok(Self::new(*guild, *channel, *user, request))
    }
}

impl fmt::Display for OutputKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{OUTPUT_PREFIX}{}/{}/{}/{}",
            self.guild_id, self.channel_id, self.user_id, self.request_id
        )
    }
}

impl FromStr for OutputKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn is_snowflake(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}
