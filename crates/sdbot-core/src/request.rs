//! Request handler: turns signed interaction webhooks into dispatched jobs.

use std::sync::Arc;

use sdbot_types::command::{AI_COMMAND, option};
use sdbot_types::interaction::{CommandInvocation, Embed, MessageData};
use sdbot_types::{Interaction, InteractionResponse, JobDescription, JobError};
use tracing::{debug, info, warn};

use crate::dispatch::JobDispatcher;
use crate::error::RelayError;
use crate::signature::SignatureVerifier;

pub struct InteractionHandler {
    verifier: Option<SignatureVerifier>,
    dispatcher: Arc<dyn JobDispatcher>,
    bucket: String,
}

impl std::fmt::Debug for InteractionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InteractionHandler")
            .field("verifier", &self.verifier.is_some())
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl InteractionHandler {
    /// `verifier` is `None` when no public key is configured; every request
    /// is then rejected as unauthorized.
    pub fn new(
        verifier: Option<SignatureVerifier>,
        dispatcher: Arc<dyn JobDispatcher>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            verifier,
            dispatcher,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// False when no public key was configured.
    pub fn verifies_signatures(&self) -> bool {
        self.verifier.is_some()
    }

    /// Verify, decode and act on one interaction.
    ///
    /// Nothing is parsed or dispatched unless the signature checks out.
    pub async fn handle(
        &self,
        signature: Option<&str>,
        timestamp: Option<&str>,
        body: &[u8],
    ) -> Result<InteractionResponse, RelayError> {
        let (Some(signature), Some(timestamp), Some(verifier)) =
            (signature, timestamp, self.verifier.as_ref())
        else {
            warn!("interaction rejected: missing signature headers or public key");
            return Err(RelayError::Unauthorized);
        };
        if body.is_empty() {
            warn!("interaction rejected: empty body");
            return Err(RelayError::Unauthorized);
        }
        if let Err(e) = verifier.verify(signature, timestamp, body) {
            warn!(error = %e, "interaction rejected");
            return Err(RelayError::Unauthorized);
        }

        match Interaction::from_slice(body).map_err(RelayError::Malformed)? {
            Interaction::Ping => {
                debug!("ping");
                Ok(InteractionResponse::pong())
            }
            Interaction::ApplicationCommand(cmd) if cmd.data.name == AI_COMMAND => {
                self.handle_ai(&cmd).await
            }
            Interaction::ApplicationCommand(cmd) => {
                debug!(command = %cmd.data.name, "ignoring unknown command");
                Ok(InteractionResponse::pong())
            }
            Interaction::Other { kind } => {
                debug!(kind, "ignoring interaction type");
                Ok(InteractionResponse::pong())
            }
        }
    }

    async fn handle_ai(&self, cmd: &CommandInvocation) -> Result<InteractionResponse, RelayError> {
        let job = match JobDescription::from_invocation(cmd, &self.bucket) {
            Ok(job) => job,
            Err(e) => {
                info!(interaction_id = %cmd.id, error = %e, "rejecting ai command");
                return Ok(InteractionResponse::ephemeral(user_message(&e)));
            }
        };

        self.dispatcher.dispatch(&job).await?;
        info!(
            interaction_id = %cmd.id,
            user_id = %cmd.user.id,
            key = job.output_key(),
            "job dispatched"
        );

        Ok(InteractionResponse::message(echo(&job)))
    }
}

fn user_message(e: &JobError) -> String {
    match e {
        JobError::MissingPrompt | JobError::OutsideGuild => e.to_string(),
        JobError::InvalidOption { .. } | JobError::OutOfRange(_) => format!("invalid option: {e}"),
    }
}

/// Quote the job back to the channel, previewing any input images.
fn echo(job: &JobDescription) -> MessageData {
    // Serializing a struct of strings and integers cannot fail.
    let json = serde_json::to_string(job).unwrap_or_default();
    let embeds = [
        (option::INIT_IMAGE, job.init_image()),
        (option::MASK, job.mask()),
    ]
    .into_iter()
    .filter_map(|(title, url)| url.map(|url| Embed::image(title, url)))
    .collect();

    MessageData {
        content: format!("> {json}"),
        embeds,
        flags: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingDispatcher, signed, test_keys};
    use sdbot_types::interaction::{EPHEMERAL, InteractionResponseType};
    use serde_json::json;
    use tracing_test::traced_test;

    fn ai_body(options: serde_json::Value) -> Vec<u8> {
        json!({
            "type": 2,
            "id": "900",
            "channel_id": "20",
            "guild_id": "10",
            "member": { "user": { "id": "30", "username": "alice" } },
            "data": {
                "id": "1",
                "name": "ai",
                "options": options,
                "resolved": {
                    "attachments": {
                        "55": { "id": "55", "url": "https://cdn.example/init.png", "filename": "init.png" }
                    }
                }
            }
        })
        .to_string()
        .into_bytes()
    }

    fn handler(dispatcher: Arc<RecordingDispatcher>) -> InteractionHandler {
        let (_, verifier) = test_keys();
        InteractionHandler::new(Some(verifier), dispatcher, "art")
    }

    #[tokio::test]
    async fn ai_command_dispatches_once_and_echoes_job() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let h = handler(dispatcher.clone());
        let body = ai_body(json!([
            { "name": "prompt", "type": 3, "value": "a red fox" },
            { "name": "init-image", "type": 11, "value": "55" }
        ]));
        let (sig, ts) = signed(&body);

        let resp = h.handle(Some(&sig), Some(&ts), &body).await.unwrap();

        let jobs = dispatcher.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].output_key(), "output/10/20/30/900");
        assert_eq!(jobs[0].bucket(), "art");

        assert_eq!(resp.kind, InteractionResponseType::ChannelMessageWithSource);
        let data = resp.data.unwrap();
        assert!(data.content.starts_with("> {\"prompt\":\"a red fox\""));
        assert_eq!(data.embeds.len(), 1);
        assert_eq!(data.embeds[0].title, "init-image");
        assert_eq!(data.embeds[0].image.url, "https://cdn.example/init.png");
        assert_eq!(data.flags, None);
    }

    #[tokio::test]
    #[traced_test]
    async fn bad_signature_is_rejected_without_dispatch() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let h = handler(dispatcher.clone());
        let body = ai_body(json!([{ "name": "prompt", "type": 3, "value": "x" }]));
        let (_, ts) = signed(&body);
        let (other_sig, _) = signed(b"{\"type\":1}");

        let err = h.handle(Some(&other_sig), Some(&ts), &body).await.unwrap_err();
        assert!(matches!(err, RelayError::Unauthorized));
        assert!(dispatcher.jobs().is_empty());
        assert!(logs_contain("signature does not match"));
    }

    #[tokio::test]
    async fn missing_headers_or_key_are_unauthorized() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let body = br#"{"type":1}"#;
        let (sig, ts) = signed(body);

        let h = handler(dispatcher.clone());
        assert!(matches!(
            h.handle(None, Some(&ts), body).await,
            Err(RelayError::Unauthorized)
        ));
        assert!(matches!(
            h.handle(Some(&sig), None, body).await,
            Err(RelayError::Unauthorized)
        ));

        let keyless = InteractionHandler::new(None, dispatcher, "art");
        assert!(matches!(
            keyless.handle(Some(&sig), Some(&ts), body).await,
            Err(RelayError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn ping_gets_pong_without_dispatch() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let h = handler(dispatcher.clone());
        let body = br#"{"type":1,"id":"1"}"#;
        let (sig, ts) = signed(body);

        let resp = h.handle(Some(&sig), Some(&ts), body).await.unwrap();
        assert_eq!(resp, InteractionResponse::pong());
        assert!(dispatcher.jobs().is_empty());
    }

    #[tokio::test]
    async fn missing_prompt_gets_ephemeral_reply() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let h = handler(dispatcher.clone());
        let body = ai_body(json!([{ "name": "seed", "type": 4, "value": 3 }]));
        let (sig, ts) = signed(&body);

        let resp = h.handle(Some(&sig), Some(&ts), &body).await.unwrap();
        let data = resp.data.unwrap();
        assert_eq!(data.flags, Some(EPHEMERAL));
        assert!(data.content.contains("prompt"));
        assert!(dispatcher.jobs().is_empty());
    }

    #[tokio::test]
    async fn out_of_range_option_gets_ephemeral_reply() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let h = handler(dispatcher.clone());
        let body = ai_body(json!([
            { "name": "prompt", "type": 3, "value": "x" },
            { "name": "num-inference-steps", "type": 4, "value": 99 }
        ]));
        let (sig, ts) = signed(&body);

        let data = h.handle(Some(&sig), Some(&ts), &body).await.unwrap().data.unwrap();
        assert_eq!(data.flags, Some(EPHEMERAL));
        assert!(data.content.starts_with("invalid option"));
        assert!(data.content.contains("num-inference-steps"));
        assert!(dispatcher.jobs().is_empty());
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let h = handler(Arc::new(RecordingDispatcher::default()));
        let body = b"{not json";
        let (sig, ts) = signed(body);
        assert!(matches!(
            h.handle(Some(&sig), Some(&ts), body).await,
            Err(RelayError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn unknown_command_is_acknowledged() {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let h = handler(dispatcher.clone());
        let body = json!({
            "type": 2, "id": "1", "channel_id": "2", "guild_id": "3",
            "member": { "user": { "id": "4" } },
            "data": { "id": "5", "name": "help" }
        })
        .to_string()
        .into_bytes();
        let (sig, ts) = signed(&body);

        let resp = h.handle(Some(&sig), Some(&ts), &body).await.unwrap();
        assert_eq!(resp, InteractionResponse::pong());
        assert!(dispatcher.jobs().is_empty());
    }

    #[tokio::test]
    async fn dispatch_fault_surfaces_as_error() {
        let dispatcher = Arc::new(RecordingDispatcher::failing("compute down"));
        let h = handler(dispatcher.clone());
        let body = ai_body(json!([{ "name": "prompt", "type": 3, "value": "x" }]));
        let (sig, ts) = signed(&body);

        let err = h.handle(Some(&sig), Some(&ts), &body).await.unwrap_err();
        assert!(matches!(err, RelayError::Dispatch(_)));
        assert!(err.to_string().contains("compute down"));
    }
}
