use thiserror::Error;

use crate::chat::ChatError;
use crate::dispatch::DispatchError;

/// Failures that end a handler invocation. Per-notification faults in the
/// response handler are not errors; they are reported as
/// [`crate::response::DeliveryOutcome::Failed`].
#[derive(Debug, Error)]
pub enum RelayError {
    /// Missing headers, missing key, or a signature that does not verify.
    /// Deliberately carries no detail so nothing leaks to the caller.
    #[error("request signature could not be verified")]
    Unauthorized,

    #[error("interaction body is not valid JSON: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Chat(#[from] ChatError),
}
