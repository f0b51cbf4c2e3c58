//! In-memory stand-ins for the dispatcher, store and chat platform.
//!
//! Compiled for this crate's tests and, through the `testing` feature, for
//! downstream test suites.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use ed25519_dalek::{Signer, SigningKey};
use reqwest::StatusCode;
use sdbot_types::JobDescription;

use crate::chat::{ChannelRef, ChatError, ChatPlatform, ChatSession, ChatUser, OutgoingMessage};
use crate::dispatch::{DispatchError, JobDispatcher};
use crate::signature::SignatureVerifier;
use crate::store::{ContentStore, REQUEST_SUMMARY_KEY, StoreError, StoredObject};

/// Timestamp used by [`signed`].
pub const TEST_TIMESTAMP: &str = "1700000000";

/// Deterministic signing key and the matching verifier.
pub fn test_keys() -> (SigningKey, SignatureVerifier) {
    let signing = SigningKey::from_bytes(&[7u8; 32]);
    let verifier = SignatureVerifier::from_hex(&test_public_key_hex())
        .unwrap_or_else(|e| panic!("test key must be valid: {e}"));
    (signing, verifier)
}

pub fn test_public_key_hex() -> String {
    hex::encode(SigningKey::from_bytes(&[7u8; 32]).verifying_key().to_bytes())
}

/// Sign `body` with the test key. Returns `(signature_hex, timestamp)`.
pub fn signed(body: &[u8]) -> (String, String) {
    let (signing, _) = test_keys();
    let mut message = TEST_TIMESTAMP.as_bytes().to_vec();
    message.extend_from_slice(body);
    (
        hex::encode(signing.sign(&message).to_bytes()),
        TEST_TIMESTAMP.to_owned(),
    )
}

fn locked<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ── Dispatcher ───────────────────────────────────────────────────────────────

/// Records every accepted job. A failing instance rejects with 503.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    jobs: Mutex<Vec<JobDescription>>,
    fail_with: Option<String>,
}

impl RecordingDispatcher {
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            jobs: Mutex::default(),
            fail_with: Some(message.into()),
        }
    }

    pub fn jobs(&self) -> Vec<JobDescription> {
        locked(&self.jobs).clone()
    }
}

#[async_trait]
impl JobDispatcher for RecordingDispatcher {
    async fn dispatch(&self, job: &JobDescription) -> Result<(), DispatchError> {
        if let Some(body) = &self.fail_with {
            return Err(DispatchError::Rejected {
                status: StatusCode::SERVICE_UNAVAILABLE,
                body: body.clone(),
            });
        }
        locked(&self.jobs).push(job.clone());
        Ok(())
    }
}

// ── Store ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<(String, String), StoredObject>>,
}

impl MemoryStore {
    pub fn insert(&self, bucket: &str, key: &str, body: impl Into<Bytes>, summary: Option<&str>) {
        let metadata = summary
            .map(|s| BTreeMap::from([(REQUEST_SUMMARY_KEY.to_owned(), s.to_owned())]))
            .unwrap_or_default();
        locked(&self.objects).insert(
            (bucket.to_owned(), key.to_owned()),
            StoredObject {
                body: body.into(),
                content_type: None,
                metadata,
            },
        );
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn fetch(&self, bucket: &str, key: &str) -> Result<StoredObject, StoreError> {
        locked(&self.objects)
            .get(&(bucket.to_owned(), key.to_owned()))
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                bucket: bucket.to_owned(),
                key: key.to_owned(),
            })
    }
}

// ── Chat ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Recorder {
    sent: Mutex<Vec<(ChannelRef, OutgoingMessage)>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

/// Chat platform with a fixed directory of channels and users. Clones share
/// the same record of sent messages and sessions.
#[derive(Debug, Clone, Default)]
pub struct FakeChat {
    channels: HashMap<String, ChannelRef>,
    users: HashMap<String, ChatUser>,
    failing_channels: HashSet<String>,
    reject_login: bool,
    recorder: Arc<Recorder>,
}

impl FakeChat {
    pub fn with_channel(mut self, guild_id: &str, channel_id: &str) -> Self {
        self.channels.insert(
            channel_id.to_owned(),
            ChannelRef {
                id: channel_id.to_owned(),
                guild_id: Some(guild_id.to_owned()),
                name: None,
            },
        );
        self
    }

    pub fn with_user(mut self, user_id: &str, username: &str) -> Self {
        self.users.insert(
            user_id.to_owned(),
            ChatUser {
                id: user_id.to_owned(),
                username: username.to_owned(),
            },
        );
        self
    }

    /// Sends to `channel_id` fail with a 403.
    pub fn failing_sends_to(mut self, channel_id: &str) -> Self {
        self.failing_channels.insert(channel_id.to_owned());
        self
    }

    pub fn rejecting_login(mut self) -> Self {
        self.reject_login = true;
        self
    }

    pub fn sent(&self) -> Vec<(ChannelRef, OutgoingMessage)> {
        locked(&self.recorder.sent).clone()
    }

    pub fn sessions_opened(&self) -> usize {
        self.recorder.opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> usize {
        self.recorder.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatPlatform for FakeChat {
    async fn connect(&self) -> Result<Box<dyn ChatSession>, ChatError> {
        if self.reject_login {
            return Err(ChatError::Unauthorized);
        }
        self.recorder.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSession(self.clone())))
    }
}

struct FakeSession(FakeChat);

#[async_trait]
impl ChatSession for FakeSession {
    async fn text_channel(
        &self,
        guild_id: &str,
        channel_id: &str,
    ) -> Result<Option<ChannelRef>, ChatError> {
        Ok(self
            .0
            .channels
            .get(channel_id)
            .filter(|c| c.guild_id.as_deref() == Some(guild_id))
            .cloned())
    }

    async fn user(&self, user_id: &str) -> Result<Option<ChatUser>, ChatError> {
        Ok(self.0.users.get(user_id).cloned())
    }

    async fn send(&self, channel: &ChannelRef, message: OutgoingMessage) -> Result<(), ChatError> {
        if self.0.failing_channels.contains(&channel.id) {
            return Err(ChatError::Status {
                status: StatusCode::FORBIDDEN,
                route: format!("/channels/{}/messages", channel.id),
                body: "Missing Access".to_owned(),
            });
        }
        locked(&self.0.recorder.sent).push((channel.clone(), message));
        Ok(())
    }

    async fn close(self: Box<Self>) {
        self.0.recorder.closed.fetch_add(1, Ordering::SeqCst);
    }
}
