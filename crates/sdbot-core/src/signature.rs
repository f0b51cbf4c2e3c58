//! Ed25519 verification of inbound interaction webhooks.
//!
//! The platform signs `timestamp || body` with the application's private key
//! and sends the hex signature in `x-signature-ed25519` alongside
//! `x-signature-timestamp`.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use thiserror::Error;

pub const SIGNATURE_HEADER: &str = "x-signature-ed25519";
pub const TIMESTAMP_HEADER: &str = "x-signature-timestamp";

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("public key is not valid hex: {0}")]
    KeyHex(#[source] hex::FromHexError),

    #[error("public key must be 32 bytes, got {0}")]
    KeyLength(usize),

    #[error("public key is not a valid ed25519 point")]
    KeyPoint(#[source] ed25519_dalek::SignatureError),

    #[error("signature is not valid hex")]
    SignatureHex(#[source] hex::FromHexError),

    #[error("signature must be 64 bytes, got {0}")]
    SignatureLength(usize),

    #[error("signature does not match")]
    Mismatch,
}

/// Verifies webhook signatures against the application's public key.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    key: VerifyingKey,
}

impl SignatureVerifier {
    /// Build a verifier from the hex-encoded public key shown in the
    /// application's developer settings.
    pub fn from_hex(public_key: &str) -> Result<Self, SignatureError> {
        let bytes = hex::decode(public_key.trim()).map_err(SignatureError::KeyHex)?;
        let bytes: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| SignatureError::KeyLength(bytes.len()))?;
        let key = VerifyingKey::from_bytes(&bytes).map_err(SignatureError::KeyPoint)?;
        Ok(Self { key })
    }

    pub fn verify(
        &self,
        signature_hex: &str,
        timestamp: &str,
        body: &[u8],
    ) -> Result<(), SignatureError> {
        let raw = hex::decode(signature_hex.trim()).map_err(SignatureError::SignatureHex)?;
        let raw: [u8; 64] = raw
            .as_slice()
            .try_into()
            .map_err(|_| SignatureError::SignatureLength(raw.len()))?;
        let signature = Signature::from_bytes(&raw);

        let mut message = Vec::with_capacity(timestamp.len() + body.len());
        message.extend_from_slice(timestamp.as_bytes());
        message.extend_from_slice(body);

        self.key
            .verify(&message, &signature)
            .map_err(|_| SignatureError::Mismatch)
    }
}
