//! The message envelope.
//!
//! The relay stores and forwards envelopes without opening them. It sees
//! routing metadata (sender and recipient DIDs, device ids as map keys) and
//! opaque blobs:
//!   - encrypted_payload  nonce || ciphertext || tag
//!   - wrapped_keys       one blob per recipient device
//!   - signature          64-byte Ed25519 signature
//!
//! All blobs are standard (padded) base64 on the wire. The envelope is
//! built once by the sender and never mutated afterwards.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::error::EnvelopeError;

/// One message as stored and forwarded by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Sender-generated unique id (UUIDv4).
    pub message_id: String,

    /// CID of the plaintext payload (`bafyrei...`).
    pub receipt_cid: String,

    pub sender_did: String,

    pub sender_device_id: String,

    /// Owners this message is addressed to, in first-seen order.
    pub recipient_dids: Vec<String>,

    /// Base64 of nonce || ciphertext || tag.
    pub encrypted_payload: String,

    /// Recipient device id → base64 wrapped-key blob.
    pub wrapped_keys: BTreeMap<String, String>,

    /// Base64 of the 64-byte detached signature.
    pub signature: String,
}

impl Envelope {
    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn is_addressed_to(&self, device_id: &str) -> bool {
        self.wrapped_keys.contains_key(device_id)
    }

    /// Decoded wrapped-key blob for `device_id`, or `NoKeyForDevice`.
    pub fn wrapped_key_for(&self, device_id: &str) -> Result<Vec<u8>, EnvelopeError> {
        let encoded = self
            .wrapped_keys
            .get(device_id)
            .ok_or_else(|| EnvelopeError::NoKeyForDevice {
                device_id: device_id.to_string(),
            })?;
        STANDARD
            .decode(encoded)
            .map_err(|e| EnvelopeError::malformed("wrapped_keys", e))
    }

    pub fn encrypted_payload_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        STANDARD
            .decode(&self.encrypted_payload)
            .map_err(|e| EnvelopeError::malformed("encrypted_payload", e))
    }

    pub fn signature_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        STANDARD
            .decode(&self.signature)
            .map_err(|e| EnvelopeError::malformed("signature", e))
    }
}
