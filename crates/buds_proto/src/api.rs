//! Request/response bodies exchanged with the relay.
//! These map directly to JSON bodies on the wire.

use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::{device::Device, envelope::Envelope};

// ── Devices ──────────────────────────────────────────────────────────────────

/// `POST /api/devices/register`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterDeviceRequest {
    pub device_id: String,
    pub device_name: String,
    pub owner_did: String,
    /// Hex SHA-256 of the owner's phone number (see `buds_crypto::phone`).
    pub owner_phone_hash: String,
    /// Base64 X25519 public key (32 bytes)
    pub pubkey_x25519: String,
    /// Base64 Ed25519 public key (32 bytes)
    pub pubkey_ed25519: String,
}

impl RegisterDeviceRequest {
    pub fn for_device(device: &Device, owner_phone_hash: impl Into<String>) -> Self {
        let public = device.public_keys();
        Self {
            device_id: device.identity.device_id.clone(),
            device_name: device.identity.device_name.clone(),
            owner_did: device.identity.did.clone(),
            owner_phone_hash: owner_phone_hash.into(),
            pubkey_x25519: public.agreement_b64(),
            pubkey_ed25519: public.signing_b64(),
        }
    }
}

// ── Messages ─────────────────────────────────────────────────────────────────

/// `GET /api/messages/inbox?did=..&limit=..`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxQuery {
    pub did: String,
    pub limit: u32,
}

/// One malformed record does not hide the rest of the inbox: records that
/// fail to decode as an [`Envelope`] are logged and dropped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboxResponse {
    #[serde(default, deserialize_with = "skip_malformed")]
    pub messages: Vec<Envelope>,
    #[serde(default)]
    pub count: usize,
}

fn skip_malformed<'de, D>(deserializer: D) -> Result<Vec<Envelope>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
    let mut messages = Vec::with_capacity(raw.len());
    for record in raw {
        let message_id = record
            .get("message_id")
            .and_then(|v| v.as_str())
            .unwrap_or("<none>")
            .to_string();
        match serde_json::from_value::<Envelope>(record) {
            Ok(envelope) => messages.push(envelope),
            Err(e) => warn!(message_id = %message_id, error = %e, "skipping malformed inbox record"),
        }
    }
    Ok(messages)
}
