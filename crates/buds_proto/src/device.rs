//! Device identities.
//!
//! A `did` names an owner and may span several devices; a `device_id` names
//! one device for its whole lifetime. Only the owning `Device` holds the
//! private keys; peers address it through a `RecipientDevice`.

use buds_crypto::{DeviceKeys, DevicePublicKeys};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub did: String,
    pub device_id: String,
    pub device_name: String,
}

/// A local device: identity plus both private keypairs.
pub struct Device {
    pub identity: DeviceIdentity,
    keys: DeviceKeys,
}

impl Device {
    /// Create a device for `did` with a fresh UUIDv4 device id and keys.
    pub fn generate(did: impl Into<String>, device_name: impl Into<String>) -> Self {
        Self::from_parts(
            DeviceIdentity {
                did: did.into(),
                device_id: uuid::Uuid::new_v4().to_string(),
                device_name: device_name.into(),
            },
            DeviceKeys::generate(),
        )
    }

    pub fn from_parts(identity: DeviceIdentity, keys: DeviceKeys) -> Self {
        Self { identity, keys }
    }

    pub fn did(&self) -> &str {
        &self.identity.did
    }

    pub fn device_id(&self) -> &str {
        &self.identity.device_id
    }

    pub fn keys(&self) -> &DeviceKeys {
        &self.keys
    }

    pub fn public_keys(&self) -> DevicePublicKeys {
        self.keys.public_keys()
    }

    /// How peers address this device when sealing an envelope.
    pub fn as_recipient(&self) -> RecipientDevice {
        RecipientDevice {
            did: self.identity.did.clone(),
            device_id: self.identity.device_id.clone(),
            agreement_public: self.keys.agreement.public_bytes(),
        }
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

/// Roster entry for one recipient device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientDevice {
    pub did: String,
    pub device_id: String,
    pub agreement_public: [u8; 32],
}
