//! Device key material
//!
//! Each *device* owns exactly two long-term keypairs:
//!   - an agreement keypair (X25519) used to unwrap per-message keys,
//!   - a signing keypair (Ed25519) used to sign outgoing envelopes.
//!
//! Private halves never leave the owning `DeviceKeys`; peers learn the
//! public halves through the roster as `DevicePublicKeys`.

use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;

fn to_32(bytes: &[u8], what: &str) -> Result<[u8; 32], CryptoError> {
    bytes.try_into().map_err(|_| {
        CryptoError::InvalidKey(format!("{what} must be 32 bytes, got {}", bytes.len()))
    })
}

// ── Agreement keypair ─────────────────────────────────────────────────────────

/// X25519 keypair. The secret is zeroized by `x25519-dalek` on drop.
pub struct AgreementKeyPair {
    secret: StaticSecret,
    public: X25519Public,
}

impl AgreementKeyPair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519Public::from(&secret);
        Self { secret, public }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let secret = StaticSecret::from(to_32(bytes, "Agreement key")?);
        let public = X25519Public::from(&secret);
        Ok(Self { secret, public })
    }

    pub fn secret(&self) -> &StaticSecret {
        &self.secret
    }

    pub fn public_bytes(&self) -> [u8; 32] {
        *self.public.as_bytes()
    }
}

// ── Signing keypair ───────────────────────────────────────────────────────────

/// Ed25519 keypair.  Drop clears memory via ZeroizeOnDrop.
#[derive(ZeroizeOnDrop)]
pub struct SigningKeyPair {
    #[zeroize(skip)]
    public: [u8; 32],
    secret_bytes: [u8; 32],
}

impl SigningKeyPair {
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self {
            public: signing_key.verifying_key().to_bytes(),
            secret_bytes: signing_key.to_bytes(),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let secret_bytes = to_32(bytes, "Signing key")?;
        let signing_key = SigningKey::from_bytes(&secret_bytes);
        Ok(Self {
            public: signing_key.verifying_key().to_bytes(),
            secret_bytes,
        })
    }

    pub fn public_bytes(&self) -> [u8; 32] {
        self.public
    }

    /// Sign arbitrary bytes; returns the 64-byte raw Ed25519 signature.
    pub fn sign(&self, msg: &[u8]) -> [u8; 64] {
        SigningKey::from_bytes(&self.secret_bytes).sign(msg).to_bytes()
    }
}

// ── Device keys ───────────────────────────────────────────────────────────────

/// Both keypairs of one device.
pub struct DeviceKeys {
    pub agreement: AgreementKeyPair,
    pub signing: SigningKeyPair,
}

impl DeviceKeys {
    pub fn generate() -> Self {
        Self {
            agreement: AgreementKeyPair::generate(),
            signing: SigningKeyPair::generate(),
        }
    }

    pub fn public_keys(&self) -> DevicePublicKeys {
        DevicePublicKeys {
            agreement: self.agreement.public_bytes(),
            signing: self.signing.public_bytes(),
        }
    }
}

/// Public halves of a device's keys, as distributed through the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DevicePublicKeys {
    pub agreement: [u8; 32],
    pub signing: [u8; 32],
}

impl DevicePublicKeys {
    pub fn agreement_b64(&self) -> String {
        STANDARD.encode(self.agreement)
    }

    pub fn signing_b64(&self) -> String {
        STANDARD.encode(self.signing)
    }

    /// Decode the base64 pair published in a registration record.
    pub fn from_b64(agreement: &str, signing: &str) -> Result<Self, CryptoError> {
        Ok(Self {
            agreement: to_32(&STANDARD.decode(agreement)?, "Agreement public key")?,
            signing: to_32(&STANDARD.decode(signing)?, "Signing public key")?,
        })
    }
}
