//! Key agreement for the key-wrap layer.
//!
//! `derive_kek` — X25519 between one side's secret and the other side's
//!   public key, then HKDF-SHA256 (no salt, info `BudsE2EE-KeyWrap`) down to
//!   a 32-byte key-encryption key.
//!
//! The sender runs it with the per-message ephemeral secret and each
//! recipient's agreement public key; every recipient runs it with its own
//! agreement secret and the ephemeral public key carried in the wrapped-key
//! blob. DH is commutative, so both ends land on the same KEK.

use hkdf::Hkdf;
use rand::rngs::OsRng;
use sha2::Sha256;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// HKDF info label for the key-wrap KEK. Must not be reused by any other
/// derivation in the system.
pub const KEY_WRAP_INFO: &[u8] = b"BudsE2EE-KeyWrap";

/// 32-byte key-encryption key. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct Kek([u8; 32]);

impl Kek {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for Kek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Kek(..)")
    }
}

/// Parse a 32-byte Montgomery-curve public key encoding.
pub fn parse_public_key(bytes: &[u8]) -> Result<X25519Public, CryptoError> {
    let arr: [u8; 32] = bytes.try_into().map_err(|_| {
        CryptoError::InvalidPublicKey(format!("expected 32 bytes, got {}", bytes.len()))
    })?;
    Ok(X25519Public::from(arr))
}

/// Expand `ikm` + `info` into `output.len()` bytes of key material.
pub fn hkdf_expand(
    ikm: &[u8],
    salt: Option<&[u8]>,
    info: &[u8],
    output: &mut [u8],
) -> Result<(), CryptoError> {
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    hk.expand(info, output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))
}

/// Derive the KEK shared between `secret` and `peer_public`.
///
/// Rejects peer keys that force an all-zero shared secret (low-order
/// points); such a key cannot have come from an honest peer.
pub fn derive_kek(secret: &StaticSecret, peer_public: &[u8]) -> Result<Kek, CryptoError> {
    let peer = parse_public_key(peer_public)?;
    let shared = secret.diffie_hellman(&peer);
    if !shared.was_contributory() {
        return Err(CryptoError::InvalidPublicKey(
            "low-order point (non-contributory shared secret)".into(),
        ));
    }

    let mut kek = [0u8; 32];
    hkdf_expand(shared.as_bytes(), None, KEY_WRAP_INFO, &mut kek)?;
    Ok(Kek(kek))
}

/// Per-message ephemeral agreement keypair.
///
/// Generated once per message and used against every recipient; the
/// secret is zeroized by `x25519-dalek` when this value is dropped.
pub struct EphemeralKeyPair {
    secret: StaticSecret,
    public: [u8; 32],
}

impl EphemeralKeyPair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = *X25519Public::from(&secret).as_bytes();
        Self { secret, public }
    }

    pub fn public_bytes(&self) -> &[u8; 32] {
        &self.public
    }

    pub fn derive_kek(&self, peer_public: &[u8]) -> Result<Kek, CryptoError> {
        derive_kek(&self.secret, peer_public)
    }
}
