//! Per-recipient wrapping of the message key.
//!
//! Wrapped-key blob layout (fixed offsets):
//!   [0:32)   sender ephemeral X25519 public key
//!   [32:44)  AES-GCM nonce
//!   [44:end) encrypted message key || 16-byte tag
//!
//! The same ephemeral public key appears in every recipient's blob for a
//! given message; only the KEK (and therefore the ciphertext) differs.

use x25519_dalek::StaticSecret;

use crate::{
    aead,
    agreement::{self, EphemeralKeyPair, Kek},
    error::CryptoError,
    payload::MessageKey,
};

pub const EPHEMERAL_PUBLIC_LEN: usize = 32;
pub const HEADER_LEN: usize = EPHEMERAL_PUBLIC_LEN + aead::NONCE_LEN;
/// Smallest blob that can authenticate at all.
pub const MIN_BLOB_LEN: usize = HEADER_LEN + aead::TAG_LEN;
/// Length of a well-formed blob carrying a 32-byte message key.
pub const BLOB_LEN: usize = MIN_BLOB_LEN + MessageKey::LEN;

/// Wrap `message_key` under `kek`, prefixed with `ephemeral_public`.
pub fn wrap(
    message_key: &MessageKey,
    kek: &Kek,
    ephemeral_public: &[u8; 32],
) -> Result<Vec<u8>, CryptoError> {
    let sealed = aead::seal(kek.as_bytes(), message_key.as_bytes())?;

    let mut out = Vec::with_capacity(EPHEMERAL_PUBLIC_LEN + sealed.len());
    out.extend_from_slice(ephemeral_public);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Derive the KEK for one recipient and wrap `message_key` for it.
pub fn wrap_for_recipient(
    message_key: &MessageKey,
    ephemeral: &EphemeralKeyPair,
    recipient_public: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let kek = ephemeral.derive_kek(recipient_public)?;
    wrap(message_key, &kek, ephemeral.public_bytes())
}

/// Recover the message key from a wrapped-key blob with the recipient's
/// agreement secret.
///
/// A low-order ephemeral key surfaces as `InvalidPublicKey`; every other
/// failure (short blob, tag mismatch, wrong key length) is `KeyUnwrapFailed`.
pub fn unwrap(blob: &[u8], recipient: &StaticSecret) -> Result<MessageKey, CryptoError> {
    if blob.len() < MIN_BLOB_LEN {
        return Err(CryptoError::KeyUnwrapFailed);
    }
    let (ephemeral_public, sealed) = blob.split_at(EPHEMERAL_PUBLIC_LEN);
    // X25519 ignores bit 255 of a u-coordinate; honest encoders never set it,
    // so a set bit means the blob was altered.
    if ephemeral_public[EPHEMERAL_PUBLIC_LEN - 1] & 0x80 != 0 {
        return Err(CryptoError::KeyUnwrapFailed);
    }

    let kek = agreement::derive_kek(recipient, ephemeral_public)?;
    let key = aead::open(kek.as_bytes(), sealed).map_err(|_| CryptoError::KeyUnwrapFailed)?;
    MessageKey::from_slice(&key).ok_or(CryptoError::KeyUnwrapFailed)
}
