//! Payload encryption under the per-message key.
//!
//! One random 32-byte `MessageKey` per message; the payload is encrypted
//! exactly once with it, whatever the recipient count. Blob layout:
//!   [ nonce (12) | ciphertext | tag (16) ]

use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::{aead, error::CryptoError};

/// Per-message symmetric key. Zeroized on drop; not `Clone`.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MessageKey([u8; 32]);

impl MessageKey {
    pub const LEN: usize = 32;

    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self(key)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Copy a decrypted key straight into place. `None` unless `bytes` is
    /// exactly `LEN` long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::LEN {
            return None;
        }
        let mut key = Self([0u8; 32]);
        key.0.copy_from_slice(bytes);
        Some(key)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for MessageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MessageKey(..)")
    }
}

/// Encrypt the serialized message body.
pub fn encrypt(plaintext: &[u8], key: &MessageKey) -> Result<Vec<u8>, CryptoError> {
    aead::seal(key.as_bytes(), plaintext)
}

/// Decrypt an encrypted-payload blob.
pub fn decrypt(blob: &[u8], key: &MessageKey) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    aead::open(key.as_bytes(), blob).map_err(|_| CryptoError::PayloadDecryptFailed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let key = MessageKey::generate();
        let blob = encrypt(b"hello", &key).unwrap();
        assert_eq!(blob.len(), aead::NONCE_LEN + 5 + aead::TAG_LEN);
        assert_eq!(decrypt(&blob, &key).unwrap().as_slice(), b"hello");
    }

    #[test]
    fn empty_payload_is_tag_only() {
        let key = MessageKey::generate();
        let blob = encrypt(b"", &key).unwrap();
        assert_eq!(blob.len(), aead::NONCE_LEN + aead::TAG_LEN);
        assert!(decrypt(&blob, &key).unwrap().is_empty());
    }

    #[test]
    fn from_slice_requires_exact_length() {
        let bytes = [7u8; 32];
        let key = MessageKey::from_slice(&bytes).unwrap();
        assert_eq!(key.as_bytes(), &bytes);
        assert!(MessageKey::from_slice(&bytes[..31]).is_none());
        assert!(MessageKey::from_slice(&[7u8; 33]).is_none());
        assert!(MessageKey::from_slice(&[]).is_none());
    }

    #[test]
    fn other_key_is_rejected() {
        let blob = encrypt(b"hello", &MessageKey::generate()).unwrap();
        let err = decrypt(&blob, &MessageKey::generate()).unwrap_err();
        assert!(matches!(err, CryptoError::PayloadDecryptFailed));
    }

    #[test]
    fn tampered_tag_is_rejected() {
        let key = MessageKey::generate();
        let mut blob = encrypt(b"hello", &key).unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        assert!(matches!(
            decrypt(&blob, &key),
            Err(CryptoError::PayloadDecryptFailed)
        ));
    }

    #[test]
    fn truncated_blob_is_rejected() {
        let key = MessageKey::generate();
        assert!(matches!(
            decrypt(&[0u8; 20], &key),
            Err(CryptoError::PayloadDecryptFailed)
        ));
    }
}
