//! AES-256-GCM sealing shared by the key-wrap and payload layers.
//!
//! 32-byte key, fresh random 12-byte nonce per call, 16-byte tag, empty AAD.
//! Sealed layout: `nonce || ciphertext || tag`.
//!
//! Each layer maps a failed open to its own error kind.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng as AeadOsRng},
    Aes256Gcm, Nonce,
};
use zeroize::Zeroizing;

use crate::error::CryptoError;

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Opening failed: the input was shorter than nonce + tag, or the tag
/// did not authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenError;

/// Encrypt `plaintext` with a 32-byte key and no associated data,
/// prepending a random 12-byte nonce.
pub fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::AeadEncrypt)?;

    let nonce = Aes256Gcm::generate_nonce(&mut AeadOsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| CryptoError::AeadEncrypt)?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt wire-format bytes (nonce || ciphertext+tag).
pub fn open(key: &[u8; 32], data: &[u8]) -> Result<Zeroizing<Vec<u8>>, OpenError> {
    if data.len() < NONCE_LEN + TAG_LEN {
        return Err(OpenError);
    }
    let (nonce_bytes, ct) = data.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| OpenError)?;

    let plaintext = cipher.decrypt(nonce, ct).map_err(|_| OpenError)?;
    Ok(Zeroizing::new(plaintext))
}
