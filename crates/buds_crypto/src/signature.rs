//! Detached Ed25519 signatures over envelope content.
//!
//! Signed content (injective, length-prefixed):
//!
//! ```text
//! "BudsE2EE-Signature-v1"
//! || u32_be(len(receipt_cid))      || receipt_cid
//! || u32_be(len(sender_did))       || sender_did
//! || u32_be(len(sender_device_id)) || sender_device_id
//! || u32_be(len(message_id))       || message_id
//! ```
//!
//! The CID already commits to the plaintext, so the signature binds the
//! plaintext to the sender identity and the message id without hashing the
//! payload twice.

use ed25519_dalek::{Signature, VerifyingKey};

use crate::{error::CryptoError, keys::SigningKeyPair};

pub const SIGNATURE_LEN: usize = 64;
pub const SIGNATURE_CONTEXT: &[u8] = b"BudsE2EE-Signature-v1";

/// Fields of an envelope covered by its signature.
#[derive(Debug, Clone, Copy)]
pub struct SignedFields<'a> {
    pub receipt_cid: &'a str,
    pub sender_did: &'a str,
    pub sender_device_id: &'a str,
    pub message_id: &'a str,
}

impl SignedFields<'_> {
    /// Canonical byte string that is signed and verified.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let fields = [
            self.receipt_cid,
            self.sender_did,
            self.sender_device_id,
            self.message_id,
        ];
        let len = SIGNATURE_CONTEXT.len() + fields.iter().map(|f| 4 + f.len()).sum::<usize>();
        let mut out = Vec::with_capacity(len);
        out.extend_from_slice(SIGNATURE_CONTEXT);
        for field in fields {
            out.extend_from_slice(&(field.len() as u32).to_be_bytes());
            out.extend_from_slice(field.as_bytes());
        }
        out
    }
}

/// Sign `fields` with the device signing key.
pub fn sign_fields(signer: &SigningKeyPair, fields: &SignedFields<'_>) -> [u8; SIGNATURE_LEN] {
    signer.sign(&fields.canonical_bytes())
}

/// Verify a detached signature.
///
/// - wrong signature length → `InvalidSignatureEncoding`
/// - undecodable verifying key → `InvalidKey`
/// - anything else that does not verify → `SignatureInvalid`
pub fn verify_signature(
    signature: &[u8],
    signing_public: &[u8; 32],
    signed_content: &[u8],
) -> Result<(), CryptoError> {
    let sig: [u8; SIGNATURE_LEN] = signature
        .try_into()
        .map_err(|_| CryptoError::InvalidSignatureEncoding(signature.len()))?;
    let vk = VerifyingKey::from_bytes(signing_public)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    vk.verify_strict(signed_content, &Signature::from_bytes(&sig))
        .map_err(|_| CryptoError::SignatureInvalid)
}

/// Verify a signature over envelope fields.
pub fn verify_fields(
    signature: &[u8],
    signing_public: &[u8; 32],
    fields: &SignedFields<'_>,
) -> Result<(), CryptoError> {
    verify_signature(signature, signing_public, &fields.canonical_bytes())
}
