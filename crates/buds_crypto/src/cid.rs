//! Content addressing for receipt payloads.
//!
//! CID = multibase(base32-lower, 0x01 || 0x71 || 0x12 || 0x20 || SHA-256(plaintext))
//!
//! i.e. a CIDv1 with the dag-cbor codec over a sha2-256 multihash, rendered
//! as `b` + RFC 4648 base32 (lowercase, unpadded). Every client in the
//! system computes the same string for the same bytes.

use std::fmt;

use multibase::Base;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::CryptoError;

pub const CID_VERSION_1: u8 = 0x01;
pub const DAG_CBOR_CODEC: u8 = 0x71;
pub const SHA2_256_CODE: u8 = 0x12;
pub const SHA2_256_LEN: u8 = 0x20;

/// Byte length of a binary receipt CID (two 2-byte headers + digest).
pub const CID_BYTES_LEN: usize = 4 + SHA2_256_LEN as usize;

/// Text form of a receipt CID, e.g. `bafyrei...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptCid(String);

impl ReceiptCid {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReceiptCid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn cid_bytes(plaintext: &[u8]) -> [u8; CID_BYTES_LEN] {
    let digest = Sha256::digest(plaintext);
    let mut out = [0u8; CID_BYTES_LEN];
    out[..4].copy_from_slice(&[CID_VERSION_1, DAG_CBOR_CODEC, SHA2_256_CODE, SHA2_256_LEN]);
    out[4..].copy_from_slice(&digest);
    out
}

fn encode_cid_bytes(bytes: &[u8]) -> String {
    multibase::encode(Base::Base32Lower, bytes)
}

fn decode_cid_bytes(text: &str) -> Option<Vec<u8>> {
    let (base, bytes) = multibase::decode(text).ok()?;
    let base32 = matches!(base, Base::Base32Lower | Base::Base32Upper);
    let headers_ok = bytes.len() == CID_BYTES_LEN
        && bytes[..4] == [CID_VERSION_1, DAG_CBOR_CODEC, SHA2_256_CODE, SHA2_256_LEN];
    (base32 && headers_ok).then_some(bytes)
}

/// Compute the receipt CID of `plaintext`. Deterministic.
pub fn compute_cid(plaintext: &[u8]) -> ReceiptCid {
    ReceiptCid(encode_cid_bytes(&cid_bytes(plaintext)))
}

/// Check that `claimed` addresses exactly `plaintext`.
///
/// Base32 is case-insensitive, so an upper-case rendering of the right CID
/// is accepted. Anything else is `IntegrityMismatch`.
pub fn verify_cid(claimed: &str, plaintext: &[u8]) -> Result<(), CryptoError> {
    let computed = cid_bytes(plaintext);
    match decode_cid_bytes(claimed) {
        Some(bytes) if constant_time_eq::constant_time_eq(&bytes, &computed) => Ok(()),
        _ => Err(CryptoError::IntegrityMismatch {
            claimed: claimed.to_string(),
            computed: encode_cid_bytes(&computed),
        }),
    }
}
