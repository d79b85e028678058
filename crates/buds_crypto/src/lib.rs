//! buds_crypto — cryptographic primitives of the Buds E2EE envelope
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize all secret material on drop.
//! - Every failure is a typed `CryptoError`; nothing here panics on
//!   attacker-controlled input.
//!
//! # Module layout
//! - `keys`       — device agreement (X25519) + signing (Ed25519) keypairs
//! - `agreement`  — X25519 + HKDF-SHA256 derivation of the key-wrap KEK
//! - `key_wrap`   — per-recipient wrapped-key blobs
//! - `payload`    — per-message key + payload encryption
//! - `aead`       — AES-256-GCM helpers shared by the two layers above
//! - `cid`        — receipt content identifiers (CIDv1, dag-cbor, sha2-256)
//! - `signature`  — canonical signed content + Ed25519 verification
//! - `phone`      — phone-number hashing for relay registration
//! - `error`      — unified error type

pub mod aead;
pub mod agreement;
pub mod cid;
pub mod error;
pub mod key_wrap;
pub mod keys;
pub mod payload;
pub mod phone;
pub mod signature;

#[cfg(test)]
mod proptests;

pub use cid::{compute_cid, verify_cid, ReceiptCid};
pub use error::CryptoError;
pub use keys::{DeviceKeys, DevicePublicKeys};
pub use payload::MessageKey;
