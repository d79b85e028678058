use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid agreement public key: {0}")]
    InvalidPublicKey(String),

    #[error("Key unwrap failed (truncated blob or authentication tag mismatch)")]
    KeyUnwrapFailed,

    #[error("Payload decryption failed (authentication tag mismatch — possible tampering)")]
    PayloadDecryptFailed,

    #[error("Content identifier mismatch: claimed {claimed}, computed {computed}")]
    IntegrityMismatch { claimed: String, computed: String },

    #[error("Signature verification failed")]
    SignatureInvalid,

    #[error("Invalid signature encoding: expected 64 bytes, got {0}")]
    InvalidSignatureEncoding(usize),

    #[error("AEAD encryption failed")]
    AeadEncrypt,

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}
