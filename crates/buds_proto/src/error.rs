use buds_crypto::CryptoError;
use thiserror::Error;

/// Failure of envelope production or consumption.
///
/// `NoKeyForDevice` is the expected "not addressed to this device" outcome;
/// the remaining recipient-side variants mean the envelope cannot be trusted.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("No wrapped key for device {device_id}")]
    NoKeyForDevice { device_id: String },

    #[error("Invalid agreement public key: {0}")]
    InvalidPublicKey(String),

    #[error("Key unwrap failed (truncated blob or authentication tag mismatch)")]
    KeyUnwrapFailed,

    #[error("Payload decryption failed")]
    PayloadDecryptFailed,

    #[error("Integrity mismatch: claimed CID {claimed}, computed {computed}")]
    IntegrityMismatch { claimed: String, computed: String },

    #[error("Signature verification failed")]
    SignatureInvalid,

    #[error("Invalid signature encoding: expected 64 bytes, got {0}")]
    InvalidSignatureEncoding(usize),

    #[error("Envelope has no recipients")]
    NoRecipients,

    #[error("Recipient device {0} listed more than once")]
    DuplicateRecipientDevice(String),

    #[error("Malformed envelope field `{field}`: {reason}")]
    Malformed { field: &'static str, reason: String },

    #[error("Crypto error: {0}")]
    Crypto(CryptoError),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),
}

impl EnvelopeError {
    /// The envelope simply was not addressed to this device.
    pub fn is_not_addressed(&self) -> bool {
        matches!(self, Self::NoKeyForDevice { .. })
    }

    /// Tampering or corruption was detected.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            Self::KeyUnwrapFailed
                | Self::PayloadDecryptFailed
                | Self::IntegrityMismatch { .. }
                | Self::SignatureInvalid
                | Self::InvalidSignatureEncoding(_)
                | Self::InvalidPublicKey(_)
                | Self::Malformed { .. }
        )
    }

    pub(crate) fn malformed(field: &'static str, reason: impl ToString) -> Self {
        Self::Malformed { field, reason: reason.to_string() }
    }
}

impl From<CryptoError> for EnvelopeError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidPublicKey(reason) => Self::InvalidPublicKey(reason),
            CryptoError::KeyUnwrapFailed => Self::KeyUnwrapFailed,
            CryptoError::PayloadDecryptFailed => Self::PayloadDecryptFailed,
            CryptoError::IntegrityMismatch { claimed, computed } => {
                Self::IntegrityMismatch { claimed, computed }
            }
            CryptoError::SignatureInvalid => Self::SignatureInvalid,
            CryptoError::InvalidSignatureEncoding(len) => Self::InvalidSignatureEncoding(len),
            other => Self::Crypto(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_addressed_is_not_integrity_failure() {
        let err = EnvelopeError::NoKeyForDevice { device_id: "d".into() };
        assert!(err.is_not_addressed());
        assert!(!err.is_integrity_failure());
    }

    #[test]
    fn crypto_kinds_map_one_to_one() {
        assert!(matches!(
            EnvelopeError::from(CryptoError::KeyUnwrapFailed),
            EnvelopeError::KeyUnwrapFailed
        ));
        assert!(matches!(
            EnvelopeError::from(CryptoError::InvalidSignatureEncoding(63)),
            EnvelopeError::InvalidSignatureEncoding(63)
        ));
        assert!(matches!(
            EnvelopeError::from(CryptoError::AeadEncrypt),
            EnvelopeError::Crypto(CryptoError::AeadEncrypt)
        ));
    }
}
