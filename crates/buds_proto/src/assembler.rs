//! Envelope assembly (sender) and consumption (recipient).
//!
//! Sender:
//!   message key → encrypt payload → CID over plaintext → sign
//!   → one ephemeral X25519 keypair → wrap message key per recipient device
//!
//! Recipient (linear, halts at the first failure):
//!   RECEIVED → LOOKUP_WRAPPED_KEY → UNWRAP_KEY → DECRYPT_PAYLOAD
//!            → VERIFY_CID → VERIFY_SIGNATURE → TRUSTED
//!
//! Plaintext never leaves this module before its CID has been checked.

use std::collections::{BTreeMap, HashSet};

use base64::{engine::general_purpose::STANDARD, Engine};
use buds_crypto::{
    agreement::EphemeralKeyPair,
    cid::{compute_cid, verify_cid, ReceiptCid},
    key_wrap, payload,
    signature::{self, SignedFields, SIGNATURE_LEN},
    MessageKey,
};
use thiserror::Error;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::{
    device::{Device, RecipientDevice},
    envelope::Envelope,
    error::EnvelopeError,
};

// ── Sender ───────────────────────────────────────────────────────────────────

/// Produces envelopes on behalf of one local device.
pub struct Sender<'a> {
    device: &'a Device,
}

impl<'a> Sender<'a> {
    pub fn new(device: &'a Device) -> Self {
        Self { device }
    }

    /// Encrypt `plaintext` once and wrap its key for every device in
    /// `recipients`.
    ///
    /// The message key and the ephemeral secret are dropped (and zeroed)
    /// before this returns, on success and on error alike.
    pub fn seal(
        &self,
        plaintext: &[u8],
        recipients: &[RecipientDevice],
    ) -> Result<Envelope, EnvelopeError> {
        if recipients.is_empty() {
            return Err(EnvelopeError::NoRecipients);
        }
        let mut seen = HashSet::with_capacity(recipients.len());
        for r in recipients {
            if !seen.insert(r.device_id.as_str()) {
                return Err(EnvelopeError::DuplicateRecipientDevice(r.device_id.clone()));
            }
        }

        let message_key = MessageKey::generate();
        let encrypted_payload = payload::encrypt(plaintext, &message_key)?;
        let receipt_cid = compute_cid(plaintext);

        let message_id = uuid::Uuid::new_v4().to_string();
        let identity = &self.device.identity;
        let sig = signature::sign_fields(
            &self.device.keys().signing,
            &SignedFields {
                receipt_cid: receipt_cid.as_str(),
                sender_did: &identity.did,
                sender_device_id: &identity.device_id,
                message_id: &message_id,
            },
        );

        let ephemeral = EphemeralKeyPair::generate();
        let mut wrapped_keys = BTreeMap::new();
        for r in recipients {
            let blob = key_wrap::wrap_for_recipient(&message_key, &ephemeral, &r.agreement_public)?;
            wrapped_keys.insert(r.device_id.clone(), STANDARD.encode(blob));
        }
        drop(ephemeral);
        drop(message_key);

        let mut recipient_dids: Vec<String> = Vec::new();
        for r in recipients {
            if !recipient_dids.contains(&r.did) {
                recipient_dids.push(r.did.clone());
            }
        }

        debug!(
            message_id = %message_id,
            receipt_cid = %receipt_cid,
            devices = wrapped_keys.len(),
            "Envelope sealed"
        );

        Ok(Envelope {
            message_id,
            receipt_cid: receipt_cid.to_string(),
            sender_did: identity.did.clone(),
            sender_device_id: identity.device_id.clone(),
            recipient_dids,
            encrypted_payload: STANDARD.encode(encrypted_payload),
            wrapped_keys,
            signature: STANDARD.encode(sig),
        })
    }
}

// ── Recipient ────────────────────────────────────────────────────────────────

/// Stages of envelope consumption, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecipientState {
    Received,
    LookupWrappedKey,
    UnwrapKey,
    DecryptPayload,
    VerifyCid,
    VerifySignature,
    Trusted,
}

impl RecipientState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "RECEIVED",
            Self::LookupWrappedKey => "LOOKUP_WRAPPED_KEY",
            Self::UnwrapKey => "UNWRAP_KEY",
            Self::DecryptPayload => "DECRYPT_PAYLOAD",
            Self::VerifyCid => "VERIFY_CID",
            Self::VerifySignature => "VERIFY_SIGNATURE",
            Self::Trusted => "TRUSTED",
        }
    }
}

impl std::fmt::Display for RecipientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal REJECTED state: the stage that failed and why.
#[derive(Debug, Error)]
#[error("Envelope rejected at {stage}: {error}")]
pub struct Rejection {
    pub stage: RecipientState,
    #[source]
    pub error: EnvelopeError,
}

impl Rejection {
    pub fn is_not_addressed(&self) -> bool {
        self.error.is_not_addressed()
    }

    pub fn is_integrity_failure(&self) -> bool {
        self.error.is_integrity_failure()
    }
}

trait OrReject<T> {
    fn or_reject(self, stage: RecipientState) -> Result<T, Rejection>;
}

impl<T, E: Into<EnvelopeError>> OrReject<T> for Result<T, E> {
    fn or_reject(self, stage: RecipientState) -> Result<T, Rejection> {
        self.map_err(|e| {
            let error = e.into();
            if error.is_not_addressed() {
                debug!(stage = %stage, error = %error, "Envelope not addressed to this device");
            } else {
                warn!(stage = %stage, error = %error, "Envelope rejected");
            }
            Rejection { stage, error }
        })
    }
}

/// Plaintext that passed both the CID and the signature checks.
#[derive(Debug)]
pub struct TrustedMessage {
    pub message_id: String,
    pub receipt_cid: ReceiptCid,
    pub sender_did: String,
    pub sender_device_id: String,
    pub plaintext: Zeroizing<Vec<u8>>,
}

/// Plaintext whose CID matched but whose signature was only checked for
/// length, because no sender signing key was available.
#[derive(Debug)]
pub struct UnverifiedMessage {
    pub message_id: String,
    pub receipt_cid: ReceiptCid,
    pub sender_did: String,
    pub sender_device_id: String,
    pub plaintext: Zeroizing<Vec<u8>>,
}

/// Consumes envelopes on behalf of one local device.
pub struct Recipient<'a> {
    device: &'a Device,
}

impl<'a> Recipient<'a> {
    pub fn new(device: &'a Device) -> Self {
        Self { device }
    }

    /// Run the full state machine. `sender_signing_public` is the sender
    /// device's Ed25519 key from the roster.
    pub fn open(
        &self,
        envelope: &Envelope,
        sender_signing_public: &[u8; 32],
    ) -> Result<TrustedMessage, Rejection> {
        let plaintext = self.decrypt_verified(envelope)?;

        let stage = RecipientState::VerifySignature;
        self.enter(envelope, stage);
        let sig = envelope.signature_bytes().or_reject(stage)?;
        signature::verify_fields(&sig, sender_signing_public, &signed_fields(envelope))
            .or_reject(stage)?;

        self.enter(envelope, RecipientState::Trusted);
        Ok(TrustedMessage {
            message_id: envelope.message_id.clone(),
            receipt_cid: compute_cid(&plaintext),
            sender_did: envelope.sender_did.clone(),
            sender_device_id: envelope.sender_device_id.clone(),
            plaintext,
        })
    }

    /// Same as [`open`](Self::open) up to VERIFY_CID, then only checks that
    /// the signature decodes to 64 bytes. The result is never TRUSTED.
    pub fn open_unverified_sender(
        &self,
        envelope: &Envelope,
    ) -> Result<UnverifiedMessage, Rejection> {
        let plaintext = self.decrypt_verified(envelope)?;

        let stage = RecipientState::VerifySignature;
        self.enter(envelope, stage);
        let sig = envelope.signature_bytes().or_reject(stage)?;
        if sig.len() != SIGNATURE_LEN {
            return Err(EnvelopeError::InvalidSignatureEncoding(sig.len())).or_reject(stage);
        }

        Ok(UnverifiedMessage {
            message_id: envelope.message_id.clone(),
            receipt_cid: compute_cid(&plaintext),
            sender_did: envelope.sender_did.clone(),
            sender_device_id: envelope.sender_device_id.clone(),
            plaintext,
        })
    }

    /// RECEIVED through VERIFY_CID.
    fn decrypt_verified(&self, envelope: &Envelope) -> Result<Zeroizing<Vec<u8>>, Rejection> {
        use RecipientState::*;

        self.enter(envelope, Received);

        self.enter(envelope, LookupWrappedKey);
        let blob = envelope
            .wrapped_key_for(self.device.device_id())
            .or_reject(LookupWrappedKey)?;

        self.enter(envelope, UnwrapKey);
        let message_key = key_wrap::unwrap(&blob, self.device.keys().agreement.secret())
            .or_reject(UnwrapKey)?;

        self.enter(envelope, DecryptPayload);
        let ciphertext = envelope.encrypted_payload_bytes().or_reject(DecryptPayload)?;
        let plaintext = payload::decrypt(&ciphertext, &message_key).or_reject(DecryptPayload)?;
        drop(message_key);

        self.enter(envelope, VerifyCid);
        verify_cid(&envelope.receipt_cid, &plaintext).or_reject(VerifyCid)?;

        Ok(plaintext)
    }

    fn enter(&self, envelope: &Envelope, state: RecipientState) {
        debug!(
            message_id = %envelope.message_id,
            device_id = %self.device.device_id(),
            state = %state,
            "Envelope state"
        );
    }
}

fn signed_fields(envelope: &Envelope) -> SignedFields<'_> {
    SignedFields {
        receipt_cid: &envelope.receipt_cid,
        sender_did: &envelope.sender_did,
        sender_device_id: &envelope.sender_device_id,
        message_id: &envelope.message_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Device, Device, Device) {
        (
            Device::generate("did:buds:sender", "sender phone"),
            Device::generate("did:buds:alice", "alice phone"),
            Device::generate("did:buds:bob", "bob phone"),
        )
    }

    #[test]
    fn seal_rejects_empty_recipient_list() {
        let (s, _, _) = setup();
        assert!(matches!(
            Sender::new(&s).seal(b"hi", &[]),
            Err(EnvelopeError::NoRecipients)
        ));
    }

    #[test]
    fn seal_rejects_duplicate_device() {
        let (s, a, _) = setup();
        let r = a.as_recipient();
        assert!(matches!(
            Sender::new(&s).seal(b"hi", &[r.clone(), r]),
            Err(EnvelopeError::DuplicateRecipientDevice(_))
        ));
    }

    #[test]
    fn recipient_dids_are_deduplicated_in_order() {
        let (s, a, b) = setup();
        let a2 = Device::generate("did:buds:alice", "alice tablet");
        let env = Sender::new(&s)
            .seal(b"hi", &[a.as_recipient(), b.as_recipient(), a2.as_recipient()])
            .unwrap();
        assert_eq!(env.recipient_dids, vec!["did:buds:alice", "did:buds:bob"]);
        assert_eq!(env.wrapped_keys.len(), 3);
    }

    #[test]
    fn one_ephemeral_key_per_message() {
        let (s, a, b) = setup();
        let env = Sender::new(&s)
            .seal(b"hi", &[a.as_recipient(), b.as_recipient()])
            .unwrap();
        let blob_a = env.wrapped_key_for(a.device_id()).unwrap();
        let blob_b = env.wrapped_key_for(b.device_id()).unwrap();
        assert_eq!(blob_a.len(), key_wrap::BLOB_LEN);
        assert_eq!(blob_a[..32], blob_b[..32]);
        assert_ne!(blob_a[32..], blob_b[32..]);
    }

    #[test]
    fn trusted_after_all_checks() {
        let (s, a, _) = setup();
        let env = Sender::new(&s).seal(b"hello", &[a.as_recipient()]).unwrap();
        let msg = Recipient::new(&a)
            .open(&env, &s.public_keys().signing)
            .unwrap();
        assert_eq!(msg.plaintext.as_slice(), b"hello");
        assert_eq!(msg.sender_device_id, s.device_id());
    }

    #[test]
    fn rejection_reports_stage() {
        let (s, a, b) = setup();
        let env = Sender::new(&s).seal(b"hello", &[a.as_recipient()]).unwrap();
        let rejection = Recipient::new(&b)
            .open(&env, &s.public_keys().signing)
            .unwrap_err();
        assert_eq!(rejection.stage, RecipientState::LookupWrappedKey);
        assert!(rejection.is_not_addressed());
        assert!(!rejection.is_integrity_failure());
    }

    #[test]
    fn tampered_message_id_fails_signature() {
        let (s, a, _) = setup();
        let mut env = Sender::new(&s).seal(b"hello", &[a.as_recipient()]).unwrap();
        env.message_id = "replayed".into();
        let rejection = Recipient::new(&a)
            .open(&env, &s.public_keys().signing)
            .unwrap_err();
        assert_eq!(rejection.stage, RecipientState::VerifySignature);
        assert!(matches!(rejection.error, EnvelopeError::SignatureInvalid));
    }

    #[test]
    fn short_signature_is_encoding_error_without_sender_key() {
        let (s, a, _) = setup();
        let mut env = Sender::new(&s).seal(b"hello", &[a.as_recipient()]).unwrap();
        env.signature = STANDARD.encode([0u8; 63]);
        let rejection = Recipient::new(&a).open_unverified_sender(&env).unwrap_err();
        assert!(matches!(rejection.error, EnvelopeError::InvalidSignatureEncoding(63)));
    }

    #[test]
    fn state_order_matches_pipeline() {
        use RecipientState::*;
        let order = [
            Received,
            LookupWrappedKey,
            UnwrapKey,
            DecryptPayload,
            VerifyCid,
            VerifySignature,
            Trusted,
        ];
        assert!(order.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(VerifyCid.to_string(), "VERIFY_CID");
    }
}
