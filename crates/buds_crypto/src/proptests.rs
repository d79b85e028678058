use proptest::prelude::*;
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

use crate::{
    agreement::derive_kek,
    cid::{compute_cid, verify_cid},
    error::CryptoError,
    key_wrap,
    payload::{self, MessageKey},
};

fn wrapped_for(recipient: &StaticSecret, key: &MessageKey) -> Vec<u8> {
    let ephemeral = StaticSecret::random_from_rng(OsRng);
    let ephemeral_public = *X25519Public::from(&ephemeral).as_bytes();
    let kek = derive_kek(&ephemeral, X25519Public::from(recipient).as_bytes()).unwrap();
    key_wrap::wrap(key, &kek, &ephemeral_public).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn payload_roundtrip(plaintext in any::<Vec<u8>>()) {
        let key = MessageKey::generate();
        let blob = payload::encrypt(&plaintext, &key).unwrap();
        let opened = payload::decrypt(&blob, &key).unwrap();
        prop_assert_eq!(opened.as_slice(), plaintext.as_slice());
    }

    #[test]
    fn wrap_roundtrip(key_bytes in any::<[u8; 32]>(), secret in any::<[u8; 32]>()) {
        let recipient = StaticSecret::from(secret);
        let key = MessageKey::from_bytes(key_bytes);
        let blob = wrapped_for(&recipient, &key);
        let unwrapped = key_wrap::unwrap(&blob, &recipient).unwrap();
        prop_assert_eq!(unwrapped.as_bytes(), key.as_bytes());
    }

    #[test]
    fn payload_bit_flip_is_detected(plaintext in any::<Vec<u8>>(), bit in any::<usize>()) {
        let key = MessageKey::generate();
        let mut blob = payload::encrypt(&plaintext, &key).unwrap();
        let bit = bit % (blob.len() * 8);
        blob[bit / 8] ^= 1 << (bit % 8);
        prop_assert!(matches!(
            payload::decrypt(&blob, &key),
            Err(CryptoError::PayloadDecryptFailed)
        ));
    }

    #[test]
    fn wrapped_key_bit_flip_is_detected(bit in 0usize..(key_wrap::BLOB_LEN * 8)) {
        let recipient = StaticSecret::random_from_rng(OsRng);
        let mut blob = wrapped_for(&recipient, &MessageKey::generate());
        blob[bit / 8] ^= 1 << (bit % 8);
        prop_assert!(matches!(
            key_wrap::unwrap(&blob, &recipient),
            Err(CryptoError::KeyUnwrapFailed)
        ));
    }

    #[test]
    fn cid_is_deterministic_and_binding(a in any::<Vec<u8>>(), b in any::<Vec<u8>>()) {
        let cid = compute_cid(&a);
        let again = compute_cid(&a);
        prop_assert_eq!(&cid, &again);
        prop_assert!(verify_cid(cid.as_str(), &a).is_ok());
        if a != b {
            prop_assert!(verify_cid(cid.as_str(), &b).is_err());
        }
    }
}
