//! Phone-number hashing for identity correlation with the relay.
//!
//! The relay compares `owner_phone_hash` against its own hash of the phone
//! number in the caller's identity token. The byte string hashed here must
//! match the provider's representation exactly or correlation silently
//! fails, so normalisation is always an explicit choice of the caller.

use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhoneNormalization {
    /// Hash the string exactly as given (including any leading `+`).
    #[default]
    AsIs,
    /// Keep digits only; prefix `1` when exactly ten digits remain.
    NanpDigits,
}

/// SHA-256 of the (optionally normalised) UTF-8 phone string, lowercase hex.
pub fn hash_phone_number(phone: &str, normalization: PhoneNormalization) -> String {
    let canonical = match normalization {
        PhoneNormalization::AsIs => phone.to_string(),
        PhoneNormalization::NanpDigits => {
            let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
            if digits.len() == 10 {
                format!("1{digits}")
            } else {
                digits
            }
        }
    };
    hex::encode(Sha256::digest(canonical.as_bytes()))
}
