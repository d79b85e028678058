//! buds_proto — the Buds E2EE envelope and relay wire types
//!
//! - `device`    — device identity and recipient roster entries
//! - `envelope`  — the on-wire envelope exchanged with the relay
//! - `assembler` — sender (`Sender::seal`) and recipient (`Recipient::open`) flows
//! - `api`       — relay request/response bodies
//! - `error`     — `EnvelopeError`, one variant per failure kind

pub mod api;
pub mod assembler;
pub mod device;
pub mod envelope;
pub mod error;

pub use assembler::{
    Recipient, RecipientState, Rejection, Sender, TrustedMessage, UnverifiedMessage,
};
pub use device::{Device, DeviceIdentity, RecipientDevice};
pub use envelope::Envelope;
pub use error::EnvelopeError;
