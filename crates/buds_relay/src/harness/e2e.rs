//! Single-device end-to-end check.
//!
//! A simulated device is registered under the operator's DID, a real device
//! sends to every device of that DID, and the simulated device opens the
//! first envelope that carries a wrapped key for it.

use anyhow::{anyhow, bail, Result};
use buds_crypto::phone::{hash_phone_number, PhoneNormalization};
use buds_proto::{api::RegisterDeviceRequest, Device, Envelope, Recipient};
use tracing::{info, warn};

use crate::client::RelayClient;

#[derive(Clone, Debug)]
pub struct E2eOptions {
    pub did: String,
    pub phone: String,
    pub normalization: PhoneNormalization,
    pub device_name: String,
    /// Block on stdin until the operator has sent from a real device.
    pub wait_for_operator: bool,
    /// Ed25519 key of the sending device, if known from the roster.
    pub sender_signing_key: Option<[u8; 32]>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verification {
    /// CID and signature both verified.
    Trusted,
    /// CID verified; signature only checked for length.
    IntegrityVerified,
}

impl Verification {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trusted => "trusted",
            Self::IntegrityVerified => "integrity-verified",
        }
    }
}

#[derive(Clone, Debug)]
pub struct E2eOutcome {
    pub device_id: String,
    pub message_id: String,
    pub receipt_cid: String,
    pub plaintext_len: usize,
    pub sender_did: String,
    pub sender_device_id: String,
    pub verification: Verification,
    pub deleted: bool,
}

pub async fn run(client: &RelayClient, options: E2eOptions) -> Result<E2eOutcome> {
    let phone_hash = hash_phone_number(&options.phone, options.normalization);
    let device = Device::generate(options.did.clone(), options.device_name.clone());
    let public = device.public_keys();
    info!(
        did = %device.did(),
        device_id = %device.device_id(),
        x25519 = %public.agreement_b64(),
        ed25519 = %public.signing_b64(),
        "simulated device created"
    );

    client
        .register_device(&RegisterDeviceRequest::for_device(&device, phone_hash))
        .await?;
    info!(device_id = %device.device_id(), "simulated device registered");

    if options.wait_for_operator {
        wait_for_enter().await?;
    }

    let inbox = client.poll_inbox(device.did(), client.inbox_limit()).await?;
    info!(count = inbox.count, fetched = inbox.messages.len(), "inbox polled");
    if inbox.messages.is_empty() {
        bail!("no messages in inbox for {}", device.did());
    }
    let envelope = find_addressed(&inbox.messages, device.device_id()).ok_or_else(|| {
        anyhow!(
            "none of {} messages carries a wrapped key for device {}; send a new message after registration",
            inbox.messages.len(),
            device.device_id()
        )
    })?;

    let recipient = Recipient::new(&device);
    let (plaintext_len, receipt_cid, verification) = match options.sender_signing_key {
        Some(key) => {
            let msg = recipient.open(envelope, &key)?;
            (msg.plaintext.len(), msg.receipt_cid.to_string(), Verification::Trusted)
        }
        None => {
            let msg = recipient.open_unverified_sender(envelope)?;
            (
                msg.plaintext.len(),
                msg.receipt_cid.to_string(),
                Verification::IntegrityVerified,
            )
        }
    };

    let deleted = match client.delete_message(&envelope.message_id).await {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %err, message_id = %envelope.message_id, "delete failed");
            false
        }
    };

    Ok(E2eOutcome {
        device_id: device.device_id().to_string(),
        message_id: envelope.message_id.clone(),
        receipt_cid,
        plaintext_len,
        sender_did: envelope.sender_did.clone(),
        sender_device_id: envelope.sender_device_id.clone(),
        verification,
        deleted,
    })
}

/// First envelope in inbox order that is addressed to `device_id`.
pub fn find_addressed<'a>(messages: &'a [Envelope], device_id: &str) -> Option<&'a Envelope> {
    messages.iter().find(|m| m.is_addressed_to(device_id))
}

async fn wait_for_enter() -> Result<()> {
    println!("Send a message from your real device to this DID, then press Enter...");
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| ())
    })
    .await??;
    Ok(())
}
