use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use buds_proto::{
    api::{InboxQuery, RegisterDeviceRequest},
    Device, Envelope, Recipient, RecipientDevice, Sender,
};
use buds_relay::{
    harness::{
        e2e::{self, E2eOptions, Verification},
        stress::{self, StressOptions},
    },
    metrics::Operation,
    RelayClient, RelayConfig, RelayStatusError,
};
use buds_crypto::{phone::PhoneNormalization, DevicePublicKeys};

const TOKEN: &str = "test-token";

#[derive(Default)]
struct Store {
    devices: Vec<RegisterDeviceRequest>,
    messages: Vec<Envelope>,
    /// Records served ahead of `messages` on every inbox poll, as-is.
    raw: Vec<serde_json::Value>,
}

/// In-process stand-in for the relay. When `auto_sender` is set, every
/// registration is answered by sealing `b"hello"` to the new device.
#[derive(Clone)]
struct FakeRelay {
    store: Arc<Mutex<Store>>,
    auto_sender: Option<Arc<Device>>,
}

impl FakeRelay {
    fn new(auto_sender: Option<Device>) -> Self {
        Self {
            store: Arc::new(Mutex::new(Store::default())),
            auto_sender: auto_sender.map(Arc::new),
        }
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {TOKEN}"))
        .unwrap_or(false)
}

async fn register(
    State(relay): State<FakeRelay>,
    headers: HeaderMap,
    Json(req): Json<RegisterDeviceRequest>,
) -> (StatusCode, String) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "x".repeat(300));
    }
    if let Some(sender) = &relay.auto_sender {
        let keys = DevicePublicKeys::from_b64(&req.pubkey_x25519, &req.pubkey_ed25519).unwrap();
        let recipient = RecipientDevice {
            did: req.owner_did.clone(),
            device_id: req.device_id.clone(),
            agreement_public: keys.agreement,
        };
        let envelope = Sender::new(sender).seal(b"hello", &[recipient]).unwrap();
        relay.store.lock().unwrap().messages.push(envelope);
    }
    relay.store.lock().unwrap().devices.push(req);
    (StatusCode::CREATED, r#"{"success":true}"#.into())
}

async fn send(
    State(relay): State<FakeRelay>,
    headers: HeaderMap,
    Json(envelope): Json<Envelope>,
) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    relay.store.lock().unwrap().messages.push(envelope);
    StatusCode::CREATED
}

async fn inbox(
    State(relay): State<FakeRelay>,
    headers: HeaderMap,
    Query(q): Query<InboxQuery>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let store = relay.store.lock().unwrap();
    let matching: Vec<serde_json::Value> = store
        .raw
        .iter()
        .cloned()
        .chain(
            store
                .messages
                .iter()
                .filter(|m| m.recipient_dids.contains(&q.did))
                .map(|m| serde_json::to_value(m).unwrap()),
        )
        .collect();
    Ok(Json(serde_json::json!({
        "count": matching.len(),
        "messages": matching.into_iter().take(q.limit as usize).collect::<Vec<_>>(),
    })))
}

async fn delete_message(
    State(relay): State<FakeRelay>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    let mut store = relay.store.lock().unwrap();
    let before = store.messages.len();
    store.messages.retain(|m| m.message_id != id);
    if store.messages.len() < before {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn spawn_relay(relay: FakeRelay) -> String {
    let app = Router::new()
        .route("/api/devices/register", post(register))
        .route("/api/messages/send", post(send))
        .route("/api/messages/inbox", get(inbox))
        .route("/api/messages/:id", delete(delete_message))
        .with_state(relay);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn client(base_url: &str, token: &str) -> RelayClient {
    let mut config = RelayConfig::new(base_url, token);
    config.request_timeout = Duration::from_secs(5);
    RelayClient::new(&config).unwrap()
}

fn e2e_options(did: &str, sender_signing_key: Option<[u8; 32]>) -> E2eOptions {
    E2eOptions {
        did: did.into(),
        phone: "+16504458988".into(),
        normalization: PhoneNormalization::AsIs,
        device_name: "Test Device B".into(),
        wait_for_operator: false,
        sender_signing_key,
    }
}

#[tokio::test]
async fn register_send_poll_delete() {
    let relay = FakeRelay::new(None);
    let url = spawn_relay(relay.clone()).await;
    let client = client(&url, TOKEN);

    let sender = Device::generate("did:buds:alice", "alice phone");
    let bob = Device::generate("did:buds:bob", "bob phone");
    client
        .register_device(&RegisterDeviceRequest::for_device(&bob, "hash"))
        .await
        .unwrap();
    assert_eq!(relay.store.lock().unwrap().devices[0].device_id, bob.device_id());

    let envelope = Sender::new(&sender)
        .seal(b"hello", &[bob.as_recipient()])
        .unwrap();
    client.send_message(&envelope).await.unwrap();

    let inbox = client.poll_inbox(bob.did(), 50).await.unwrap();
    assert_eq!(inbox.count, 1);
    let msg = Recipient::new(&bob)
        .open(&inbox.messages[0], &sender.public_keys().signing)
        .unwrap();
    assert_eq!(msg.plaintext.as_slice(), b"hello");

    client.delete_message(&envelope.message_id).await.unwrap();
    assert!(client.poll_inbox(bob.did(), 50).await.unwrap().messages.is_empty());

    let err = client.delete_message(&envelope.message_id).await.unwrap_err();
    let status = err.downcast_ref::<RelayStatusError>().unwrap();
    assert_eq!(status.operation, "delete");
    assert_eq!(status.status.as_u16(), 404);
}

#[tokio::test]
async fn delete_sends_message_id_as_one_path_segment() {
    let relay = FakeRelay::new(None);
    let url = spawn_relay(relay.clone()).await;
    let client = client(&url, TOKEN);
    let sender = Device::generate("did:buds:alice", "a");
    let bob = Device::generate("did:buds:bob", "b");

    let mut odd = Sender::new(&sender).seal(b"x", &[bob.as_recipient()]).unwrap();
    odd.message_id = "a/b?c".into();
    relay.store.lock().unwrap().messages.push(odd);
    client.delete_message("a/b?c").await.unwrap();
    assert!(relay.store.lock().unwrap().messages.is_empty());

    client
        .register_device(&RegisterDeviceRequest::for_device(&bob, "hash"))
        .await
        .unwrap();
    let err = client.delete_message("../devices/register").await.unwrap_err();
    let status = err.downcast_ref::<RelayStatusError>().unwrap();
    assert_eq!(status.operation, "delete");
    assert_eq!(status.status.as_u16(), 404);
    assert_eq!(relay.store.lock().unwrap().devices.len(), 1);
}

#[tokio::test]
async fn malformed_inbox_record_is_skipped() {
    let relay = FakeRelay::new(None);
    let url = spawn_relay(relay.clone()).await;
    let client = client(&url, TOKEN);
    let sender = Device::generate("did:buds:alice", "a");
    let bob = Device::generate("did:buds:bob", "b");

    let envelope = Sender::new(&sender).seal(b"hello", &[bob.as_recipient()]).unwrap();
    let mut broken = serde_json::to_value(&envelope).unwrap();
    broken.as_object_mut().unwrap().remove("recipient_dids");
    {
        let mut store = relay.store.lock().unwrap();
        store.raw = vec![broken, serde_json::json!({ "message_id": 7 })];
        store.messages.push(envelope.clone());
    }

    let inbox = client.poll_inbox(bob.did(), 50).await.unwrap();
    assert_eq!(inbox.count, 3);
    assert_eq!(inbox.messages.len(), 1);
    assert_eq!(inbox.messages[0].message_id, envelope.message_id);
}

#[tokio::test]
async fn e2e_survives_malformed_inbox_record() {
    let sender = Device::generate("did:buds:owner", "real phone");
    let signing = sender.public_keys().signing;
    let relay = FakeRelay::new(Some(sender));
    relay.store.lock().unwrap().raw = vec![serde_json::json!({
        "message_id": "legacy",
        "receipt_cid": "bafy",
    })];
    let url = spawn_relay(relay.clone()).await;

    let outcome = e2e::run(&client(&url, TOKEN), e2e_options("did:buds:owner", Some(signing)))
        .await
        .unwrap();
    assert_eq!(outcome.verification, Verification::Trusted);
    assert!(outcome.deleted);
}

#[tokio::test]
async fn inbox_respects_limit() {
    let relay = FakeRelay::new(None);
    let url = spawn_relay(relay).await;
    let client = client(&url, TOKEN);
    let sender = Device::generate("did:buds:alice", "a");
    let bob = Device::generate("did:buds:bob", "b");
    for _ in 0..3 {
        let env = Sender::new(&sender).seal(b"x", &[bob.as_recipient()]).unwrap();
        client.send_message(&env).await.unwrap();
    }
    let inbox = client.poll_inbox(bob.did(), 2).await.unwrap();
    assert_eq!(inbox.count, 3);
    assert_eq!(inbox.messages.len(), 2);
}

#[tokio::test]
async fn bad_token_error_carries_status_and_truncated_body() {
    let url = spawn_relay(FakeRelay::new(None)).await;
    let client = client(&url, "wrong");
    let device = Device::generate("did:buds:x", "x");
    let err = client
        .register_device(&RegisterDeviceRequest::for_device(&device, "hash"))
        .await
        .unwrap_err();
    let status = err.downcast_ref::<RelayStatusError>().unwrap();
    assert_eq!(status.status.as_u16(), 401);
    assert_eq!(status.body.len(), 100);
    assert!(err.to_string().starts_with("register failed: 401"));
}

#[tokio::test]
async fn e2e_trusts_message_with_known_sender_key() {
    let sender = Device::generate("did:buds:owner", "real phone");
    let signing = sender.public_keys().signing;
    let relay = FakeRelay::new(Some(sender));
    let url = spawn_relay(relay.clone()).await;

    let outcome = e2e::run(&client(&url, TOKEN), e2e_options("did:buds:owner", Some(signing)))
        .await
        .unwrap();
    assert_eq!(outcome.verification, Verification::Trusted);
    assert_eq!(outcome.plaintext_len, 5);
    assert!(outcome.deleted);
    assert_eq!(
        outcome.receipt_cid,
        "bafyreibm6jg3ux5qumhcn2b3flc3tyu6dmlb4xa7u5bf44yegnrjhc4yeq"
    );

    let store = relay.store.lock().unwrap();
    assert!(store.messages.is_empty());
    assert_eq!(
        store.devices[0].owner_phone_hash,
        "97fb6b3f55e6df023c0599896ef475162468f0f2acd08a7ebc9999552aa141ab"
    );
}

#[tokio::test]
async fn e2e_without_sender_key_is_integrity_verified_only() {
    let sender = Device::generate("did:buds:owner", "real phone");
    let url = spawn_relay(FakeRelay::new(Some(sender))).await;

    let outcome = e2e::run(&client(&url, TOKEN), e2e_options("did:buds:owner", None))
        .await
        .unwrap();
    assert_eq!(outcome.verification, Verification::IntegrityVerified);
    assert_eq!(outcome.verification.as_str(), "integrity-verified");
}

#[tokio::test]
async fn e2e_rejects_wrong_sender_key() {
    let sender = Device::generate("did:buds:owner", "real phone");
    let impostor = Device::generate("did:buds:owner", "other");
    let url = spawn_relay(FakeRelay::new(Some(sender))).await;

    let err = e2e::run(
        &client(&url, TOKEN),
        e2e_options("did:buds:owner", Some(impostor.public_keys().signing)),
    )
    .await
    .unwrap_err();
    assert!(err.to_string().contains("VERIFY_SIGNATURE"));
}

#[tokio::test]
async fn e2e_skips_messages_for_other_devices() {
    let relay = FakeRelay::new(None);
    let url = spawn_relay(relay.clone()).await;
    let sender = Device::generate("did:buds:alice", "a");
    let old_device = Device::generate("did:buds:owner", "old");
    let stale = Sender::new(&sender)
        .seal(b"old", &[old_device.as_recipient()])
        .unwrap();
    relay.store.lock().unwrap().messages.push(stale);

    let err = e2e::run(&client(&url, TOKEN), e2e_options("did:buds:owner", None))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("wrapped key"));
}

#[tokio::test]
async fn stress_run_registers_sends_and_polls() {
    let relay = FakeRelay::new(None);
    let url = spawn_relay(relay.clone()).await;
    let options = StressOptions {
        users: 4,
        messages: 12,
        concurrency: 3,
        poll_duration: Duration::from_millis(150),
        poll_interval: Duration::from_millis(50),
        min_circle: 2,
        max_circle: 3,
        payload_len: 64,
    };

    let report = stress::run(client(&url, TOKEN), options).await.unwrap();
    assert_eq!(report.registered, 4);
    assert_eq!(report.sent, 12);
    assert!(report.polls >= 4);
    assert_eq!(report.metrics.counts(Operation::Send).success, 12);
    assert_eq!(report.metrics.counts(Operation::Inbox).failed, 0);
    assert!(report.render().contains("Sent 12/12 messages"));

    let store = relay.store.lock().unwrap();
    assert_eq!(store.devices.len(), 4);
    assert_eq!(store.messages.len(), 12);
    for m in &store.messages {
        assert!((2..=3).contains(&m.wrapped_keys.len()));
        assert_eq!(m.recipient_dids.len(), m.wrapped_keys.len());
    }
}
