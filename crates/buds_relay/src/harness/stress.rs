//! Relay load generator.
//!
//! Phase 1 registers every simulated user in parallel, phase 2 seals and
//! sends real envelopes with bounded concurrency, phase 3 polls every inbox
//! on a fixed interval for a fixed duration.

use std::{
    fmt::Write,
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{bail, Result};
use buds_crypto::phone::{hash_phone_number, PhoneNormalization};
use buds_proto::{api::RegisterDeviceRequest, Device, RecipientDevice, Sender};
use rand::{seq::index, Rng, RngCore};
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{info, warn};

use crate::{
    client::RelayClient,
    metrics::{Metrics, Operation},
};

#[derive(Clone, Debug)]
pub struct StressOptions {
    pub users: usize,
    pub messages: usize,
    pub concurrency: usize,
    pub poll_duration: Duration,
    pub poll_interval: Duration,
    pub min_circle: usize,
    pub max_circle: usize,
    /// Plaintext bytes per message.
    pub payload_len: usize,
}

impl Default for StressOptions {
    fn default() -> Self {
        Self {
            users: 100,
            messages: 1000,
            concurrency: 10,
            poll_duration: Duration::from_secs(30),
            poll_interval: Duration::from_secs(5),
            min_circle: 2,
            max_circle: 12,
            payload_len: 672,
        }
    }
}

impl StressOptions {
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            bail!("concurrency must be at least 1");
        }
        if self.min_circle == 0 || self.min_circle > self.max_circle {
            bail!(
                "invalid circle bounds {}..={}",
                self.min_circle,
                self.max_circle
            );
        }
        if self.users < self.min_circle {
            bail!(
                "need at least {} users for a circle, got {}",
                self.min_circle,
                self.users
            );
        }
        Ok(())
    }
}

pub struct SimUser {
    pub device: Device,
    pub phone_hash: String,
}

/// `did:buds:test00000`, `+15550000000`, ... with digit-normalised hashes.
pub fn create_users(count: usize) -> Vec<SimUser> {
    (0..count)
        .map(|i| {
            let did = format!("did:buds:test{i:05}");
            let name = format!("Test Device {}", &did[did.len() - 5..]);
            SimUser {
                device: Device::generate(did, name),
                phone_hash: hash_phone_number(
                    &format!("+1555000{:04}", i % 10_000),
                    PhoneNormalization::NanpDigits,
                ),
            }
        })
        .collect()
}

pub struct StressReport {
    pub users: usize,
    pub registered: usize,
    pub register_elapsed: Duration,
    pub messages: usize,
    pub sent: usize,
    pub send_elapsed: Duration,
    pub polls: usize,
    pub poll_elapsed: Duration,
    pub metrics: Arc<Metrics>,
}

impl StressReport {
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Registered {}/{} users in {:.2}s",
            self.registered,
            self.users,
            self.register_elapsed.as_secs_f64()
        );
        let _ = writeln!(
            out,
            "Sent {}/{} messages in {:.2}s ({:.2} msg/s)",
            self.sent,
            self.messages,
            self.send_elapsed.as_secs_f64(),
            per_second(self.sent, self.send_elapsed)
        );
        let _ = writeln!(
            out,
            "Completed {} inbox polls in {:.2}s ({:.2} polls/s)",
            self.polls,
            self.poll_elapsed.as_secs_f64(),
            per_second(self.polls, self.poll_elapsed)
        );
        out.push_str(&self.metrics.render());
        out
    }
}

fn per_second(count: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}

pub async fn run(client: RelayClient, options: StressOptions) -> Result<StressReport> {
    options.validate()?;
    let metrics = Arc::new(Metrics::new());

    info!(users = options.users, "creating simulated users");
    let users = Arc::new(create_users(options.users));

    let start = Instant::now();
    let registered = register_all(&client, &users, &metrics).await;
    let register_elapsed = start.elapsed();
    info!(registered, users = users.len(), "registration phase done");

    let start = Instant::now();
    let sent = send_all(&client, &users, &metrics, &options).await;
    let send_elapsed = start.elapsed();
    info!(sent, messages = options.messages, "send phase done");

    let start = Instant::now();
    let polls = poll_all(&client, &users, &metrics, &options).await;
    let poll_elapsed = start.elapsed();
    info!(polls, "poll phase done");

    Ok(StressReport {
        users: users.len(),
        registered,
        register_elapsed,
        messages: options.messages,
        sent,
        send_elapsed,
        polls,
        poll_elapsed,
        metrics,
    })
}

async fn register_all(
    client: &RelayClient,
    users: &Arc<Vec<SimUser>>,
    metrics: &Arc<Metrics>,
) -> usize {
    let mut tasks = JoinSet::new();
    for idx in 0..users.len() {
        let (client, users, metrics) = (client.clone(), users.clone(), metrics.clone());
        tasks.spawn(async move {
            let user = &users[idx];
            let request = RegisterDeviceRequest::for_device(&user.device, user.phone_hash.clone());
            let started = Instant::now();
            let res = client.register_device(&request).await;
            metrics.record(Operation::Register, res.is_ok(), started.elapsed());
            if let Err(err) = &res {
                warn!(error = %err, did = %user.device.did(), "register failed");
            }
            res.is_ok()
        });
    }
    count_successes(tasks).await
}

async fn send_all(
    client: &RelayClient,
    users: &Arc<Vec<SimUser>>,
    metrics: &Arc<Metrics>,
    options: &StressOptions,
) -> usize {
    let semaphore = Arc::new(Semaphore::new(options.concurrency));
    let mut tasks = JoinSet::new();
    for _ in 0..options.messages {
        let (client, users, metrics) = (client.clone(), users.clone(), metrics.clone());
        let semaphore = semaphore.clone();
        let (min, max, payload_len) = (options.min_circle, options.max_circle, options.payload_len);
        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return false;
            };
            let (sender, circle, plaintext) = pick_circle(users.len(), min, max, payload_len);
            let recipients: Vec<RecipientDevice> =
                circle.iter().map(|&i| users[i].device.as_recipient()).collect();
            let envelope = match Sender::new(&users[sender].device).seal(&plaintext, &recipients) {
                Ok(envelope) => envelope,
                Err(err) => {
                    warn!(error = %err, "seal failed");
                    return false;
                }
            };

            let started = Instant::now();
            let res = client.send_message(&envelope).await;
            metrics.record(Operation::Send, res.is_ok(), started.elapsed());
            if let Err(err) = &res {
                warn!(error = %err, message_id = %envelope.message_id, "send failed");
            }
            res.is_ok()
        });
    }
    count_successes(tasks).await
}

/// Random sender, random circle of `min..=min(max, users)` distinct users
/// and a random plaintext.
fn pick_circle(
    users: usize,
    min: usize,
    max: usize,
    payload_len: usize,
) -> (usize, Vec<usize>, Vec<u8>) {
    let mut rng = rand::thread_rng();
    let sender = rng.gen_range(0..users);
    let size = rng.gen_range(min..=max.min(users));
    let circle = index::sample(&mut rng, users, size).into_vec();
    let mut plaintext = vec![0u8; payload_len];
    rng.fill_bytes(&mut plaintext);
    (sender, circle, plaintext)
}

async fn poll_all(
    client: &RelayClient,
    users: &Arc<Vec<SimUser>>,
    metrics: &Arc<Metrics>,
    options: &StressOptions,
) -> usize {
    let start = Instant::now();
    let mut polls = 0;
    while start.elapsed() < options.poll_duration {
        let mut tasks = JoinSet::new();
        for idx in 0..users.len() {
            let (client, users, metrics) = (client.clone(), users.clone(), metrics.clone());
            tasks.spawn(async move {
                let did = users[idx].device.did();
                let started = Instant::now();
                let res = client.poll_inbox(did, client.inbox_limit()).await;
                metrics.record(Operation::Inbox, res.is_ok(), started.elapsed());
                if let Err(err) = &res {
                    warn!(error = %err, did = %did, "inbox poll failed");
                }
                res.is_ok()
            });
        }
        count_successes(tasks).await;
        polls += users.len();

        tokio::select! {
            _ = tokio::time::sleep(options.poll_interval) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted; ending poll phase");
                break;
            }
        }
    }
    polls
}

async fn count_successes(mut tasks: JoinSet<bool>) -> usize {
    let mut ok = 0;
    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(true) => ok += 1,
            Ok(false) => {}
            Err(err) => warn!(error = %err, "harness task failed"),
        }
    }
    ok
}
