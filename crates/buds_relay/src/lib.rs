//! buds_relay — relay client and harnesses for the Buds E2EE envelope
//!
//! - `config`  — relay URL / token / limits from env and CLI flags
//! - `client`  — async HTTP client for the relay API
//! - `metrics` — per-operation counters and latency percentiles
//! - `harness` — single-device end-to-end check and load generator

pub mod client;
pub mod config;
pub mod harness;
pub mod metrics;

pub use client::{RelayClient, RelayStatusError};
pub use config::{RelayArgs, RelayConfig};
