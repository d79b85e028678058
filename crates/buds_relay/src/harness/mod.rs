//! Harnesses that drive a live relay.
//!
//! - `e2e`    — simulated recipient device for a real sender
//! - `stress` — many simulated users sealing and polling in parallel

pub mod e2e;
pub mod stress;
