use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Args;

pub const DEFAULT_RELAY_URL: &str = "http://127.0.0.1:8787";
pub const DEFAULT_INBOX_LIMIT: u32 = 50;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub base_url: String,
    pub bearer_token: String,
    pub inbox_limit: u32,
    pub request_timeout: Duration,
}

impl RelayConfig {
    pub fn new(base_url: impl Into<String>, bearer_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bearer_token: bearer_token.into(),
            inbox_limit: DEFAULT_INBOX_LIMIT,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Relay connection flags shared by the networked subcommands. Each flag
/// falls back to its environment variable.
#[derive(Args, Clone, Debug)]
pub struct RelayArgs {
    /// Relay base URL
    #[arg(long, env = "BUDS_RELAY_URL", default_value = DEFAULT_RELAY_URL)]
    pub relay_url: String,

    /// Bearer token sent with every relay request
    #[arg(long, env = "BUDS_RELAY_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Maximum envelopes fetched per inbox poll
    #[arg(long, env = "BUDS_INBOX_LIMIT", default_value_t = DEFAULT_INBOX_LIMIT)]
    pub inbox_limit: u32,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    pub timeout_secs: u64,
}

impl RelayArgs {
    /// Fails before any network traffic if no usable token was supplied.
    pub fn into_config(self) -> Result<RelayConfig> {
        let token = self
            .token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| anyhow!("relay token missing; pass --token or set BUDS_RELAY_TOKEN"))?;
        if !(self.relay_url.starts_with("http://") || self.relay_url.starts_with("https://")) {
            return Err(anyhow!("relay url must be http(s): {}", self.relay_url));
        }
        if self.inbox_limit == 0 {
            return Err(anyhow!("inbox limit must be at least 1"));
        }
        let mut config = RelayConfig::new(self.relay_url, token);
        config.inbox_limit = self.inbox_limit;
        config.request_timeout = Duration::from_secs(self.timeout_secs.max(1));
        Ok(config)
    }
}
