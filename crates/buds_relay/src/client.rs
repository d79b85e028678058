use anyhow::{anyhow, Result};
use buds_proto::{
    api::{InboxResponse, RegisterDeviceRequest},
    Envelope,
};
use reqwest::{Response, StatusCode, Url};
use thiserror::Error;
use tracing::debug;

use crate::config::RelayConfig;

const ERROR_BODY_LIMIT: usize = 100;

/// A relay call answered with an unexpected status.
#[derive(Debug, Error)]
#[error("{operation} failed: {status} - {body}")]
pub struct RelayStatusError {
    pub operation: &'static str,
    pub status: StatusCode,
    pub body: String,
}

/// Thin async client for the relay HTTP API. One attempt per call.
#[derive(Clone)]
pub struct RelayClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    inbox_limit: u32,
}

impl RelayClient {
    pub fn new(config: &RelayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("buds-harness/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            token: config.bearer_token.clone(),
            inbox_limit: config.inbox_limit,
        })
    }

    pub fn inbox_limit(&self) -> u32 {
        self.inbox_limit
    }

    /// Join `segments` onto the base URL, percent-encoding each one so a
    /// `/` or `?` inside an identifier cannot change the route.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        if let Some(bad) = segments.iter().find(|s| matches!(**s, "" | "." | "..")) {
            return Err(anyhow!("invalid path segment: {bad:?}"));
        }
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| anyhow!("relay url cannot carry a path: {}", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub async fn register_device(&self, request: &RegisterDeviceRequest) -> Result<()> {
        let url = self.endpoint(&["api", "devices", "register"])?;
        let res = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await?;
        expect_status(res, StatusCode::CREATED, "register").await?;
        debug!(device_id = %request.device_id, "device registered");
        Ok(())
    }

    pub async fn send_message(&self, envelope: &Envelope) -> Result<()> {
        let url = self.endpoint(&["api", "messages", "send"])?;
        let res = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(envelope)
            .send()
            .await?;
        expect_status(res, StatusCode::CREATED, "send").await?;
        debug!(message_id = %envelope.message_id, "envelope sent");
        Ok(())
    }

    pub async fn poll_inbox(&self, did: &str, limit: u32) -> Result<InboxResponse> {
        let url = self.endpoint(&["api", "messages", "inbox"])?;
        let limit = limit.to_string();
        let res = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .query(&[("did", did), ("limit", limit.as_str())])
            .send()
            .await?;
        let res = expect_status(res, StatusCode::OK, "inbox").await?;
        let inbox: InboxResponse = res.json().await?;
        debug!(did = %did, count = inbox.count, fetched = inbox.messages.len(), "inbox polled");
        Ok(inbox)
    }

    pub async fn delete_message(&self, message_id: &str) -> Result<()> {
        let url = self.endpoint(&["api", "messages", message_id])?;
        let res = self
            .client
            .delete(url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        expect_status(res, StatusCode::OK, "delete").await?;
        Ok(())
    }
}

async fn expect_status(
    res: Response,
    expected: StatusCode,
    operation: &'static str,
) -> Result<Response> {
    if res.status() == expected {
        return Ok(res);
    }
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    Err(RelayStatusError {
        operation,
        status,
        body: body.chars().take(ERROR_BODY_LIMIT).collect(),
    }
    .into())
}
