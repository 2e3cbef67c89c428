//! Blocking HTTP seam.
//!
//! The client only needs "send this, give me status + bytes"; keeping that
//! behind a trait lets retry and offline behaviour run against scripted fakes.
use anyhow::{Context, Result};
use serde_json::Value;
use std::time::Duration;

/// Response bodies larger than this are rejected by the live transport.
const MAX_BODY_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum HttpRequest {
    Get {
        url: String,
        query: Vec<(String, String)>,
    },
    PostJson {
        url: String,
        body: Value,
    },
}

impl HttpRequest {
    pub fn url(&self) -> &str {
        match self {
            HttpRequest::Get { url, .. } | HttpRequest::PostJson { url, .. } => url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Performs one HTTP exchange. Non-2xx statuses are replies, not errors;
/// `Err` means the exchange itself failed (DNS, connect, timeout, read).
pub trait Transport: Send + Sync {
    fn send(&self, request: &HttpRequest) -> Result<HttpReply>;
}

pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: config.into(),
        }
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpReply> {
        let response = match request {
            HttpRequest::Get { url, query } => self
                .agent
                .get(url)
                .query_pairs(query.iter().map(|(k, v)| (k.as_str(), v.as_str())))
                .call(),
            HttpRequest::PostJson { url, body } => self.agent.post(url).send_json(body),
        };
        let mut response = response.with_context(|| format!("send request to {}", request.url()))?;
        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .with_config()
            .limit(MAX_BODY_BYTES)
            .read_to_vec()
            .with_context(|| format!("read response body from {}", request.url()))?;
        Ok(HttpReply { status, body })
    }
}
