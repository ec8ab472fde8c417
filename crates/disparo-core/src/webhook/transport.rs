//! Transport strategies for webhook delivery

use async_trait::async_trait;
use disparo_common::config::{RelayConfig, RelayKind};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Transport failure
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid webhook URL: {0}")]
    InvalidUrl(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TransportError {
    /// HTTP status carried by the failure, if the endpoint answered
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            TransportError::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// A 4xx answer means the endpoint rejected the payload, not the transport
    pub fn is_client_error(&self) -> bool {
        matches!(self.status(), Some(status) if (400..500).contains(&status))
    }
}

/// Successful transport response
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// A single delivery strategy
#[async_trait]
pub trait Transport: Send + Sync {
    /// Name reported as `method_used`
    fn name(&self) -> &str;

    /// One best-effort POST of `payload` towards `url`
    async fn attempt(&self, url: &str, payload: &Value)
        -> Result<TransportResponse, TransportError>;
}

async fn finish(response: reqwest::Response) -> Result<TransportResponse, TransportError> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if !status.is_success() {
        return Err(TransportError::Status {
            status: status.as_u16(),
            body,
        });
    }

    Ok(TransportResponse {
        status: status.as_u16(),
        body,
    })
}

/// Direct POST to the target URL
pub struct DirectTransport {
    client: Client,
}

impl DirectTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for DirectTransport {
    fn name(&self) -> &str {
        "direct"
    }

    async fn attempt(
        &self,
        url: &str,
        payload: &Value,
    ) -> Result<TransportResponse, TransportError> {
        let body = serde_json::to_vec(payload)?;

        debug!("POST {} ({} bytes)", url, body.len());

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        finish(response).await
    }
}

/// POST through an intermediary relay
pub struct RelayTransport {
    name: String,
    kind: RelayKind,
    base_url: String,
    param: String,
    client: Client,
}

impl RelayTransport {
    pub fn new(config: &RelayConfig, client: Client) -> Self {
        Self {
            name: config.name.clone(),
            kind: config.kind,
            base_url: config.base_url.clone(),
            param: config.param.clone(),
            client,
        }
    }

    /// URL the relay is called with for a prefix relay
    fn prefixed(&self, url: &str) -> String {
        format!("{}{}", self.base_url, url)
    }
}

#[async_trait]
impl Transport for RelayTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(
        &self,
        url: &str,
        payload: &Value,
    ) -> Result<TransportResponse, TransportError> {
        let body = serde_json::to_vec(payload)?;

        let request = match self.kind {
            RelayKind::Prefix => self.client.post(self.prefixed(url)),
            RelayKind::Query => self
                .client
                .post(&self.base_url)
                .query(&[(self.param.as_str(), url)]),
        };

        debug!("POST {} via relay {}", url, self.name);

        let response = request
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        finish(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_relay_target() {
        let relay = RelayTransport::new(
            &RelayConfig {
                name: "cors-proxy".to_string(),
                kind: RelayKind::Prefix,
                base_url: "https://relay.example.com/".to_string(),
                param: "url".to_string(),
            },
            Client::new(),
        );

        assert_eq!(
            relay.prefixed("https://hooks.example.com/webhook/abc"),
            "https://relay.example.com/https://hooks.example.com/webhook/abc"
        );
    }

    #[test]
    fn test_client_error_classification() {
        let not_found = TransportError::Status {
            status: 404,
            body: String::new(),
        };
        let unavailable = TransportError::Status {
            status: 503,
            body: String::new(),
        };

        assert!(not_found.is_client_error());
        assert!(!unavailable.is_client_error());
        assert!(!TransportError::InvalidUrl("x".to_string()).is_client_error());
    }
}
