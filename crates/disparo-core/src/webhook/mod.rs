//! Webhook delivery
//!
//! Payloads are delivered through a [`TransportChain`]: a direct POST,
//! then each configured relay in order. Components depend on the
//! [`WebhookSender`] seam rather than on the chain itself.

mod chain;
mod transport;

pub use chain::TransportChain;
pub use transport::{DirectTransport, RelayTransport, Transport, TransportError, TransportResponse};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// Alternate endpoint offered to operators after a failed delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub url: String,
    pub message: String,
}

/// Result of one delivery through the chain
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryOutcome {
    pub success: bool,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub method_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<Suggestion>,
}

impl DeliveryOutcome {
    pub fn failure(status: Option<u16>, error: String, suggestion: Option<Suggestion>) -> Self {
        Self {
            success: false,
            status,
            error: Some(error),
            method_used: None,
            suggestion,
        }
    }
}

/// Something that can deliver a JSON payload to a URL
#[async_trait]
pub trait WebhookSender: Send + Sync {
    async fn deliver(&self, url: &str, payload: &Value) -> DeliveryOutcome;
}
