//! Ordered fallback chain of transports

use super::transport::{DirectTransport, RelayTransport, Transport, TransportError};
use super::{DeliveryOutcome, Suggestion, WebhookSender};
use async_trait::async_trait;
use disparo_common::config::WebhookConfig;
use reqwest::{Client, Url};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Path segment of production automation webhooks
const PRODUCTION_WEBHOOK_SEGMENT: &str = "/webhook/";
/// Path segment of the matching test webhooks
const TEST_WEBHOOK_SEGMENT: &str = "/webhook-test/";

/// Direct delivery followed by configured relays, first success wins
pub struct TransportChain {
    transports: Vec<Box<dyn Transport>>,
}

impl TransportChain {
    /// Build a chain from explicit transports
    pub fn new(transports: Vec<Box<dyn Transport>>) -> Self {
        Self { transports }
    }

    /// Direct transport plus every configured relay, sharing one HTTP client
    pub fn from_config(config: &WebhookConfig) -> Result<Self, TransportError> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build()?;

        let mut transports: Vec<Box<dyn Transport>> =
            vec![Box::new(DirectTransport::new(client.clone()))];
        for relay in &config.relays {
            transports.push(Box::new(RelayTransport::new(relay, client.clone())));
        }

        Ok(Self::new(transports))
    }

    /// Transport names in attempt order
    pub fn names(&self) -> Vec<&str> {
        self.transports.iter().map(|t| t.name()).collect()
    }

    /// Try each transport in order, short-circuiting on the first success
    pub async fn deliver(&self, url: &str, payload: &Value) -> DeliveryOutcome {
        if let Err(e) = validate_url(url) {
            warn!("Refusing webhook delivery: {}", e);
            return DeliveryOutcome::failure(None, e.to_string(), None);
        }

        let mut last_error: Option<TransportError> = None;

        for transport in &self.transports {
            match transport.attempt(url, payload).await {
                Ok(response) => {
                    info!(
                        "Webhook delivered to {} via {} (HTTP {})",
                        url,
                        transport.name(),
                        response.status
                    );
                    return DeliveryOutcome {
                        success: true,
                        status: Some(response.status),
                        error: None,
                        method_used: Some(transport.name().to_string()),
                        suggestion: None,
                    };
                }
                Err(e) => {
                    warn!("Webhook delivery to {} via {} failed: {}", url, transport.name(), e);
                    last_error = Some(e);
                }
            }
        }

        let Some(error) = last_error else {
            return DeliveryOutcome::failure(None, "No transports configured".to_string(), None);
        };

        let suggestion = suggest_alternate(url, &error);
        if let Some(s) = &suggestion {
            debug!("Suggesting alternate endpoint {}", s.url);
        }

        DeliveryOutcome::failure(error.status(), error.to_string(), suggestion)
    }
}

#[async_trait]
impl WebhookSender for TransportChain {
    async fn deliver(&self, url: &str, payload: &Value) -> DeliveryOutcome {
        TransportChain::deliver(self, url, payload).await
    }
}

/// Non-empty, absolute, http(s)
fn validate_url(url: &str) -> Result<(), TransportError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(TransportError::InvalidUrl("empty URL".to_string()));
    }

    let parsed =
        Url::parse(trimmed).map_err(|e| TransportError::InvalidUrl(format!("{}: {}", trimmed, e)))?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(TransportError::InvalidUrl(format!(
            "unsupported scheme '{}' in {}",
            scheme, trimmed
        ))),
    }
}

/// Production automation webhooks that fail at the transport level often
/// only have their test endpoint listening.
fn suggest_alternate(url: &str, error: &TransportError) -> Option<Suggestion> {
    if error.is_client_error() || !url.contains(PRODUCTION_WEBHOOK_SEGMENT) {
        return None;
    }

    Some(Suggestion {
        url: url.replacen(PRODUCTION_WEBHOOK_SEGMENT, TEST_WEBHOOK_SEGMENT, 1),
        message: "Production webhook unreachable; if the workflow is not active, \
                  try the test webhook URL while the editor is listening"
            .to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use disparo_common::config::{RelayConfig, RelayKind};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chain_with_query_relay(relay_base: String) -> TransportChain {
        TransportChain::from_config(&WebhookConfig {
            timeout_secs: Some(5),
            relays: vec![RelayConfig {
                name: "relay".to_string(),
                kind: RelayKind::Query,
                base_url: relay_base,
                param: "url".to_string(),
            }],
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_direct_delivery_short_circuits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({"event": "ping"})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(path("/relay"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let chain = chain_with_query_relay(format!("{}/relay", server.uri()));
        let outcome = chain
            .deliver(&format!("{}/hook", server.uri()), &json!({"event": "ping"}))
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.status, Some(200));
        assert_eq!(outcome.method_used.as_deref(), Some("direct"));
    }

    #[tokio::test]
    async fn test_falls_back_to_relay_on_server_error() {
        let server = MockServer::start().await;
        let target = format!("{}/hook", server.uri());

        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(502))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/relay"))
            .and(query_param("url", target.as_str()))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let chain = chain_with_query_relay(format!("{}/relay", server.uri()));
        let outcome = chain.deliver(&target, &json!({"n": 1})).await;

        assert!(outcome.success);
        assert_eq!(outcome.status, Some(202));
        assert_eq!(outcome.method_used.as_deref(), Some("relay"));
    }

    #[tokio::test]
    async fn test_aggregate_failure_suggests_test_webhook() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let chain = TransportChain::from_config(&WebhookConfig::default()).unwrap();
        let url = format!("{}/webhook/abc", server.uri());
        let outcome = chain.deliver(&url, &json!({})).await;

        assert!(!outcome.success);
        assert_eq!(outcome.status, Some(503));
        assert!(outcome.method_used.is_none());
        let suggestion = outcome.suggestion.unwrap();
        assert_eq!(suggestion.url, format!("{}/webhook-test/abc", server.uri()));
    }

    #[tokio::test]
    async fn test_client_error_gets_no_suggestion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let chain = TransportChain::from_config(&WebhookConfig::default()).unwrap();
        let outcome = chain
            .deliver(&format!("{}/webhook/abc", server.uri()), &json!({}))
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.status, Some(404));
        assert!(outcome.suggestion.is_none());
    }

    #[tokio::test]
    async fn test_rejects_invalid_urls() {
        let chain = TransportChain::from_config(&WebhookConfig::default()).unwrap();

        for url in ["", "   ", "ftp://example.com/hook", "not a url"] {
            let outcome = chain.deliver(url, &json!({})).await;
            assert!(!outcome.success, "{url:?} should be rejected");
            assert!(outcome.error.unwrap().starts_with("Invalid webhook URL"));
        }
    }

    #[test]
    fn test_chain_order() {
        let chain = chain_with_query_relay("https://relay.example.com".to_string());
        assert_eq!(chain.names(), vec!["direct", "relay"]);
    }
}
