//! API routes

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::{campaigns, health, inbound};
use crate::state::AppState;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/live", get(health::liveness))
        .route("/ready", get(health::readiness))
        .with_state(state.clone());

    let campaign_routes = Router::new()
        .route("/:campaign_id/ack", post(campaigns::acknowledge_campaign))
        .route("/:campaign_id/reset", post(campaigns::reset_campaign));

    let api_v1 = Router::new()
        .route("/inbound", post(inbound::receive_message))
        .nest("/campaigns", campaign_routes)
        .with_state(state);

    Router::new()
        .nest("/health", health_routes)
        .nest("/api/v1", api_v1)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use disparo_common::config::{RecoveryConfig, WebhookConfig};
    use disparo_core::{RecoveryEngine, TransportChain};
    use disparo_storage::models::{Campaign, Contact, RecoveryRule};
    use disparo_storage::{MemoryStore, Repositories};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    fn app(store: Arc<MemoryStore>) -> Router {
        let repos = Repositories::memory(store);
        let sender = Arc::new(TransportChain::from_config(&WebhookConfig::default()).unwrap());
        let recovery = Arc::new(RecoveryEngine::new(
            repos.clone(),
            sender,
            RecoveryConfig::default(),
        ));
        create_router(AppState {
            repos,
            recovery,
            db_pool: None,
        })
    }

    fn contact() -> Contact {
        Contact {
            id: Uuid::new_v4(),
            name: "Ana".to_string(),
            phone: "5511999990000".to_string(),
            phone2: None,
            phone3: None,
            email: None,
            company: None,
            position: None,
            notes: None,
            tags: json!([]),
            custom_fields: json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn campaign(status: &str) -> Campaign {
        Campaign {
            id: Uuid::new_v4(),
            name: "Black Friday".to_string(),
            message_id: Uuid::new_v4(),
            contact_ids: vec![],
            scheduled_at: None,
            webhook_url: None,
            min_delay_between_clients: 0,
            max_delay_between_clients: 0,
            campaign_class: None,
            status: status.to_string(),
            sent_count: 0,
            failed_count: 0,
            error_message: Some("stuck".to_string()),
            next_check_at: None,
            ack_received_at: None,
            ack_timeout_minutes: None,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    async fn post(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_health_routes() {
        let app = app(Arc::new(MemoryStore::new()));

        for uri in ["/health", "/health/live", "/health/ready"] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_inbound_activates_then_cancels() {
        let store = Arc::new(MemoryStore::new());
        let contact = contact();
        store.insert_contact(contact.clone()).await;
        store
            .insert_rule(RecoveryRule {
                id: Uuid::new_v4(),
                name: "Interesse".to_string(),
                description: None,
                trigger_text: "interessado".to_string(),
                trigger_type: "contains".to_string(),
                active: true,
                timeout_minutes: 60,
                max_attempts: 3,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await;
        let app = app(store.clone());

        let (status, body) = post(
            app.clone(),
            "/api/v1/inbound",
            json!({"contact_id": contact.id, "text": "estou interessado"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["activated"]["status"], "waiting_response");
        assert_eq!(body["cancelled"], 0);

        let (status, body) = post(
            app,
            "/api/v1/inbound",
            json!({"contact_id": contact.id, "text": "Sim"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["activated"].is_null());
        assert_eq!(body["cancelled"], 1);
        assert_eq!(store.conversations().await[0].status, "cancelled");
    }

    #[tokio::test]
    async fn test_inbound_validation() {
        let app = app(Arc::new(MemoryStore::new()));

        let (status, body) = post(
            app.clone(),
            "/api/v1/inbound",
            json!({"contact_id": Uuid::new_v4(), "text": "  "}),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "VALIDATION_ERROR");

        let (status, body) = post(
            app,
            "/api/v1/inbound",
            json!({"contact_id": Uuid::new_v4(), "text": "oi"}),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_ack_requires_sending_campaign() {
        let store = Arc::new(MemoryStore::new());
        let sending = campaign("sending");
        let sent = campaign("sent");
        store.insert_campaign(sending.clone()).await;
        store.insert_campaign(sent.clone()).await;
        let app = app(store.clone());

        let (status, body) = post(
            app.clone(),
            &format!("/api/v1/campaigns/{}/ack", sending.id),
            json!({"timeout_minutes": 90}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["timeout_minutes"], 90);
        let stored = store.campaign(sending.id).await.unwrap();
        assert!(stored.ack_received_at.is_some());
        assert_eq!(stored.ack_timeout_minutes, Some(90));

        let (status, body) = post(
            app.clone(),
            &format!("/api/v1/campaigns/{}/ack", sent.id),
            json!({}),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "INVALID_STATE");

        let (status, _) = post(
            app.clone(),
            &format!("/api/v1/campaigns/{}/ack", sending.id),
            json!({"timeout_minutes": 0}),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = post(
            app,
            &format!("/api/v1/campaigns/{}/ack", Uuid::new_v4()),
            json!({}),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_reset_moves_error_back_to_pending() {
        let store = Arc::new(MemoryStore::new());
        let errored = campaign("error");
        let pending = campaign("pending");
        store.insert_campaign(errored.clone()).await;
        store.insert_campaign(pending.clone()).await;
        let app = app(store.clone());

        let (status, body) = post(
            app.clone(),
            &format!("/api/v1/campaigns/{}/reset", errored.id),
            json!({}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "pending");
        assert!(body["error_message"].is_null());

        let (status, _) = post(
            app,
            &format!("/api/v1/campaigns/{}/reset", pending.id),
            json!({}),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
