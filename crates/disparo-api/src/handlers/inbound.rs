//! Inbound message intake

use axum::{extract::State, Json};
use disparo_common::Error;
use disparo_core::InboundOutcome;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::{api_error, ApiError};
use crate::state::AppState;

/// Message received from a contact
#[derive(Debug, Deserialize)]
pub struct InboundRequest {
    pub contact_id: Uuid,
    pub text: String,
}

/// Run rule matching and the cancellation check for one inbound message
pub async fn receive_message(
    State(state): State<Arc<AppState>>,
    Json(req): Json<InboundRequest>,
) -> Result<Json<InboundOutcome>, ApiError> {
    if req.text.trim().is_empty() {
        return Err(api_error(Error::Validation(
            "text must not be empty".to_string(),
        )));
    }

    if state.repos.contacts.get(req.contact_id).await.map_err(api_error)?.is_none() {
        return Err(api_error(Error::NotFound(format!("Contact {}", req.contact_id))));
    }

    let outcome = state
        .recovery
        .handle_inbound(req.contact_id, &req.text)
        .await
        .map_err(api_error)?;

    info!(
        "Inbound message from {}: activated={}, cancelled={}",
        req.contact_id,
        outcome.activated.is_some(),
        outcome.cancelled
    );

    Ok(Json(outcome))
}
