//! Campaign control handlers

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use disparo_common::Error;
use disparo_storage::models::Campaign;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::{api_error, ApiError};
use crate::state::AppState;

/// Acknowledgement from the external automation
#[derive(Debug, Default, Deserialize)]
pub struct AckRequest {
    /// Extended stuck timeout; the monitor default applies when omitted
    pub timeout_minutes: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct AckResponse {
    pub campaign_id: Uuid,
    pub ack_received_at: DateTime<Utc>,
    pub timeout_minutes: Option<i32>,
}

async fn load(state: &AppState, id: Uuid) -> Result<Campaign, ApiError> {
    state
        .repos
        .campaigns
        .get(id)
        .await
        .map_err(api_error)?
        .ok_or_else(|| api_error(Error::NotFound(format!("Campaign {}", id))))
}

/// Record an acknowledgement for a sending campaign
pub async fn acknowledge_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    body: Option<Json<AckRequest>>,
) -> Result<Json<AckResponse>, ApiError> {
    let req = body.map(|Json(r)| r).unwrap_or_default();

    if matches!(req.timeout_minutes, Some(minutes) if minutes <= 0) {
        return Err(api_error(Error::Validation(
            "timeout_minutes must be positive".to_string(),
        )));
    }

    let campaign = load(&state, id).await?;
    let now = Utc::now();

    let recorded = state
        .repos
        .campaigns
        .record_ack(id, now, req.timeout_minutes)
        .await
        .map_err(api_error)?;

    if !recorded {
        return Err(api_error(Error::InvalidState(format!(
            "Campaign is {}, not sending",
            campaign.status
        ))));
    }

    info!("Acknowledgement recorded for campaign {}", id);

    Ok(Json(AckResponse {
        campaign_id: id,
        ack_received_at: now,
        timeout_minutes: req.timeout_minutes,
    }))
}

/// Force a sending or errored campaign back to pending
pub async fn reset_campaign(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Campaign>, ApiError> {
    let campaign = load(&state, id).await?;

    let reset = state
        .repos
        .campaigns
        .reset_to_pending(id)
        .await
        .map_err(api_error)?;

    if !reset {
        return Err(api_error(Error::InvalidState(format!(
            "Campaign is {}; only sending or error campaigns can be reset",
            campaign.status
        ))));
    }

    info!("Campaign {} reset to pending", id);

    Ok(Json(load(&state, id).await?))
}
