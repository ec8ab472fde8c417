//! API request handlers

pub mod campaigns;
pub mod health;
pub mod inbound;

pub use health::*;

use axum::{http::StatusCode, Json};
use disparo_common::Error;
use serde::Serialize;

/// Error response
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

impl From<Error> for ErrorResponse {
    fn from(e: Error) -> Self {
        Self {
            error: e.code().to_string(),
            message: e.to_string(),
        }
    }
}

pub(crate) fn api_error(e: Error) -> ApiError {
    let status =
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::error!("Request failed: {}", e);
    } else {
        tracing::debug!("Request rejected: {}", e);
    }
    (status, Json(ErrorResponse::from(e)))
}
