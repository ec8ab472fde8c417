//! Shared handler state

use disparo_core::RecoveryEngine;
use disparo_storage::{DatabasePool, Repositories};
use std::sync::Arc;

/// Application state shared by all handlers
pub struct AppState {
    pub repos: Repositories,
    pub recovery: Arc<RecoveryEngine>,
    /// Present for the PostgreSQL backend; readiness probes it
    pub db_pool: Option<DatabasePool>,
}
