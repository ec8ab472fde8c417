//! Campaign dispatch: pacing, scheduling and health monitoring

pub mod envelope;
mod health;
mod pacer;
mod scheduler;

pub use health::{HealthAction, HealthMonitor};
pub use pacer::{DispatchPacer, DispatchRun, DispatchSummary};
pub use scheduler::CampaignScheduler;

use disparo_common::types::{CampaignId, MessageId};
use thiserror::Error;

/// Failures that abort a campaign run
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Message {0} not found")]
    MessageNotFound(MessageId),

    #[error("Campaign {0} has no resolvable contacts")]
    NoContacts(CampaignId),

    #[error("Invalid delay range: min {min}s, max {max}s")]
    InvalidDelayRange { min: i32, max: i32 },

    #[error("Envelope serialization failed: {0}")]
    Envelope(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] disparo_common::Error),
}
