//! Disparo Core - Campaign dispatch and conversation recovery scheduling
//!
//! This crate provides the webhook transport chain, variable substitution,
//! the campaign pacer, scheduler and health monitor, and the conversation
//! recovery matcher and state machine.

pub mod dispatch;
pub mod recovery;
pub mod template;
pub mod webhook;

#[cfg(test)]
pub(crate) mod testing;

pub use dispatch::{
    CampaignScheduler, DispatchError, DispatchPacer, DispatchRun, DispatchSummary, HealthAction,
    HealthMonitor,
};
pub use recovery::{InboundOutcome, RecoveryEngine};
pub use template::{MessageBlock, RenderedMessage, TemplateRenderer};
pub use webhook::{DeliveryOutcome, TransportChain, TransportError, WebhookSender};
