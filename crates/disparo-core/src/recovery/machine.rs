//! Conversation recovery state machine
//!
//! ```text
//! waiting_response -> sending_message -> waiting_response -> ... -> completed
//!        |                  |
//!        +-> failed / cancelled
//! ```

use super::matcher::{first_match, is_affirmative};
use crate::dispatch::envelope::{recovery_envelope, RecoverySend};
use crate::template::TemplateRenderer;
use crate::webhook::WebhookSender;
use chrono::{DateTime, Duration, Utc};
use disparo_common::config::{ActivationMode, RecoveryConfig};
use disparo_common::types::{ContactId, ConversationId};
use disparo_common::Result;
use disparo_storage::models::{
    ConversationStatus, CreateConversation, CreateLog, MonitoredConversation, RecoveryRule,
};
use disparo_storage::repository::Repositories;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Reason recorded on conversations closed by an affirmative reply
pub const CANCEL_REASON: &str = "Contact replied affirmatively";

/// What one due conversation went through during a sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// A flow step went out (or was attempted) and the cursor moved on
    StepSent,
    Completed,
    Failed,
    /// Claimed or closed elsewhere while the sweep was working on it
    Skipped,
}

/// Result of one inbound message
#[derive(Debug, Clone, Default, Serialize)]
pub struct InboundOutcome {
    pub activated: Option<MonitoredConversation>,
    pub cancelled: usize,
}

/// Conversation recovery engine
pub struct RecoveryEngine {
    repos: Repositories,
    sender: Arc<dyn WebhookSender>,
    renderer: TemplateRenderer,
    config: RecoveryConfig,
}

impl RecoveryEngine {
    pub fn new(repos: Repositories, sender: Arc<dyn WebhookSender>, config: RecoveryConfig) -> Self {
        Self {
            repos,
            sender,
            renderer: TemplateRenderer::new(),
            config,
        }
    }

    /// Rule matching followed by the cancellation check, both on the same text.
    ///
    /// A message that both triggers a rule and contains an affirmative
    /// keyword activates the conversation and then cancels it.
    pub async fn handle_inbound(&self, contact_id: ContactId, text: &str) -> Result<InboundOutcome> {
        let activated = self.process_incoming_message(contact_id, text).await?;
        let cancelled = self.cancel_on_reply(contact_id, text).await?;
        Ok(InboundOutcome {
            activated,
            cancelled,
        })
    }

    /// Activate the first active rule matching `text`, if any
    pub async fn process_incoming_message(
        &self,
        contact_id: ContactId,
        text: &str,
    ) -> Result<Option<MonitoredConversation>> {
        let rules = self.repos.rules.list_active().await?;

        let Some(rule) = first_match(text, &rules) else {
            debug!("No recovery rule matched message from contact {}", contact_id);
            return Ok(None);
        };

        info!("Message from contact {} matched rule {} ({})", contact_id, rule.id, rule.name);
        self.activate(rule, contact_id, text, Utc::now()).await
    }

    /// Start a conversation for (contact, rule) unless one is already active
    pub async fn activate(
        &self,
        rule: &RecoveryRule,
        contact_id: ContactId,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<MonitoredConversation>> {
        if self.repos.conversations.find_active(contact_id, rule.id).await?.is_some() {
            debug!("Contact {} already has an active conversation for rule {}", contact_id, rule.id);
            return Ok(None);
        }

        let next_due_at = match self.config.activation_mode {
            ActivationMode::Immediate => {
                let delay = self
                    .repos
                    .flow_steps
                    .find_active(rule.id, 1)
                    .await?
                    .map(|step| step.delay_minutes)
                    .unwrap_or(0);
                now + Duration::minutes(delay.into())
            }
            ActivationMode::AfterTimeout => now + Duration::minutes(rule.timeout_minutes.into()),
        };

        let created = self
            .repos
            .conversations
            .create(CreateConversation {
                contact_id,
                rule_id: rule.id,
                trigger_message: text.to_string(),
                triggered_at: now,
                next_due_at,
            })
            .await?;

        let Some(conversation) = created else {
            // Lost the race for the active slot
            return Ok(None);
        };

        self.log(
            conversation.id,
            "activated",
            format!("Conversation activated by rule {}", rule.name),
            json!({
                "rule_id": rule.id,
                "trigger_message": text,
                "next_due_at": next_due_at,
            }),
        )
        .await;

        Ok(Some(conversation))
    }

    /// Cancel every active conversation of the contact when `text` is affirmative
    pub async fn cancel_on_reply(&self, contact_id: ContactId, text: &str) -> Result<usize> {
        if !is_affirmative(text) {
            return Ok(0);
        }

        let active = self.repos.conversations.list_active_by_contact(contact_id).await?;
        let mut cancelled = 0;

        for conversation in active {
            if self
                .repos
                .conversations
                .close(conversation.id, ConversationStatus::Cancelled, Some(CANCEL_REASON))
                .await?
            {
                cancelled += 1;
                info!("Conversation {} cancelled by reply", conversation.id);
                self.log(
                    conversation.id,
                    "cancelled",
                    CANCEL_REASON,
                    json!({ "reply": text, "current_flow_step": conversation.current_flow_step }),
                )
                .await;
            }
        }

        Ok(cancelled)
    }

    /// Run the sweep loop
    pub async fn run(&self) {
        let secs = self.config.sweep_interval_secs.max(1);
        let mut ticker = interval(std::time::Duration::from_secs(secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Recovery sweep started (interval: {}s)", secs);

        loop {
            ticker.tick().await;

            if let Err(e) = self.tick().await {
                error!("Error sweeping recovery conversations: {}", e);
            }
        }
    }

    pub async fn tick(&self) -> Result<Vec<(ConversationId, Advance)>> {
        self.tick_at(Utc::now()).await
    }

    /// Advance every conversation due at `now`
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<Vec<(ConversationId, Advance)>> {
        let due = self.repos.conversations.list_due(now).await?;

        if !due.is_empty() {
            debug!("{} recovery conversations due", due.len());
        }

        let mut results = Vec::with_capacity(due.len());
        for conversation in due {
            match self.advance(&conversation, now).await {
                Ok(advance) => results.push((conversation.id, advance)),
                Err(e) => error!("Failed to advance conversation {}: {}", conversation.id, e),
            }
        }

        Ok(results)
    }

    async fn advance(&self, conversation: &MonitoredConversation, now: DateTime<Utc>) -> Result<Advance> {
        let Some(rule) = self.repos.rules.get(conversation.rule_id).await? else {
            return self
                .close(conversation, ConversationStatus::Failed, "Recovery rule no longer exists")
                .await;
        };

        if conversation.attempts_count >= rule.max_attempts {
            let reason = format!("Max attempts reached ({})", rule.max_attempts);
            return self.close(conversation, ConversationStatus::Failed, &reason).await;
        }

        let Some(step) = self
            .repos
            .flow_steps
            .find_active(rule.id, conversation.current_flow_step)
            .await?
        else {
            return self
                .close(conversation, ConversationStatus::Completed, "Recovery flow finished")
                .await;
        };

        if !self.repos.conversations.claim_for_sending(conversation.id).await? {
            debug!("Conversation {} was claimed elsewhere", conversation.id);
            return Ok(Advance::Skipped);
        }

        let Some(message) = self.repos.messages.get(step.message_id).await? else {
            let reason = format!("Message {} not found", step.message_id);
            return self.close(conversation, ConversationStatus::Failed, &reason).await;
        };
        let Some(contact) = self.repos.contacts.get(conversation.contact_id).await? else {
            let reason = format!("Contact {} not found", conversation.contact_id);
            return self.close(conversation, ConversationStatus::Failed, &reason).await;
        };

        let mut sending = conversation.clone();
        sending.attempts_count += 1;

        let rendered = self.renderer.render_message(&message.content, &contact);
        let url = step
            .webhook_url
            .as_deref()
            .or(self.config.default_webhook_url.as_deref());

        let delivery: Value = match url {
            None => {
                warn!(
                    "No webhook for step {} of rule {}; conversation {} advances without delivery",
                    step.sequence_order, rule.id, conversation.id
                );
                json!({ "success": false, "error": "no webhook configured" })
            }
            Some(url) => {
                let send = RecoverySend {
                    event: &self.config.event,
                    conversation: &sending,
                    rule: &rule,
                    step: &step,
                    message: &message,
                    contact: &contact,
                    rendered: &rendered,
                    sent_at: now,
                };
                match recovery_envelope(&send) {
                    Ok(payload) => {
                        let outcome = self.sender.deliver(url, &payload).await;
                        if !outcome.success {
                            warn!(
                                "Recovery step {} for conversation {} not delivered: {}",
                                step.sequence_order,
                                conversation.id,
                                outcome.error.as_deref().unwrap_or("unknown error")
                            );
                        }
                        json!(outcome)
                    }
                    Err(e) => {
                        warn!("Could not build recovery envelope for {}: {}", conversation.id, e);
                        json!({ "success": false, "error": e.to_string() })
                    }
                }
            }
        };

        let next_step = step.sequence_order + 1;
        let next_due_at = now + Duration::minutes(rule.timeout_minutes.into());

        if !self
            .repos
            .conversations
            .record_step_sent(conversation.id, next_step, now, next_due_at)
            .await?
        {
            let status = self
                .repos
                .conversations
                .get(conversation.id)
                .await?
                .map(|c| c.status)
                .unwrap_or_else(|| "missing".to_string());
            warn!(
                "Conversation {} became {} while step {} was in flight; cursor left unchanged",
                conversation.id, status, step.sequence_order
            );
            self.log(
                conversation.id,
                "sent_after_close",
                format!(
                    "Flow step {} went out after the conversation became {}",
                    step.sequence_order, status
                ),
                json!({
                    "flow_step": step.sequence_order,
                    "status": status,
                    "delivery": delivery,
                }),
            )
            .await;
            return Ok(Advance::Skipped);
        }

        info!(
            "Conversation {}: step {} sent (attempt {}/{})",
            conversation.id, step.sequence_order, sending.attempts_count, rule.max_attempts
        );
        self.log(
            conversation.id,
            "message_sent",
            format!("Flow step {} sent", step.sequence_order),
            json!({
                "flow_step": step.sequence_order,
                "attempts_count": sending.attempts_count,
                "next_due_at": next_due_at,
                "delivery": delivery,
            }),
        )
        .await;

        Ok(Advance::StepSent)
    }

    async fn close(
        &self,
        conversation: &MonitoredConversation,
        status: ConversationStatus,
        reason: &str,
    ) -> Result<Advance> {
        let error_message = match status {
            ConversationStatus::Failed => Some(reason),
            _ => None,
        };

        if !self
            .repos
            .conversations
            .close(conversation.id, status, error_message)
            .await?
        {
            return Ok(Advance::Skipped);
        }

        info!("Conversation {} {}: {}", conversation.id, status, reason);
        self.log(
            conversation.id,
            &status.to_string(),
            reason,
            json!({
                "current_flow_step": conversation.current_flow_step,
                "attempts_count": conversation.attempts_count,
            }),
        )
        .await;

        Ok(match status {
            ConversationStatus::Completed => Advance::Completed,
            _ => Advance::Failed,
        })
    }

    async fn log(
        &self,
        conversation_id: ConversationId,
        action: &str,
        message: impl Into<String>,
        data: Value,
    ) {
        if let Err(e) = self
            .repos
            .audit
            .append_recovery_log(conversation_id, CreateLog::new(action, message, data))
            .await
        {
            warn!("Failed to write recovery log for {}: {}", conversation_id, e);
        }
    }
}
