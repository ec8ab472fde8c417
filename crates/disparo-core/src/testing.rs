//! Test fixtures and a recording webhook sender

use crate::webhook::{DeliveryOutcome, WebhookSender};
use async_trait::async_trait;
use chrono::Utc;
use disparo_storage::models::{Campaign, Contact, Message, RecoveryFlowStep, RecoveryRule};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

type FailWhen = Box<dyn Fn(&Value) -> bool + Send + Sync>;

/// Records every delivery; fails the ones `fail_when` selects
pub struct RecordingSender {
    calls: Mutex<Vec<(String, Value)>>,
    fail_when: FailWhen,
}

impl RecordingSender {
    pub fn new() -> Arc<Self> {
        Self::failing_when(|_| false)
    }

    pub fn failing_when(f: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail_when: Box::new(f),
        })
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookSender for RecordingSender {
    async fn deliver(&self, url: &str, payload: &Value) -> DeliveryOutcome {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), payload.clone()));

        if (self.fail_when)(payload) {
            DeliveryOutcome::failure(Some(500), "Endpoint returned HTTP 500".to_string(), None)
        } else {
            DeliveryOutcome {
                success: true,
                status: Some(200),
                error: None,
                method_used: Some("direct".to_string()),
                suggestion: None,
            }
        }
    }
}

pub fn contact(name: &str, phone: &str) -> Contact {
    Contact {
        id: Uuid::new_v4(),
        name: name.to_string(),
        phone: phone.to_string(),
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

pub fn message(content: &str) -> Message {
    Message {
        id: Uuid::new_v4(),
        title: "Mensagem".to_string(),
        content: content.to_string(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn campaign(message_id: Uuid, contact_ids: Vec<Uuid>, webhook_url: Option<&str>) -> Campaign {
    let now = Utc::now();
    Campaign {
        id: Uuid::new_v4(),
        name: "Campanha".to_string(),
        message_id,
        contact_ids,
        scheduled_at: None,
        webhook_url: webhook_url.map(str::to_string),
        min_delay_between_clients: 0,
        max_delay_between_clients: 0,
        campaign_class: None,
        status: "pending".to_string(),
        sent_count: 0,
        failed_count: 0,
        error_message: None,
        next_check_at: None,
        ack_received_at: None,
        ack_timeout_minutes: None,
        started_at: None,
        completed_at: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn rule(trigger_text: &str, trigger_type: &str, timeout_minutes: i32, max_attempts: i32) -> RecoveryRule {
    RecoveryRule {
        id: Uuid::new_v4(),
        name: format!("{} ({})", trigger_text, trigger_type),
        description: None,
        trigger_text: trigger_text.to_string(),
        trigger_type: trigger_type.to_string(),
        active: true,
        timeout_minutes,
        max_attempts,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn flow_step(rule_id: Uuid, sequence_order: i32, delay_minutes: i32, message_id: Uuid) -> RecoveryFlowStep {
    RecoveryFlowStep {
        id: Uuid::new_v4(),
        rule_id,
        sequence_order,
        delay_minutes,
        message_id,
        webhook_url: None,
        active: true,
        created_at: Utc::now(),
    }
}
