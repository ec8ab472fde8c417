//! Outbound webhook payloads

use crate::template::RenderedMessage;
use chrono::{DateTime, Utc};
use disparo_storage::models::{
    Campaign, Contact, Message, MonitoredConversation, RecoveryFlowStep, RecoveryRule,
};
use serde_json::{json, Value};
use uuid::Uuid;

/// Event name of campaign dispatch envelopes
pub const CAMPAIGN_EVENT: &str = "send.message";

/// Everything one campaign send needs to describe itself
pub struct CampaignSend<'a> {
    pub instance: &'a str,
    pub campaign: &'a Campaign,
    pub message: &'a Message,
    pub contact: &'a Contact,
    pub rendered: &'a RenderedMessage,
    /// 0-based position in the campaign's contact list
    pub contact_index: usize,
    pub total_contacts: usize,
    /// Seconds waited before this send
    pub delay_applied: u64,
    pub sent_at: DateTime<Utc>,
}

/// WhatsApp-style JID for a phone number
pub fn remote_jid(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    format!("{}@s.whatsapp.net", digits)
}

fn message_type(kind: &str) -> &'static str {
    match kind {
        "image" => "imageMessage",
        "file" => "documentMessage",
        "audio" => "audioMessage",
        _ => "conversation",
    }
}

pub fn contact_snapshot(contact: &Contact) -> Value {
    json!({
        "id": contact.id,
        "name": contact.name,
        "phone": contact.phone,
        "phone2": contact.phone2,
        "phone3": contact.phone3,
        "email": contact.email,
        "tags": contact.tags_vec(),
        "company": contact.company,
        "position": contact.position,
        "notes": contact.notes,
        "custom_fields": contact.custom_fields,
        "created_at": contact.created_at,
        "updated_at": contact.updated_at,
    })
}

fn message_snapshot(message: &Message, rendered: &RenderedMessage) -> Result<Value, serde_json::Error> {
    let mut snapshot = json!({
        "id": message.id,
        "title": message.title,
        "content": rendered.text,
        "original_content": message.content,
        "type": rendered.kind,
        "media_url": rendered.media_url,
        "variables": rendered.variables,
        "created_at": message.created_at,
        "updated_at": message.updated_at,
    });

    if !rendered.blocks.is_empty() {
        snapshot["blocks"] = serde_json::to_value(&rendered.blocks)?;
    }

    Ok(snapshot)
}

pub fn campaign_snapshot(campaign: &Campaign) -> Value {
    json!({
        "id": campaign.id,
        "name": campaign.name,
        "status": campaign.status,
        "scheduled_at": campaign.scheduled_at,
        "min_delay_between_clients": campaign.min_delay_between_clients,
        "max_delay_between_clients": campaign.max_delay_between_clients,
        "webhook_url": campaign.webhook_url,
        "created_at": campaign.created_at,
        "updated_at": campaign.updated_at,
    })
}

/// Campaign dispatch envelope
pub fn campaign_envelope(send: &CampaignSend<'_>) -> Result<Value, serde_json::Error> {
    let jid = remote_jid(&send.contact.phone);
    let key_id = Uuid::new_v4().simple().to_string().to_uppercase();

    Ok(json!({
        "event": CAMPAIGN_EVENT,
        "instance": send.instance,
        "data": {
            "key": {
                "remoteJid": jid,
                "fromMe": true,
                "id": key_id,
            },
            "message": { "conversation": send.rendered.text },
            "messageTimestamp": send.sent_at.timestamp(),
            "status": "PENDING",
            "participant": Value::Null,
            "pushName": send.contact.name,
            "messageType": message_type(send.rendered.kind),
        },
        "destination": send.campaign.webhook_url,
        "date_time": send.sent_at.to_rfc3339(),
        "contact": contact_snapshot(send.contact),
        "message": message_snapshot(send.message, send.rendered)?,
        "campaign": campaign_snapshot(send.campaign),
        "metadata": {
            "sent_at": send.sent_at,
            "contact_index": send.contact_index,
            "total_contacts": send.total_contacts,
            "delay_applied": send.delay_applied,
        },
    }))
}

/// Everything one recovery step send needs to describe itself
pub struct RecoverySend<'a> {
    pub event: &'a str,
    pub conversation: &'a MonitoredConversation,
    pub rule: &'a RecoveryRule,
    pub step: &'a RecoveryFlowStep,
    pub message: &'a Message,
    pub contact: &'a Contact,
    pub rendered: &'a RenderedMessage,
    pub sent_at: DateTime<Utc>,
}

/// Recovery flow step envelope
pub fn recovery_envelope(send: &RecoverySend<'_>) -> Result<Value, serde_json::Error> {
    Ok(json!({
        "event": send.event,
        "contact": contact_snapshot(send.contact),
        "message": message_snapshot(send.message, send.rendered)?,
        "recovery": {
            "conversation_id": send.conversation.id,
            "rule_name": send.rule.name,
            "current_step": send.step.sequence_order,
            "attempts_count": send.conversation.attempts_count,
            "trigger_message": send.conversation.trigger_message,
        },
        "metadata": {
            "sent_at": send.sent_at,
            "flow_step": send.step.sequence_order,
            "delay_minutes": send.step.delay_minutes,
        },
    }))
}

/// Error and health notification about a campaign
pub struct CampaignNotice<'a> {
    pub event: &'a str,
    pub error_type: &'a str,
    pub message: &'a str,
    /// Minutes without progress, for stuck campaigns
    pub time_stuck: Option<i64>,
    pub action_taken: &'a str,
    pub detected_at: DateTime<Utc>,
}

pub fn campaign_notification(campaign: &Campaign, notice: &CampaignNotice<'_>) -> Value {
    let mut error = json!({
        "type": notice.error_type,
        "message": notice.message,
        "timestamp": notice.detected_at,
    });
    if let Some(minutes) = notice.time_stuck {
        error["timeStuck"] = json!(minutes);
    }

    json!({
        "event": notice.event,
        "campaign": campaign_snapshot(campaign),
        "error": error,
        "metadata": {
            "detected_at": notice.detected_at,
            "action_taken": notice.action_taken,
        },
    })
}
