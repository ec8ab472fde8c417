//! Database models

use chrono::{DateTime, Utc};
use disparo_common::types::{
    CampaignId, ContactId, ConversationId, FlowStepId, MessageId, RuleId,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Message template model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub title: String,
    /// Plain text, or a JSON-encoded list of typed blocks
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Contact model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub name: String,
    pub phone: String,
    pub phone2: Option<String>,
    pub phone3: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
    pub notes: Option<String>,
    pub tags: Value,
    pub custom_fields: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contact {
    /// Get tags as a vector
    pub fn tags_vec(&self) -> Vec<String> {
        serde_json::from_value(self.tags.clone()).unwrap_or_default()
    }

    /// Look up a custom field rendered as text
    pub fn custom_field(&self, key: &str) -> Option<String> {
        let value = self.custom_fields.as_object()?.get(key)?;
        Some(match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => String::new(),
            other => other.to_string(),
        })
    }
}

/// Campaign status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Pending,
    Sending,
    Sent,
    Error,
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CampaignStatus::Pending => write!(f, "pending"),
            CampaignStatus::Sending => write!(f, "sending"),
            CampaignStatus::Sent => write!(f, "sent"),
            CampaignStatus::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CampaignStatus::Pending),
            "sending" => Ok(CampaignStatus::Sending),
            "sent" => Ok(CampaignStatus::Sent),
            "error" => Ok(CampaignStatus::Error),
            _ => Err(format!("Invalid campaign status: {}", s)),
        }
    }
}

/// Declared campaign class, used to pick a stuck timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignClass {
    Immediate,
    Scheduled,
    Bulk,
    LongRunning,
}

impl std::str::FromStr for CampaignClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "immediate" => Ok(CampaignClass::Immediate),
            "scheduled" => Ok(CampaignClass::Scheduled),
            "bulk" => Ok(CampaignClass::Bulk),
            "long_running" => Ok(CampaignClass::LongRunning),
            _ => Err(format!("Invalid campaign class: {}", s)),
        }
    }
}

/// Campaign model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub name: String,
    pub message_id: MessageId,
    /// Ordered contact list
    pub contact_ids: Vec<ContactId>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub webhook_url: Option<String>,
    pub min_delay_between_clients: i32,
    pub max_delay_between_clients: i32,
    pub campaign_class: Option<String>,
    pub status: String,
    pub sent_count: i32,
    pub failed_count: i32,
    pub error_message: Option<String>,
    /// Earliest time the health monitor may warn about this campaign again
    pub next_check_at: Option<DateTime<Utc>>,
    pub ack_received_at: Option<DateTime<Utc>>,
    pub ack_timeout_minutes: Option<i32>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Get status enum
    pub fn status_enum(&self) -> Option<CampaignStatus> {
        self.status.parse().ok()
    }

    /// Get declared class, if any and valid
    pub fn class_enum(&self) -> Option<CampaignClass> {
        self.campaign_class.as_deref().and_then(|c| c.parse().ok())
    }

    /// Campaigns without a due time are sent on the next tick
    pub fn is_immediate(&self) -> bool {
        self.scheduled_at.is_none()
    }
}

/// Recovery rule trigger type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Contains,
    Exact,
    StartsWith,
    EndsWith,
    Regex,
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerType::Contains => write!(f, "contains"),
            TriggerType::Exact => write!(f, "exact"),
            TriggerType::StartsWith => write!(f, "starts_with"),
            TriggerType::EndsWith => write!(f, "ends_with"),
            TriggerType::Regex => write!(f, "regex"),
        }
    }
}

impl std::str::FromStr for TriggerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contains" => Ok(TriggerType::Contains),
            "exact" => Ok(TriggerType::Exact),
            "starts_with" => Ok(TriggerType::StartsWith),
            "ends_with" => Ok(TriggerType::EndsWith),
            "regex" => Ok(TriggerType::Regex),
            _ => Err(format!("Invalid trigger type: {}", s)),
        }
    }
}

/// Recovery rule model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RecoveryRule {
    pub id: RuleId,
    pub name: String,
    pub description: Option<String>,
    pub trigger_text: String,
    pub trigger_type: String,
    pub active: bool,
    pub timeout_minutes: i32,
    pub max_attempts: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecoveryRule {
    /// Get trigger type enum
    pub fn trigger_type_enum(&self) -> Option<TriggerType> {
        self.trigger_type.parse().ok()
    }
}

/// Recovery flow step model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RecoveryFlowStep {
    pub id: FlowStepId,
    pub rule_id: RuleId,
    /// 1-based, unique per rule
    pub sequence_order: i32,
    pub delay_minutes: i32,
    pub message_id: MessageId,
    pub webhook_url: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Monitored conversation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    WaitingResponse,
    SendingMessage,
    Completed,
    Failed,
    Cancelled,
}

impl ConversationStatus {
    /// Statuses that hold the (contact, rule) slot
    pub const ACTIVE: [ConversationStatus; 2] = [
        ConversationStatus::WaitingResponse,
        ConversationStatus::SendingMessage,
    ];

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }
}

impl std::fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversationStatus::WaitingResponse => write!(f, "waiting_response"),
            ConversationStatus::SendingMessage => write!(f, "sending_message"),
            ConversationStatus::Completed => write!(f, "completed"),
            ConversationStatus::Failed => write!(f, "failed"),
            ConversationStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for ConversationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting_response" => Ok(ConversationStatus::WaitingResponse),
            "sending_message" => Ok(ConversationStatus::SendingMessage),
            "completed" => Ok(ConversationStatus::Completed),
            "failed" => Ok(ConversationStatus::Failed),
            "cancelled" => Ok(ConversationStatus::Cancelled),
            _ => Err(format!("Invalid conversation status: {}", s)),
        }
    }
}

/// Monitored conversation model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MonitoredConversation {
    pub id: ConversationId,
    pub contact_id: ContactId,
    pub rule_id: RuleId,
    pub trigger_message: String,
    pub triggered_at: DateTime<Utc>,
    /// Next flow step to send; one past the last step once the flow is exhausted
    pub current_flow_step: i32,
    pub attempts_count: i32,
    pub last_message_sent_at: Option<DateTime<Utc>>,
    pub next_due_at: DateTime<Utc>,
    pub status: String,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MonitoredConversation {
    /// Get status enum
    pub fn status_enum(&self) -> Option<ConversationStatus> {
        self.status.parse().ok()
    }
}

/// Create conversation input
#[derive(Debug, Clone)]
pub struct CreateConversation {
    pub contact_id: ContactId,
    pub rule_id: RuleId,
    pub trigger_message: String,
    pub triggered_at: DateTime<Utc>,
    pub next_due_at: DateTime<Utc>,
}

/// Campaign audit row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CampaignLog {
    pub id: Uuid,
    pub campaign_id: CampaignId,
    pub action: String,
    pub message: String,
    pub data: Value,
    pub created_at: DateTime<Utc>,
}

/// Recovery audit row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RecoveryLog {
    pub id: Uuid,
    pub conversation_id: ConversationId,
    pub action: String,
    pub message: String,
    pub data: Value,
    pub created_at: DateTime<Utc>,
}

/// Audit entry input, shared by both log tables
#[derive(Debug, Clone)]
pub struct CreateLog {
    pub action: String,
    pub message: String,
    pub data: Value,
}

impl CreateLog {
    pub fn new(action: impl Into<String>, message: impl Into<String>, data: Value) -> Self {
        Self {
            action: action.into(),
            message: message.into(),
            data,
        }
    }
}
