//! In-memory store implementing every repository trait
//!
//! Used for dry runs (`database.backend = "memory"`) and by the test
//! suites. Conditional updates behave like their SQL counterparts: each
//! one checks the expected status under the write lock.

use crate::models::{
    Campaign, CampaignLog, CampaignStatus, Contact, ConversationStatus, CreateConversation,
    CreateLog, Message, MonitoredConversation, RecoveryFlowStep, RecoveryLog, RecoveryRule,
};
use crate::repository::{
    AuditLogRepository, CampaignRepository, ContactRepository, ConversationRepository,
    FlowStepRepository, MessageRepository, RecoveryRuleRepository,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use disparo_common::types::{
    CampaignId, ContactId, ConversationId, FlowStepId, MessageId, RuleId,
};
use disparo_common::Result;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    messages: HashMap<MessageId, Message>,
    contacts: HashMap<ContactId, Contact>,
    campaigns: HashMap<CampaignId, Campaign>,
    rules: HashMap<RuleId, RecoveryRule>,
    flow_steps: HashMap<FlowStepId, RecoveryFlowStep>,
    conversations: HashMap<ConversationId, MonitoredConversation>,
    campaign_logs: Vec<CampaignLog>,
    recovery_logs: Vec<RecoveryLog>,
}

/// In-memory store
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_message(&self, message: Message) {
        self.tables.write().await.messages.insert(message.id, message);
    }

    pub async fn insert_contact(&self, contact: Contact) {
        self.tables.write().await.contacts.insert(contact.id, contact);
    }

    pub async fn insert_campaign(&self, campaign: Campaign) {
        self.tables.write().await.campaigns.insert(campaign.id, campaign);
    }

    pub async fn insert_rule(&self, rule: RecoveryRule) {
        self.tables.write().await.rules.insert(rule.id, rule);
    }

    pub async fn insert_flow_step(&self, step: RecoveryFlowStep) {
        self.tables.write().await.flow_steps.insert(step.id, step);
    }

    pub async fn insert_conversation(&self, conversation: MonitoredConversation) {
        self.tables
            .write()
            .await
            .conversations
            .insert(conversation.id, conversation);
    }

    pub async fn campaign(&self, id: CampaignId) -> Option<Campaign> {
        self.tables.read().await.campaigns.get(&id).cloned()
    }

    pub async fn conversation(&self, id: ConversationId) -> Option<MonitoredConversation> {
        self.tables.read().await.conversations.get(&id).cloned()
    }

    pub async fn conversations(&self) -> Vec<MonitoredConversation> {
        let mut all: Vec<_> = self.tables.read().await.conversations.values().cloned().collect();
        all.sort_by_key(|c| c.created_at);
        all
    }

    pub async fn campaign_logs(&self, campaign_id: CampaignId) -> Vec<CampaignLog> {
        self.tables
            .read()
            .await
            .campaign_logs
            .iter()
            .filter(|l| l.campaign_id == campaign_id)
            .cloned()
            .collect()
    }

    pub async fn recovery_logs(&self, conversation_id: ConversationId) -> Vec<RecoveryLog> {
        self.tables
            .read()
            .await
            .recovery_logs
            .iter()
            .filter(|l| l.conversation_id == conversation_id)
            .cloned()
            .collect()
    }
}

fn is_status(campaign: &Campaign, expected: &[CampaignStatus]) -> bool {
    campaign
        .status_enum()
        .map(|s| expected.contains(&s))
        .unwrap_or(false)
}

fn is_active_conversation(conversation: &MonitoredConversation) -> bool {
    conversation
        .status_enum()
        .map(|s| s.is_active())
        .unwrap_or(false)
}

#[async_trait]
impl MessageRepository for MemoryStore {
    async fn get(&self, id: MessageId) -> Result<Option<Message>> {
        Ok(self.tables.read().await.messages.get(&id).cloned())
    }
}

#[async_trait]
impl ContactRepository for MemoryStore {
    async fn get(&self, id: ContactId) -> Result<Option<Contact>> {
        Ok(self.tables.read().await.contacts.get(&id).cloned())
    }

    async fn get_many(&self, ids: &[ContactId]) -> Result<Vec<Contact>> {
        let tables = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| tables.contacts.get(id).cloned())
            .collect())
    }
}

#[async_trait]
impl CampaignRepository for MemoryStore {
    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>> {
        Ok(self.campaign(id).await)
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>> {
        let tables = self.tables.read().await;
        let mut due: Vec<Campaign> = tables
            .campaigns
            .values()
            .filter(|c| is_status(c, &[CampaignStatus::Pending]))
            .filter(|c| c.is_immediate() || c.scheduled_at <= Some(now))
            .cloned()
            .collect();
        // Option orders None first, matching NULLS FIRST
        due.sort_by_key(|c| (c.scheduled_at, c.created_at));
        Ok(due)
    }

    async fn list_by_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>> {
        let tables = self.tables.read().await;
        let mut matching: Vec<Campaign> = tables
            .campaigns
            .values()
            .filter(|c| is_status(c, &[status]))
            .cloned()
            .collect();
        matching.sort_by_key(|c| c.updated_at);
        Ok(matching)
    }

    async fn claim(&self, id: CampaignId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.campaigns.get_mut(&id) {
            Some(c) if is_status(c, &[CampaignStatus::Pending]) => {
                let now = Utc::now();
                c.status = CampaignStatus::Sending.to_string();
                c.sent_count = 0;
                c.failed_count = 0;
                c.error_message = None;
                c.next_check_at = None;
                c.started_at = Some(now);
                c.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_progress(&self, id: CampaignId, sent: i32, failed: i32) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(c) = tables.campaigns.get_mut(&id) {
            if is_status(c, &[CampaignStatus::Sending]) {
                c.sent_count = sent;
                c.failed_count = failed;
                c.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn mark_sent(&self, id: CampaignId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.campaigns.get_mut(&id) {
            Some(c) if is_status(c, &[CampaignStatus::Sending]) => {
                let now = Utc::now();
                c.status = CampaignStatus::Sent.to_string();
                c.completed_at = Some(now);
                c.next_check_at = None;
                c.ack_received_at = None;
                c.ack_timeout_minutes = None;
                c.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_error(&self, id: CampaignId, message: &str) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.campaigns.get_mut(&id) {
            Some(c) if is_status(c, &[CampaignStatus::Pending, CampaignStatus::Sending]) => {
                let now = Utc::now();
                c.status = CampaignStatus::Error.to_string();
                c.error_message = Some(message.to_string());
                c.completed_at = Some(now);
                c.next_check_at = None;
                c.ack_received_at = None;
                c.ack_timeout_minutes = None;
                c.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_next_check(&self, id: CampaignId, at: DateTime<Utc>) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(c) = tables.campaigns.get_mut(&id) {
            c.next_check_at = Some(at);
        }
        Ok(())
    }

    async fn record_ack(
        &self,
        id: CampaignId,
        at: DateTime<Utc>,
        timeout_minutes: Option<i32>,
    ) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.campaigns.get_mut(&id) {
            Some(c) if is_status(c, &[CampaignStatus::Sending]) => {
                c.ack_received_at = Some(at);
                c.ack_timeout_minutes = timeout_minutes;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn reset_to_pending(&self, id: CampaignId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.campaigns.get_mut(&id) {
            Some(c) if is_status(c, &[CampaignStatus::Sending, CampaignStatus::Error]) => {
                c.status = CampaignStatus::Pending.to_string();
                c.error_message = None;
                c.next_check_at = None;
                c.ack_received_at = None;
                c.ack_timeout_minutes = None;
                c.started_at = None;
                c.completed_at = None;
                c.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl RecoveryRuleRepository for MemoryStore {
    async fn get(&self, id: RuleId) -> Result<Option<RecoveryRule>> {
        Ok(self.tables.read().await.rules.get(&id).cloned())
    }

    async fn list_active(&self) -> Result<Vec<RecoveryRule>> {
        let tables = self.tables.read().await;
        let mut rules: Vec<RecoveryRule> =
            tables.rules.values().filter(|r| r.active).cloned().collect();
        rules.sort_by_key(|r| (r.created_at, r.id));
        Ok(rules)
    }
}

#[async_trait]
impl FlowStepRepository for MemoryStore {
    async fn find_active(
        &self,
        rule_id: RuleId,
        sequence_order: i32,
    ) -> Result<Option<RecoveryFlowStep>> {
        let tables = self.tables.read().await;
        Ok(tables
            .flow_steps
            .values()
            .find(|s| s.rule_id == rule_id && s.sequence_order == sequence_order && s.active)
            .cloned())
    }
}

#[async_trait]
impl ConversationRepository for MemoryStore {
    async fn get(&self, id: ConversationId) -> Result<Option<MonitoredConversation>> {
        Ok(self.conversation(id).await)
    }

    async fn find_active(
        &self,
        contact_id: ContactId,
        rule_id: RuleId,
    ) -> Result<Option<MonitoredConversation>> {
        let tables = self.tables.read().await;
        Ok(tables
            .conversations
            .values()
            .find(|c| c.contact_id == contact_id && c.rule_id == rule_id && is_active_conversation(c))
            .cloned())
    }

    async fn create(&self, input: CreateConversation) -> Result<Option<MonitoredConversation>> {
        let mut tables = self.tables.write().await;

        let exists = tables.conversations.values().any(|c| {
            c.contact_id == input.contact_id && c.rule_id == input.rule_id && is_active_conversation(c)
        });
        if exists {
            return Ok(None);
        }

        let now = Utc::now();
        let conversation = MonitoredConversation {
            id: Uuid::now_v7(),
            contact_id: input.contact_id,
            rule_id: input.rule_id,
            trigger_message: input.trigger_message,
            triggered_at: input.triggered_at,
            current_flow_step: 1,
            attempts_count: 0,
            last_message_sent_at: None,
            next_due_at: input.next_due_at,
            status: ConversationStatus::WaitingResponse.to_string(),
            completed_at: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        tables
            .conversations
            .insert(conversation.id, conversation.clone());

        Ok(Some(conversation))
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<MonitoredConversation>> {
        let waiting = ConversationStatus::WaitingResponse.to_string();
        let tables = self.tables.read().await;
        let mut due: Vec<MonitoredConversation> = tables
            .conversations
            .values()
            .filter(|c| c.status == waiting && c.next_due_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|c| c.next_due_at);
        Ok(due)
    }

    async fn list_active_by_contact(
        &self,
        contact_id: ContactId,
    ) -> Result<Vec<MonitoredConversation>> {
        let tables = self.tables.read().await;
        let mut active: Vec<MonitoredConversation> = tables
            .conversations
            .values()
            .filter(|c| c.contact_id == contact_id && is_active_conversation(c))
            .cloned()
            .collect();
        active.sort_by_key(|c| c.triggered_at);
        Ok(active)
    }

    async fn claim_for_sending(&self, id: ConversationId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.conversations.get_mut(&id) {
            Some(c) if c.status_enum() == Some(ConversationStatus::WaitingResponse) => {
                c.status = ConversationStatus::SendingMessage.to_string();
                c.attempts_count += 1;
                c.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_step_sent(
        &self,
        id: ConversationId,
        next_step: i32,
        sent_at: DateTime<Utc>,
        next_due_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.conversations.get_mut(&id) {
            Some(c) if c.status_enum() == Some(ConversationStatus::SendingMessage) => {
                c.status = ConversationStatus::WaitingResponse.to_string();
                c.current_flow_step = next_step;
                c.last_message_sent_at = Some(sent_at);
                c.next_due_at = next_due_at;
                c.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn close(
        &self,
        id: ConversationId,
        status: ConversationStatus,
        error_message: Option<&str>,
    ) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.conversations.get_mut(&id) {
            Some(c) if is_active_conversation(c) => {
                let now = Utc::now();
                c.status = status.to_string();
                c.error_message = error_message.map(str::to_string);
                c.completed_at = Some(now);
                c.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl AuditLogRepository for MemoryStore {
    async fn append_campaign_log(&self, campaign_id: CampaignId, entry: CreateLog) -> Result<()> {
        self.tables.write().await.campaign_logs.push(CampaignLog {
            id: Uuid::now_v7(),
            campaign_id,
            action: entry.action,
            message: entry.message,
            data: entry.data,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn append_recovery_log(
        &self,
        conversation_id: ConversationId,
        entry: CreateLog,
    ) -> Result<()> {
        self.tables.write().await.recovery_logs.push(RecoveryLog {
            id: Uuid::now_v7(),
            conversation_id,
            action: entry.action,
            message: entry.message,
            data: entry.data,
            created_at: Utc::now(),
        });
        Ok(())
    }
}
