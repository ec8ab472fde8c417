//! Monitored conversation repository

use crate::db::DatabasePool;
use crate::models::{ConversationStatus, CreateConversation, MonitoredConversation};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use disparo_common::types::{ContactId, ConversationId, RuleId};
use disparo_common::{Error, Result};
use uuid::Uuid;

/// Monitored conversation repository trait
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn get(&self, id: ConversationId) -> Result<Option<MonitoredConversation>>;

    /// The active conversation for (contact, rule), if any
    async fn find_active(
        &self,
        contact_id: ContactId,
        rule_id: RuleId,
    ) -> Result<Option<MonitoredConversation>>;

    /// Insert a `waiting_response` conversation at step 1.
    ///
    /// Returns `None` when an active conversation for the pair already exists.
    async fn create(&self, input: CreateConversation) -> Result<Option<MonitoredConversation>>;

    /// `waiting_response` conversations due at or before `now`
    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<MonitoredConversation>>;

    async fn list_active_by_contact(
        &self,
        contact_id: ContactId,
    ) -> Result<Vec<MonitoredConversation>>;

    /// `waiting_response -> sending_message`, incrementing the attempt counter
    async fn claim_for_sending(&self, id: ConversationId) -> Result<bool>;

    /// `sending_message -> waiting_response` after a step went out
    async fn record_step_sent(
        &self,
        id: ConversationId,
        next_step: i32,
        sent_at: DateTime<Utc>,
        next_due_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Move an active conversation to a terminal status
    async fn close(
        &self,
        id: ConversationId,
        status: ConversationStatus,
        error_message: Option<&str>,
    ) -> Result<bool>;
}

/// Database conversation repository
pub struct DbConversationRepository {
    pool: DatabasePool,
}

impl DbConversationRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationRepository for DbConversationRepository {
    async fn get(&self, id: ConversationId) -> Result<Option<MonitoredConversation>> {
        sqlx::query_as::<_, MonitoredConversation>(
            "SELECT * FROM monitored_conversations WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn find_active(
        &self,
        contact_id: ContactId,
        rule_id: RuleId,
    ) -> Result<Option<MonitoredConversation>> {
        sqlx::query_as::<_, MonitoredConversation>(
            r#"
            SELECT * FROM monitored_conversations
            WHERE contact_id = $1 AND rule_id = $2
              AND status IN ('waiting_response', 'sending_message')
            "#,
        )
        .bind(contact_id)
        .bind(rule_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn create(&self, input: CreateConversation) -> Result<Option<MonitoredConversation>> {
        let id = Uuid::now_v7();

        sqlx::query_as::<_, MonitoredConversation>(
            r#"
            INSERT INTO monitored_conversations (
                id, contact_id, rule_id, trigger_message, triggered_at,
                current_flow_step, attempts_count, next_due_at, status
            )
            VALUES ($1, $2, $3, $4, $5, 1, 0, $6, 'waiting_response')
            ON CONFLICT (contact_id, rule_id)
                WHERE status IN ('waiting_response', 'sending_message')
                DO NOTHING
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.contact_id)
        .bind(input.rule_id)
        .bind(&input.trigger_message)
        .bind(input.triggered_at)
        .bind(input.next_due_at)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<MonitoredConversation>> {
        sqlx::query_as::<_, MonitoredConversation>(
            r#"
            SELECT * FROM monitored_conversations
            WHERE status = 'waiting_response' AND next_due_at <= $1
            ORDER BY next_due_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_active_by_contact(
        &self,
        contact_id: ContactId,
    ) -> Result<Vec<MonitoredConversation>> {
        sqlx::query_as::<_, MonitoredConversation>(
            r#"
            SELECT * FROM monitored_conversations
            WHERE contact_id = $1
              AND status IN ('waiting_response', 'sending_message')
            ORDER BY triggered_at ASC
            "#,
        )
        .bind(contact_id)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn claim_for_sending(&self, id: ConversationId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE monitored_conversations SET
                status = 'sending_message',
                attempts_count = attempts_count + 1,
                updated_at = NOW()
            WHERE id = $1 AND status = 'waiting_response'
            "#,
        )
        .bind(id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_step_sent(
        &self,
        id: ConversationId,
        next_step: i32,
        sent_at: DateTime<Utc>,
        next_due_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE monitored_conversations SET
                status = 'waiting_response',
                current_flow_step = $2,
                last_message_sent_at = $3,
                next_due_at = $4,
                updated_at = NOW()
            WHERE id = $1 AND status = 'sending_message'
            "#,
        )
        .bind(id)
        .bind(next_step)
        .bind(sent_at)
        .bind(next_due_at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn close(
        &self,
        id: ConversationId,
        status: ConversationStatus,
        error_message: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE monitored_conversations SET
                status = $2,
                error_message = $3,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status IN ('waiting_response', 'sending_message')
            "#,
        )
        .bind(id)
        .bind(status.to_string())
        .bind(error_message)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}
