//! Append-only audit log repository

use crate::db::DatabasePool;
use crate::models::CreateLog;
use async_trait::async_trait;
use disparo_common::types::{CampaignId, ConversationId};
use disparo_common::{Error, Result};
use uuid::Uuid;

/// Audit log repository trait
#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    async fn append_campaign_log(&self, campaign_id: CampaignId, entry: CreateLog) -> Result<()>;

    async fn append_recovery_log(
        &self,
        conversation_id: ConversationId,
        entry: CreateLog,
    ) -> Result<()>;
}

/// Database audit log repository
pub struct DbAuditLogRepository {
    pool: DatabasePool,
}

impl DbAuditLogRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLogRepository for DbAuditLogRepository {
    async fn append_campaign_log(&self, campaign_id: CampaignId, entry: CreateLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO campaign_logs (id, campaign_id, action, message, data)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(campaign_id)
        .bind(&entry.action)
        .bind(&entry.message)
        .bind(&entry.data)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn append_recovery_log(
        &self,
        conversation_id: ConversationId,
        entry: CreateLog,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO recovery_logs (id, conversation_id, action, message, data)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(conversation_id)
        .bind(&entry.action)
        .bind(&entry.message)
        .bind(&entry.data)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }
}
