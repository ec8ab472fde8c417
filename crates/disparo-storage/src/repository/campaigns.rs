//! Campaign repository

use crate::db::DatabasePool;
use crate::models::{Campaign, CampaignStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use disparo_common::types::CampaignId;
use disparo_common::{Error, Result};

/// Campaign repository trait
///
/// Every status change is a conditional update that reports whether the
/// row was in the expected state, so concurrent pollers cannot both win.
#[async_trait]
pub trait CampaignRepository: Send + Sync {
    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>>;

    /// Pending campaigns whose due time is unset or at/before `now`, oldest due first
    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>>;

    async fn list_by_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>>;

    /// `pending -> sending`; false when another caller already claimed it
    async fn claim(&self, id: CampaignId) -> Result<bool>;

    /// Persist per-contact counters and refresh `updated_at`
    async fn record_progress(&self, id: CampaignId, sent: i32, failed: i32) -> Result<()>;

    /// `sending -> sent`
    async fn mark_sent(&self, id: CampaignId) -> Result<bool>;

    /// `pending|sending -> error`, clearing acknowledgement and check state
    async fn mark_error(&self, id: CampaignId, message: &str) -> Result<bool>;

    /// Suppress further stuck warnings until `at`; leaves `updated_at` alone
    async fn set_next_check(&self, id: CampaignId, at: DateTime<Utc>) -> Result<()>;

    /// Record an external acknowledgement for a sending campaign
    async fn record_ack(
        &self,
        id: CampaignId,
        at: DateTime<Utc>,
        timeout_minutes: Option<i32>,
    ) -> Result<bool>;

    /// `sending|error -> pending` (operator force reset)
    async fn reset_to_pending(&self, id: CampaignId) -> Result<bool>;
}

/// Database campaign repository
pub struct DbCampaignRepository {
    pool: DatabasePool,
}

impl DbCampaignRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CampaignRepository for DbCampaignRepository {
    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Campaign>> {
        sqlx::query_as::<_, Campaign>(
            r#"
            SELECT * FROM campaigns
            WHERE status = 'pending'
              AND (scheduled_at IS NULL OR scheduled_at <= $1)
            ORDER BY scheduled_at ASC NULLS FIRST, created_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_by_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>> {
        sqlx::query_as::<_, Campaign>(
            "SELECT * FROM campaigns WHERE status = $1 ORDER BY updated_at ASC",
        )
        .bind(status.to_string())
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn claim(&self, id: CampaignId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns SET
                status = 'sending',
                sent_count = 0,
                failed_count = 0,
                error_message = NULL,
                next_check_at = NULL,
                started_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_progress(&self, id: CampaignId, sent: i32, failed: i32) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE campaigns SET
                sent_count = $2,
                failed_count = $3,
                updated_at = NOW()
            WHERE id = $1 AND status = 'sending'
            "#,
        )
        .bind(id)
        .bind(sent)
        .bind(failed)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn mark_sent(&self, id: CampaignId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns SET
                status = 'sent',
                completed_at = NOW(),
                next_check_at = NULL,
                ack_received_at = NULL,
                ack_timeout_minutes = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'sending'
            "#,
        )
        .bind(id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_error(&self, id: CampaignId, message: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns SET
                status = 'error',
                error_message = $2,
                completed_at = NOW(),
                next_check_at = NULL,
                ack_received_at = NULL,
                ack_timeout_minutes = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'sending')
            "#,
        )
        .bind(id)
        .bind(message)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_next_check(&self, id: CampaignId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE campaigns SET next_check_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn record_ack(
        &self,
        id: CampaignId,
        at: DateTime<Utc>,
        timeout_minutes: Option<i32>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns SET
                ack_received_at = $2,
                ack_timeout_minutes = $3
            WHERE id = $1 AND status = 'sending'
            "#,
        )
        .bind(id)
        .bind(at)
        .bind(timeout_minutes)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn reset_to_pending(&self, id: CampaignId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns SET
                status = 'pending',
                error_message = NULL,
                next_check_at = NULL,
                ack_received_at = NULL,
                ack_timeout_minutes = NULL,
                started_at = NULL,
                completed_at = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status IN ('sending', 'error')
            "#,
        )
        .bind(id)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}
