//! Recovery rule and flow step repositories

use crate::db::DatabasePool;
use crate::models::{RecoveryFlowStep, RecoveryRule};
use async_trait::async_trait;
use disparo_common::types::RuleId;
use disparo_common::{Error, Result};

/// Recovery rule repository trait
#[async_trait]
pub trait RecoveryRuleRepository: Send + Sync {
    async fn get(&self, id: RuleId) -> Result<Option<RecoveryRule>>;

    /// Active rules in a stable order (creation time, then id)
    async fn list_active(&self) -> Result<Vec<RecoveryRule>>;
}

/// Flow step repository trait
#[async_trait]
pub trait FlowStepRepository: Send + Sync {
    /// The active step of `rule_id` at `sequence_order`, if any
    async fn find_active(
        &self,
        rule_id: RuleId,
        sequence_order: i32,
    ) -> Result<Option<RecoveryFlowStep>>;
}

/// Database recovery rule repository
pub struct DbRecoveryRuleRepository {
    pool: DatabasePool,
}

impl DbRecoveryRuleRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecoveryRuleRepository for DbRecoveryRuleRepository {
    async fn get(&self, id: RuleId) -> Result<Option<RecoveryRule>> {
        sqlx::query_as::<_, RecoveryRule>("SELECT * FROM recovery_rules WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_active(&self) -> Result<Vec<RecoveryRule>> {
        sqlx::query_as::<_, RecoveryRule>(
            "SELECT * FROM recovery_rules WHERE active = true ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}

/// Database flow step repository
pub struct DbFlowStepRepository {
    pool: DatabasePool,
}

impl DbFlowStepRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FlowStepRepository for DbFlowStepRepository {
    async fn find_active(
        &self,
        rule_id: RuleId,
        sequence_order: i32,
    ) -> Result<Option<RecoveryFlowStep>> {
        sqlx::query_as::<_, RecoveryFlowStep>(
            r#"
            SELECT * FROM recovery_flow_steps
            WHERE rule_id = $1 AND sequence_order = $2 AND active = true
            "#,
        )
        .bind(rule_id)
        .bind(sequence_order)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
