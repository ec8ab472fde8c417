//! Repository layer for data access

pub mod audit_logs;
pub mod campaigns;
pub mod contacts;
pub mod conversations;
pub mod messages;
pub mod recovery_rules;

use crate::db::DatabasePool;
use crate::memory::MemoryStore;
use std::sync::Arc;

// Re-export repository traits
pub use audit_logs::AuditLogRepository;
pub use campaigns::CampaignRepository;
pub use contacts::ContactRepository;
pub use conversations::ConversationRepository;
pub use messages::MessageRepository;
pub use recovery_rules::{FlowStepRepository, RecoveryRuleRepository};

// Re-export database implementations
pub use audit_logs::DbAuditLogRepository;
pub use campaigns::DbCampaignRepository;
pub use contacts::DbContactRepository;
pub use conversations::DbConversationRepository;
pub use messages::DbMessageRepository;
pub use recovery_rules::{DbFlowStepRepository, DbRecoveryRuleRepository};

/// The set of repositories the scheduling core works against
#[derive(Clone)]
pub struct Repositories {
    pub campaigns: Arc<dyn CampaignRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub contacts: Arc<dyn ContactRepository>,
    pub rules: Arc<dyn RecoveryRuleRepository>,
    pub flow_steps: Arc<dyn FlowStepRepository>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub audit: Arc<dyn AuditLogRepository>,
}

impl Repositories {
    /// PostgreSQL-backed repositories sharing one pool
    pub fn postgres(pool: DatabasePool) -> Self {
        Self {
            campaigns: Arc::new(DbCampaignRepository::new(pool.clone())),
            messages: Arc::new(DbMessageRepository::new(pool.clone())),
            contacts: Arc::new(DbContactRepository::new(pool.clone())),
            rules: Arc::new(DbRecoveryRuleRepository::new(pool.clone())),
            flow_steps: Arc::new(DbFlowStepRepository::new(pool.clone())),
            conversations: Arc::new(DbConversationRepository::new(pool.clone())),
            audit: Arc::new(DbAuditLogRepository::new(pool)),
        }
    }

    /// Repositories backed by a single in-memory store
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            campaigns: store.clone(),
            messages: store.clone(),
            contacts: store.clone(),
            rules: store.clone(),
            flow_steps: store.clone(),
            conversations: store.clone(),
            audit: store,
        }
    }
}
