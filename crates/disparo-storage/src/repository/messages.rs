//! Message template repository

use crate::db::DatabasePool;
use crate::models::Message;
use async_trait::async_trait;
use disparo_common::types::MessageId;
use disparo_common::{Error, Result};

/// Message repository trait
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn get(&self, id: MessageId) -> Result<Option<Message>>;
}

/// Database message repository
pub struct DbMessageRepository {
    pool: DatabasePool,
}

impl DbMessageRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for DbMessageRepository {
    async fn get(&self, id: MessageId) -> Result<Option<Message>> {
        sqlx::query_as::<_, Message>("SELECT * FROM messages WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}
