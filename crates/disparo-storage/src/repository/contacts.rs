//! Contact repository

use crate::db::DatabasePool;
use crate::models::Contact;
use async_trait::async_trait;
use disparo_common::types::ContactId;
use disparo_common::{Error, Result};
use std::collections::HashMap;

/// Contact repository trait
#[async_trait]
pub trait ContactRepository: Send + Sync {
    async fn get(&self, id: ContactId) -> Result<Option<Contact>>;

    /// Fetch contacts in the order of `ids`, skipping ids that no longer exist
    async fn get_many(&self, ids: &[ContactId]) -> Result<Vec<Contact>>;
}

/// Database contact repository
pub struct DbContactRepository {
    pool: DatabasePool,
}

impl DbContactRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContactRepository for DbContactRepository {
    async fn get(&self, id: ContactId) -> Result<Option<Contact>> {
        sqlx::query_as::<_, Contact>("SELECT * FROM contacts WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get_many(&self, ids: &[ContactId]) -> Result<Vec<Contact>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, Contact>("SELECT * FROM contacts WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        let mut by_id: HashMap<ContactId, Contact> =
            rows.into_iter().map(|c| (c.id, c)).collect();

        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }
}
