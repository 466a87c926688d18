//! Mail recipient repository.

use async_trait::async_trait;
use domain::services::{RecipientSet, RecipientSource, StoreError};
use sqlx::PgPool;

use crate::entities::MailRecipientEntity;

/// Repository for per-source recipient configuration.
pub struct MailRecipientRepository {
    pool: PgPool,
}

impl MailRecipientRepository {
    /// Create a new repository instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find the recipient configuration for a mail source.
    pub async fn find_by_mail_source(
        &self,
        mail_source: &str,
    ) -> Result<Option<MailRecipientEntity>, sqlx::Error> {
        sqlx::query_as::<_, MailRecipientEntity>(
            r#"
            SELECT mail_source, to_list, cc_list, enabled, updated_at
            FROM mail_recipient
            WHERE mail_source = $1
            "#,
        )
        .bind(mail_source)
        .fetch_optional(&self.pool)
        .await
    }
}

#[async_trait]
impl RecipientSource for MailRecipientRepository {
    async fn resolve(&self, mail_source: &str) -> Result<RecipientSet, StoreError> {
        let entity = self
            .find_by_mail_source(mail_source)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(entity
            .map(MailRecipientEntity::into_recipient_set)
            .unwrap_or_default())
    }
}
