//! Mail queue repository.
//!
//! Every state change is a single conditional UPDATE. A worker owns a row
//! through `claimed_by` until its claim expires; completion updates only land
//! while that ownership and the retry count seen at claim time still hold.
//! A row with `sent_at` set is never claimed again, whatever its lease says.

use async_trait::async_trait;
use chrono::Utc;
use domain::models::{QueryParams, QueueEntry, QueueStatus, Row};
use domain::services::{Claim, QueueStore, StoreError};
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

use crate::entities::mail_queue::{MailQueueEntity, MAIL_QUEUE_COLUMNS};
use crate::entities::mail_send_log::truncate_error_message;
use crate::metrics::QueryTimer;
use crate::repositories::detail_query::DetailQueryRepository;

/// Repository for mail queue operations.
pub struct MailQueueRepository {
    pool: PgPool,
    detail_queries: DetailQueryRepository,
}

impl MailQueueRepository {
    /// Create a new repository instance.
    pub fn new(pool: PgPool) -> Self {
        Self {
            detail_queries: DetailQueryRepository::new(pool.clone()),
            pool,
        }
    }

    /// Oldest pending entries that nobody currently holds.
    pub async fn find_pending(&self, limit: i64) -> Result<Vec<MailQueueEntity>, sqlx::Error> {
        let timer = QueryTimer::new("mail_queue_find_pending");
        let sql = format!(
            r#"
            SELECT {MAIL_QUEUE_COLUMNS}
            FROM mail_queue q
            WHERE q.status = 'PENDING'
              AND q.sent_at IS NULL
              AND (q.claimed_by IS NULL OR q.claim_expires_at <= NOW())
            ORDER BY q.created_at ASC, q.id ASC
            LIMIT $1
            "#
        );
        let result = sqlx::query_as::<_, MailQueueEntity>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await;
        timer.record();
        result
    }

    /// Take ownership of a pending entry for `lease`.
    ///
    /// Returns false when the row is no longer pending, its retry count moved
    /// on, or another worker holds an unexpired claim.
    pub async fn try_claim(
        &self,
        id: i64,
        expected_retry_count: i32,
        worker_id: Uuid,
        lease: Duration,
    ) -> Result<bool, sqlx::Error> {
        let now = Utc::now();
        let expires_at = now
            + chrono::Duration::from_std(lease).unwrap_or_else(|_| chrono::Duration::seconds(300));

        let timer = QueryTimer::new("mail_queue_claim");
        let result = sqlx::query(
            r#"
            UPDATE mail_queue
            SET claimed_by = $3,
                claimed_at = $4,
                claim_expires_at = $5
            WHERE id = $1
              AND status = 'PENDING'
              AND retry_count = $2
              AND sent_at IS NULL
              AND (claimed_by IS NULL OR claim_expires_at <= $4)
            "#,
        )
        .bind(id)
        .bind(expected_retry_count)
        .bind(worker_id)
        .bind(now)
        .bind(expires_at)
        .execute(&self.pool)
        .await;
        timer.record();

        Ok(result?.rows_affected() == 1)
    }

    /// Mark a claimed entry as sent and release the claim.
    pub async fn complete_success(
        &self,
        id: i64,
        worker_id: Uuid,
        expected_retry_count: i32,
    ) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("mail_queue_mark_success");
        let result = sqlx::query(
            r#"
            UPDATE mail_queue
            SET status = 'SUCCESS',
                sent_at = COALESCE(sent_at, NOW()),
                claimed_by = NULL,
                claimed_at = NULL,
                claim_expires_at = NULL,
                updated_at = NOW()
            WHERE id = $1
              AND status = 'PENDING'
              AND claimed_by = $2
              AND retry_count = $3
            "#,
        )
        .bind(id)
        .bind(worker_id)
        .bind(expected_retry_count)
        .execute(&self.pool)
        .await;
        timer.record();

        Ok(result?.rows_affected() == 1)
    }

    /// Flag a claimed entry as sent while keeping it `PENDING` and owned.
    pub async fn mark_sent(
        &self,
        id: i64,
        worker_id: Uuid,
        expected_retry_count: i32,
    ) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("mail_queue_hold_sent");
        let result = sqlx::query(
            r#"
            UPDATE mail_queue
            SET sent_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
              AND status = 'PENDING'
              AND claimed_by = $2
              AND retry_count = $3
            "#,
        )
        .bind(id)
        .bind(worker_id)
        .bind(expected_retry_count)
        .execute(&self.pool)
        .await;
        timer.record();

        Ok(result?.rows_affected() == 1)
    }

    /// Record a failed attempt and release the claim.
    pub async fn record_failure(
        &self,
        id: i64,
        worker_id: Uuid,
        expected_retry_count: i32,
        next_retry_count: i32,
        status: QueueStatus,
        error_message: &str,
    ) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("mail_queue_mark_failed");
        let result = sqlx::query(
            r#"
            UPDATE mail_queue
            SET status = $4,
                retry_count = $5,
                error_message = $6,
                claimed_by = NULL,
                claimed_at = NULL,
                claim_expires_at = NULL,
                updated_at = NOW()
            WHERE id = $1
              AND status = 'PENDING'
              AND claimed_by = $2
              AND retry_count = $3
            "#,
        )
        .bind(id)
        .bind(worker_id)
        .bind(expected_retry_count)
        .bind(status.as_str())
        .bind(next_retry_count)
        .bind(truncate_error_message(error_message))
        .execute(&self.pool)
        .await;
        timer.record();

        Ok(result?.rows_affected() == 1)
    }
}

fn store_error(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

#[async_trait]
impl QueueStore for MailQueueRepository {
    async fn fetch_pending(&self, limit: i64) -> Result<Vec<QueueEntry>, StoreError> {
        let entities = self.find_pending(limit).await.map_err(store_error)?;
        Ok(entities.into_iter().map(QueueEntry::from).collect())
    }

    async fn claim(
        &self,
        entry: &QueueEntry,
        worker_id: Uuid,
        lease: Duration,
    ) -> Result<Option<Claim>, StoreError> {
        let claimed = self
            .try_claim(entry.id, entry.retry_count, worker_id, lease)
            .await
            .map_err(store_error)?;

        Ok(claimed.then(|| Claim {
            entry_id: entry.id,
            worker_id,
            retry_count: entry.retry_count,
        }))
    }

    async fn fetch_detail_rows(
        &self,
        query_id: &str,
        params: &QueryParams,
    ) -> Result<Vec<Row>, StoreError> {
        self.detail_queries.fetch_rows(query_id, params).await
    }

    async fn mark_success(&self, claim: &Claim) -> Result<bool, StoreError> {
        self.complete_success(claim.entry_id, claim.worker_id, claim.retry_count)
            .await
            .map_err(store_error)
    }

    async fn hold_sent(&self, claim: &Claim) -> Result<bool, StoreError> {
        self.mark_sent(claim.entry_id, claim.worker_id, claim.retry_count)
            .await
            .map_err(store_error)
    }

    async fn mark_failed(
        &self,
        claim: &Claim,
        error_message: &str,
        next_retry_count: i32,
        status: QueueStatus,
    ) -> Result<bool, StoreError> {
        self.record_failure(
            claim.entry_id,
            claim.worker_id,
            claim.retry_count,
            next_retry_count,
            status,
            error_message,
        )
        .await
        .map_err(store_error)
    }
}
