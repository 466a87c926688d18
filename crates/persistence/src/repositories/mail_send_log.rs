//! Mail send log repository.
//!
//! Append-only: rows are inserted once and never updated.

use async_trait::async_trait;
use domain::models::SendLogEntry;
use domain::services::{MailSendLogger, PersistenceError};
use sqlx::PgPool;

use crate::entities::mail_send_log::{truncate_error_message, MailSendLogEntity};
use crate::metrics::QueryTimer;

/// Repository for mail send log records.
pub struct MailSendLogRepository {
    pool: PgPool,
}

impl MailSendLogRepository {
    /// Create a new repository instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a log record and return its ID.
    pub async fn insert(&self, entry: &SendLogEntry) -> Result<i64, sqlx::Error> {
        let timer = QueryTimer::new("mail_send_log_insert");
        let result: Result<(i64,), sqlx::Error> = sqlx::query_as(
            r#"
            INSERT INTO mail_send_log (
                mail_type, mail_source, subject, recipients, cc_recipients, body_html,
                send_status, error_message, retry_count, send_date, sender_email,
                ip_address, reg_date
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id
            "#,
        )
        .bind(entry.mail_type.as_str())
        .bind(&entry.mail_source)
        .bind(&entry.subject)
        .bind(&entry.recipients)
        .bind(&entry.cc_recipients)
        .bind(&entry.body_html)
        .bind(entry.send_status.as_str())
        .bind(entry.error_message.as_deref().map(truncate_error_message))
        .bind(entry.retry_count)
        .bind(entry.send_date)
        .bind(&entry.sender_email)
        .bind(&entry.ip_address)
        .bind(entry.reg_date)
        .fetch_one(&self.pool)
        .await;
        timer.record();

        Ok(result?.0)
    }

    /// Most recent records for a mail source.
    pub async fn find_by_mail_source(
        &self,
        mail_source: &str,
        limit: i64,
    ) -> Result<Vec<MailSendLogEntity>, sqlx::Error> {
        sqlx::query_as::<_, MailSendLogEntity>(
            r#"
            SELECT id, mail_type, mail_source, subject, recipients, cc_recipients, body_html,
                   send_status, error_message, retry_count, send_date, sender_email,
                   ip_address, reg_date
            FROM mail_send_log
            WHERE mail_source = $1
            ORDER BY reg_date DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(mail_source)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}

#[async_trait]
impl MailSendLogger for MailSendLogRepository {
    async fn record(&self, entry: &SendLogEntry) -> Result<i64, PersistenceError> {
        self.insert(entry)
            .await
            .map_err(|e| PersistenceError(e.to_string()))
    }
}
