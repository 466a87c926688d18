//! Mail queue entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{LargeText, LoadedLargeObject, QueueEntry, QueueStatus, RowValue, Severity};
use sqlx::FromRow;
use std::io;

/// Database row mapping for the mail_queue table.
///
/// Large object bodies are read in the same statement with `lo_get`, so
/// `section_content_lob` is only populated when `section_content_oid` points
/// at an existing object.
#[derive(Debug, Clone, FromRow)]
pub struct MailQueueEntity {
    pub id: i64,
    pub mail_source: String,
    pub alarm_name: String,
    pub severity: String,
    pub query_id: String,
    pub section_title: Option<String>,
    pub section_content: Option<String>,
    pub section_content_oid: Option<i64>,
    pub section_content_lob: Option<Vec<u8>>,
    pub status: String,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Columns selected for every queue read.
pub const MAIL_QUEUE_COLUMNS: &str = r#"
    q.id, q.mail_source, q.alarm_name, q.severity, q.query_id, q.section_title,
    q.section_content, q.section_content_oid::BIGINT AS section_content_oid,
    CASE
        WHEN EXISTS (SELECT 1 FROM pg_largeobject_metadata m WHERE m.oid = q.section_content_oid)
        THEN lo_get(q.section_content_oid)
    END AS section_content_lob,
    q.status, q.retry_count, q.error_message, q.created_at, q.updated_at
"#;

/// A large object referenced by a queue row that no longer exists.
#[derive(Debug)]
pub struct MissingLargeObject {
    oid: i64,
}

impl LargeText for MissingLargeObject {
    fn handle(&self) -> String {
        format!("lo:{}", self.oid)
    }

    fn length(&self) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("large object {} does not exist", self.oid),
        ))
    }

    fn read(&self, _len: u64) -> io::Result<String> {
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("large object {} does not exist", self.oid),
        ))
    }
}

impl MailQueueEntity {
    /// Convert to domain model.
    pub fn into_domain(self) -> QueueEntry {
        let severity = self.severity.parse::<Severity>().unwrap_or_else(|_| {
            tracing::warn!(queue_id = self.id, severity = %self.severity, "Unknown severity");
            Severity::Info
        });

        // Unknown status is never dispatched
        let status = self
            .status
            .parse::<QueueStatus>()
            .unwrap_or(QueueStatus::Failed);

        let section_content = match (self.section_content_oid, self.section_content_lob) {
            (Some(oid), Some(bytes)) => RowValue::large_text(LoadedLargeObject::new(oid as u32, bytes)),
            (Some(oid), None) => RowValue::large_text(MissingLargeObject { oid }),
            (None, _) => RowValue::from(self.section_content),
        };

        QueueEntry {
            id: self.id,
            mail_source: self.mail_source,
            alarm_name: self.alarm_name,
            severity,
            query_id: self.query_id,
            section_title: self.section_title,
            section_content,
            status,
            retry_count: self.retry_count,
            error_message: self.error_message,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl From<MailQueueEntity> for QueueEntry {
    fn from(entity: MailQueueEntity) -> Self {
        entity.into_domain()
    }
}
