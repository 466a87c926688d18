//! Append-only send log writer.

use thiserror::Error;

use crate::models::SendLogEntry;

#[derive(Debug, Error)]
#[error("Failed to persist send log entry: {0}")]
pub struct PersistenceError(pub String);

/// Writes audit records of terminal send outcomes. There is no update or delete.
#[async_trait::async_trait]
pub trait MailSendLogger: Send + Sync {
    /// Append an entry and return its identifier.
    async fn record(&self, entry: &SendLogEntry) -> Result<i64, PersistenceError>;
}
