//! Mail send log entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database row mapping for the mail_send_log table.
#[derive(Debug, Clone, FromRow)]
pub struct MailSendLogEntity {
    pub id: i64,
    pub mail_type: String,
    pub mail_source: String,
    pub subject: String,
    pub recipients: String,
    pub cc_recipients: Option<String>,
    pub body_html: String,
    pub send_status: String,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub send_date: DateTime<Utc>,
    pub sender_email: String,
    pub ip_address: Option<String>,
    pub reg_date: DateTime<Utc>,
}

/// Send status values.
pub const SEND_STATUS_PENDING: &str = "PENDING";
pub const SEND_STATUS_SUCCESS: &str = "SUCCESS";
pub const SEND_STATUS_FAILURE: &str = "FAILURE";

/// Longest error text stored in the log.
pub const MAX_ERROR_MESSAGE_LEN: usize = 4000;

/// Cut an error message to the stored width on a character boundary.
pub fn truncate_error_message(message: &str) -> &str {
    match message.char_indices().nth(MAX_ERROR_MESSAGE_LEN) {
        Some((idx, _)) => &message[..idx],
        None => message,
    }
}
