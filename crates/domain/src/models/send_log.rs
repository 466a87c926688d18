//! Mail send log domain models.
//!
//! A send log entry is the append-only audit record of a terminal delivery
//! outcome. It is correlated with queue entries by mail source and time only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome recorded in the send log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SendStatus {
    Pending,
    Success,
    Failure,
}

impl SendStatus {
    /// Returns the string representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            SendStatus::Pending => "PENDING",
            SendStatus::Success => "SUCCESS",
            SendStatus::Failure => "FAILURE",
        }
    }
}

impl fmt::Display for SendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SendStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(SendStatus::Pending),
            "SUCCESS" => Ok(SendStatus::Success),
            "FAILURE" => Ok(SendStatus::Failure),
            _ => Err(format!(
                "Invalid send status: {}. Must be one of: PENDING, SUCCESS, FAILURE",
                s
            )),
        }
    }
}

/// Category of mail recorded in the send log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MailType {
    Alarm,
    Report,
    Notice,
}

impl MailType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MailType::Alarm => "ALARM",
            MailType::Report => "REPORT",
            MailType::Notice => "NOTICE",
        }
    }
}

impl fmt::Display for MailType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MailType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ALARM" => Ok(MailType::Alarm),
            "REPORT" => Ok(MailType::Report),
            "NOTICE" => Ok(MailType::Notice),
            _ => Err(format!(
                "Invalid mail type: {}. Must be one of: ALARM, REPORT, NOTICE",
                s
            )),
        }
    }
}

/// Audit record of one terminal send attempt. Never mutated once written.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SendLogEntry {
    pub mail_type: MailType,
    pub mail_source: String,
    pub subject: String,
    /// Comma separated `to` addresses.
    pub recipients: String,
    /// Comma separated `cc` addresses.
    pub cc_recipients: Option<String>,
    pub body_html: String,
    pub send_status: SendStatus,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub send_date: DateTime<Utc>,
    pub sender_email: String,
    pub ip_address: Option<String>,
    pub reg_date: DateTime<Utc>,
}
