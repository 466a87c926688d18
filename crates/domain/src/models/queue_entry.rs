//! Mail queue entry domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::row::RowValue;

// ============================================================================
// Queue Status Enum
// ============================================================================

/// Lifecycle state of a queue entry.
///
/// `Pending` is re-entrant: a retriable failure leaves the entry pending with
/// a higher retry count. `Success` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    Pending,
    Success,
    Failed,
}

impl QueueStatus {
    /// Returns the string representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "PENDING",
            QueueStatus::Success => "SUCCESS",
            QueueStatus::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            QueueStatus::Pending => false,
            QueueStatus::Success | QueueStatus::Failed => true,
        }
    }

    /// Check if transition to target state is valid.
    pub fn can_transition_to(&self, target: QueueStatus) -> bool {
        match (self, target) {
            (QueueStatus::Pending, QueueStatus::Pending) => true,
            (QueueStatus::Pending, QueueStatus::Success) => true,
            (QueueStatus::Pending, QueueStatus::Failed) => true,
            // Terminal rows are never reprocessed
            (QueueStatus::Success, _) | (QueueStatus::Failed, _) => false,
        }
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for QueueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(QueueStatus::Pending),
            "SUCCESS" => Ok(QueueStatus::Success),
            "FAILED" => Ok(QueueStatus::Failed),
            _ => Err(format!(
                "Invalid queue status: {}. Must be one of: PENDING, SUCCESS, FAILED",
                s
            )),
        }
    }
}

// ============================================================================
// Severity Enum
// ============================================================================

/// Alarm severity carried by a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    /// Returns the string representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INFO" => Ok(Severity::Info),
            "WARNING" => Ok(Severity::Warning),
            "CRITICAL" => Ok(Severity::Critical),
            _ => Err(format!(
                "Invalid severity: {}. Must be one of: INFO, WARNING, CRITICAL",
                s
            )),
        }
    }
}

// ============================================================================
// Core Model
// ============================================================================

/// One unit of notification work, inserted by an external producer.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub id: i64,
    pub mail_source: String,
    pub alarm_name: String,
    pub severity: Severity,
    pub query_id: String,
    pub section_title: Option<String>,
    /// Plain text, a large object handle, or null.
    pub section_content: RowValue,
    pub status: QueueStatus,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl QueueEntry {
    /// Subject line: severity prefix followed by the alarm name.
    pub fn subject(&self) -> String {
        format!("[{}] {}", self.severity, self.alarm_name)
    }
}
