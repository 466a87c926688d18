//! Domain models for the mail dispatcher.

pub mod message;
pub mod queue_entry;
pub mod recipient;
pub mod row;
pub mod send_log;

pub use message::MailMessage;
pub use queue_entry::{QueueEntry, QueueStatus, Severity};
pub use recipient::{recipients_from_list, serialize_recipients, Recipient};
pub use row::{LargeText, LoadedLargeObject, QueryParams, Row, RowValue, StringRow};
pub use send_log::{MailType, SendLogEntry, SendStatus};
