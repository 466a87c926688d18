//! Repository implementations.

pub mod detail_query;
pub mod mail_queue;
pub mod mail_recipient;
pub mod mail_send_log;

pub use detail_query::DetailQueryRepository;
pub use mail_queue::MailQueueRepository;
pub use mail_recipient::MailRecipientRepository;
pub use mail_send_log::MailSendLogRepository;
