//! Database entity definitions.

pub mod mail_detail_query;
pub mod mail_queue;
pub mod mail_recipient;
pub mod mail_send_log;

pub use mail_detail_query::MailDetailQueryEntity;
pub use mail_queue::MailQueueEntity;
pub use mail_recipient::MailRecipientEntity;
pub use mail_send_log::MailSendLogEntity;
