//! Outbound mail message handed to the transport.

use super::recipient::Recipient;

/// A fully built message ready for delivery.
#[derive(Debug, Clone)]
pub struct MailMessage {
    pub subject: String,
    pub to: Vec<Recipient>,
    pub cc: Vec<Recipient>,
    pub body_html: String,
}
