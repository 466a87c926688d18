//! Mail transport abstraction.
//!
//! SMTP and provider details live behind this trait. Every error it returns
//! is treated as transient by the dispatcher, timeouts included.

use thiserror::Error;

use crate::models::{serialize_recipients, MailMessage};

/// Errors that can occur while handing a message to the transport.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Mail transport not configured")]
    NotConfigured,

    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    #[error("Failed to send email: {0}")]
    SendFailed(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Mail transport timed out")]
    Timeout,
}

/// Delivers fully built messages.
#[async_trait::async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<(), TransportError>;
}

/// Mock transport for development and testing.
///
/// Logs messages but doesn't actually send them.
#[derive(Debug, Clone, Default)]
pub struct MockMailTransport {
    /// Whether to simulate failures for testing.
    pub simulate_failure: bool,
}

impl MockMailTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self {
            simulate_failure: false,
        }
    }

    /// Create a mock transport that simulates failures.
    pub fn failing() -> Self {
        Self {
            simulate_failure: true,
        }
    }
}

#[async_trait::async_trait]
impl MailTransport for MockMailTransport {
    async fn send(&self, message: &MailMessage) -> Result<(), TransportError> {
        if self.simulate_failure {
            tracing::warn!(
                subject = %message.subject,
                "Mock mail transport simulating failure"
            );
            return Err(TransportError::SendFailed("Simulated failure".to_string()));
        }

        tracing::info!(
            subject = %message.subject,
            to = %serialize_recipients(&message.to),
            cc = %serialize_recipients(&message.cc),
            body_length = message.body_html.len(),
            "Mock: Would send mail"
        );

        Ok(())
    }
}
