//! Mail transport providers.
//!
//! Supports multiple providers:
//! - `console`: Logs mail to console (development)
//! - `smtp`: Sends via SMTP server using lettre
//! - `sendgrid`: Uses the SendGrid v3 API

use async_trait::async_trait;
use domain::models::{serialize_recipients, MailMessage, Recipient};
use domain::services::{MailTransport, TransportError};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::MailConfig;

enum Provider {
    Console,
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    SendGrid(reqwest::Client),
}

/// Mail service implementing the dispatcher's transport.
#[derive(Clone)]
pub struct MailService {
    config: Arc<MailConfig>,
    provider: Arc<Provider>,
}

impl MailService {
    /// Creates a new MailService for the configured provider.
    pub fn new(config: MailConfig) -> Result<Self, TransportError> {
        let timeout = Duration::from_secs(config.timeout_secs);

        let provider = match config.provider.as_str() {
            "console" => Provider::Console,
            "smtp" => Provider::Smtp(build_smtp_transport(&config, timeout)?),
            "sendgrid" => {
                if config.sendgrid_api_key.is_empty() {
                    return Err(TransportError::NotConfigured);
                }
                let client = reqwest::Client::builder()
                    .timeout(timeout)
                    .build()
                    .map_err(|e| TransportError::Provider(e.to_string()))?;
                Provider::SendGrid(client)
            }
            provider => {
                error!(provider = %provider, "Unknown mail provider");
                return Err(TransportError::NotConfigured);
            }
        };

        Ok(Self {
            config: Arc::new(config),
            provider: Arc::new(provider),
        })
    }

    pub fn provider_name(&self) -> &str {
        &self.config.provider
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// Console provider - logs mail to console (for development).
    async fn send_console(&self, message: &MailMessage) -> Result<(), TransportError> {
        info!(
            to = %serialize_recipients(&message.to),
            cc = %serialize_recipients(&message.cc),
            subject = %message.subject,
            from = %self.config.sender_email,
            from_name = %self.config.sender_name,
            "Mail (console provider)"
        );
        debug!(body_html_length = message.body_html.len(), "Mail body (HTML)");

        Ok(())
    }

    /// SMTP provider - sends via SMTP server.
    async fn send_smtp(
        &self,
        transport: &AsyncSmtpTransport<Tokio1Executor>,
        message: &MailMessage,
    ) -> Result<(), TransportError> {
        let email = self.build_smtp_message(message)?;

        transport
            .send(email)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        info!(
            to = %serialize_recipients(&message.to),
            subject = %message.subject,
            "Mail sent via SMTP"
        );
        Ok(())
    }

    fn build_smtp_message(&self, message: &MailMessage) -> Result<Message, TransportError> {
        let from = Mailbox::new(
            Some(self.config.sender_name.clone()),
            parse_address(&self.config.sender_email)?,
        );

        let mut builder = Message::builder().from(from).subject(&message.subject);
        for recipient in &message.to {
            builder = builder.to(mailbox(recipient)?);
        }
        for recipient in &message.cc {
            builder = builder.cc(mailbox(recipient)?);
        }

        builder
            .header(ContentType::TEXT_HTML)
            .body(message.body_html.clone())
            .map_err(|e| TransportError::SendFailed(format!("Failed to build message: {}", e)))
    }

    /// SendGrid provider - sends via SendGrid API.
    async fn send_sendgrid(
        &self,
        client: &reqwest::Client,
        message: &MailMessage,
    ) -> Result<(), TransportError> {
        let url = format!(
            "{}/v3/mail/send",
            self.config.sendgrid_base_url.trim_end_matches('/')
        );

        let response = client
            .post(url)
            .header(
                "Authorization",
                format!("Bearer {}", self.config.sendgrid_api_key),
            )
            .json(&self.sendgrid_payload(message))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::SendFailed(format!("SendGrid request failed: {}", e))
                }
            })?;

        if response.status().is_success() {
            info!(
                to = %serialize_recipients(&message.to),
                subject = %message.subject,
                "Mail sent via SendGrid"
            );
            Ok(())
        } else {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, error = %error_body, "SendGrid API error");
            Err(TransportError::Provider(format!(
                "SendGrid returned {}: {}",
                status, error_body
            )))
        }
    }

    fn sendgrid_payload(&self, message: &MailMessage) -> serde_json::Value {
        let mut personalization = serde_json::json!({
            "to": message.to.iter().map(sendgrid_address).collect::<Vec<_>>(),
        });
        if !message.cc.is_empty() {
            personalization["cc"] =
                serde_json::Value::Array(message.cc.iter().map(sendgrid_address).collect());
        }

        serde_json::json!({
            "personalizations": [personalization],
            "from": {
                "email": self.config.sender_email,
                "name": self.config.sender_name
            },
            "subject": message.subject,
            "content": [{
                "type": "text/html",
                "value": message.body_html
            }]
        })
    }
}

#[async_trait]
impl MailTransport for MailService {
    async fn send(&self, message: &MailMessage) -> Result<(), TransportError> {
        let send = async {
            match self.provider.as_ref() {
                Provider::Console => self.send_console(message).await,
                Provider::Smtp(transport) => self.send_smtp(transport, message).await,
                Provider::SendGrid(client) => self.send_sendgrid(client, message).await,
            }
        };

        tokio::time::timeout(self.timeout(), send)
            .await
            .map_err(|_| TransportError::Timeout)?
    }
}

fn build_smtp_transport(
    config: &MailConfig,
    timeout: Duration,
) -> Result<AsyncSmtpTransport<Tokio1Executor>, TransportError> {
    if config.smtp_host.is_empty() {
        return Err(TransportError::NotConfigured);
    }

    let builder = if config.smtp_use_tls {
        AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .map_err(|e| TransportError::Provider(format!("Failed to create SMTP relay: {}", e)))?
    } else {
        // Plain connection (local relays, Mailpit)
        AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
    };

    let builder = builder.port(config.smtp_port).timeout(Some(timeout));
    let builder = if config.smtp_username.is_empty() {
        builder
    } else {
        builder.credentials(Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.clone(),
        ))
    };

    Ok(builder.build())
}

fn parse_address(email: &str) -> Result<Address, TransportError> {
    email
        .trim()
        .parse::<Address>()
        .map_err(|_| TransportError::InvalidAddress(email.to_string()))
}

fn mailbox(recipient: &Recipient) -> Result<Mailbox, TransportError> {
    Ok(Mailbox::new(
        recipient.name.clone(),
        parse_address(&recipient.email)?,
    ))
}

fn sendgrid_address(recipient: &Recipient) -> serde_json::Value {
    match &recipient.name {
        Some(name) => serde_json::json!({ "email": recipient.email, "name": name }),
        None => serde_json::json!({ "email": recipient.email }),
    }
}
