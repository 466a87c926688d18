use domain::models::MailType;
use domain::services::DispatcherSettings;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

/// Headroom above the mail timeout for detail queries and queue updates.
const CLAIM_LEASE_MARGIN_SECS: u64 = 30;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub dispatcher: DispatcherConfig,
    /// Mail transport configuration
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Queue polling configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatcherConfig {
    /// Whether the dispatch jobs are scheduled at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between poll cycles
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Maximum entries claimed per cycle
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,

    /// Retries allowed after the first failed attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: i32,

    /// Independent polling workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// How long a claim protects an entry from other workers
    #[serde(default = "default_claim_lease")]
    pub claim_lease_secs: u64,

    /// Recorded on every send log row: alarm, report or notice
    #[serde(default = "default_mail_type")]
    pub mail_type: String,
}

/// Mail transport configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    /// Provider: console (development), smtp or sendgrid
    #[serde(default = "default_mail_provider")]
    pub provider: String,

    /// Sender email address (From header)
    #[serde(default = "default_sender_email")]
    pub sender_email: String,

    /// Sender name (From header)
    #[serde(default = "default_sender_name")]
    pub sender_name: String,

    #[serde(default)]
    pub smtp_host: String,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    #[serde(default)]
    pub smtp_username: String,

    #[serde(default)]
    pub smtp_password: String,

    /// Whether to use TLS for SMTP (default: true)
    #[serde(default = "default_true")]
    pub smtp_use_tls: bool,

    #[serde(default)]
    pub sendgrid_api_key: String,

    #[serde(default = "default_sendgrid_base_url")]
    pub sendgrid_base_url: String,

    /// Upper bound for a single send
    #[serde(default = "default_mail_timeout")]
    pub timeout_secs: u64,

    /// Address recorded as the send log's ip_address
    #[serde(default)]
    pub source_address: Option<String>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            provider: default_mail_provider(),
            sender_email: default_sender_email(),
            sender_name: default_sender_name(),
            smtp_host: String::new(),
            smtp_port: default_smtp_port(),
            smtp_username: String::new(),
            smtp_password: String::new(),
            smtp_use_tls: true,
            sendgrid_api_key: String::new(),
            sendgrid_base_url: default_sendgrid_base_url(),
            timeout_secs: default_mail_timeout(),
            source_address: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_addr")]
    pub listen_addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: default_metrics_addr(),
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}
fn default_max_connections() -> u32 {
    10
}
fn default_min_connections() -> u32 {
    2
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_poll_interval() -> u64 {
    60
}
fn default_batch_size() -> i64 {
    50
}
fn default_max_retries() -> i32 {
    3
}
fn default_workers() -> usize {
    1
}
fn default_claim_lease() -> u64 {
    300
}
fn default_mail_type() -> String {
    "alarm".to_string()
}
fn default_mail_provider() -> String {
    "console".to_string()
}
fn default_sender_email() -> String {
    "noreply@localhost.localdomain".to_string()
}
fn default_sender_name() -> String {
    "Mail Dispatcher".to_string()
}
fn default_smtp_port() -> u16 {
    587 // TLS submission port
}
fn default_sendgrid_base_url() -> String {
    "https://api.sendgrid.com".to_string()
}
fn default_mail_timeout() -> u64 {
    30
}
fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with MD__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("MD").separator("__"))
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration for testing from embedded defaults plus overrides.
    #[cfg(test)]
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [database]
            url = ""
            max_connections = 10
            min_connections = 2

            [logging]
            level = "info"
            format = "json"

            [dispatcher]
            enabled = true
            poll_interval_secs = 60
            batch_size = 50
            max_retries = 3
            workers = 1
            claim_lease_secs = 300
            mail_type = "alarm"

            [mail]
            provider = "console"
            sender_email = "alerts@example.com"
            sender_name = "Test"
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        // Validation is left to the test
        builder.build()?.try_deserialize()
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "MD__DATABASE__URL environment variable must be set".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        let dispatcher = &self.dispatcher;
        if dispatcher.batch_size <= 0 {
            return Err(ConfigValidationError::InvalidValue(
                "dispatcher.batch_size must be positive".to_string(),
            ));
        }
        if dispatcher.max_retries <= 0 {
            return Err(ConfigValidationError::InvalidValue(
                "dispatcher.max_retries must be positive".to_string(),
            ));
        }
        if dispatcher.workers == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "dispatcher.workers must be at least 1".to_string(),
            ));
        }
        if dispatcher.poll_interval_secs == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "dispatcher.poll_interval_secs cannot be 0".to_string(),
            ));
        }
        if dispatcher.claim_lease_secs == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "dispatcher.claim_lease_secs cannot be 0".to_string(),
            ));
        }
        // The lease must outlive the slowest send, or a second worker can claim mid-delivery
        let min_lease = self.mail.timeout_secs + CLAIM_LEASE_MARGIN_SECS;
        if dispatcher.claim_lease_secs < min_lease {
            return Err(ConfigValidationError::InvalidValue(format!(
                "dispatcher.claim_lease_secs ({}) must be at least mail.timeout_secs + {} ({})",
                dispatcher.claim_lease_secs, CLAIM_LEASE_MARGIN_SECS, min_lease
            )));
        }
        if dispatcher.mail_type.parse::<MailType>().is_err() {
            return Err(ConfigValidationError::InvalidValue(format!(
                "dispatcher.mail_type '{}' is not one of alarm, report, notice",
                dispatcher.mail_type
            )));
        }

        self.validate_mail()?;

        if self.metrics.enabled && self.metrics.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigValidationError::InvalidValue(format!(
                "metrics.listen_addr '{}' is not a socket address",
                self.metrics.listen_addr
            )));
        }

        Ok(())
    }

    fn validate_mail(&self) -> Result<(), ConfigValidationError> {
        let mail = &self.mail;

        if shared::validation::validate_email_address(&mail.sender_email).is_err() {
            return Err(ConfigValidationError::InvalidValue(format!(
                "mail.sender_email '{}' is not a valid address",
                mail.sender_email
            )));
        }

        match mail.provider.as_str() {
            "console" => Ok(()),
            "smtp" if mail.smtp_host.is_empty() => Err(ConfigValidationError::MissingRequired(
                "MD__MAIL__SMTP_HOST must be set for the smtp provider".to_string(),
            )),
            "smtp" => Ok(()),
            "sendgrid" if mail.sendgrid_api_key.is_empty() => {
                Err(ConfigValidationError::MissingRequired(
                    "MD__MAIL__SENDGRID_API_KEY must be set for the sendgrid provider".to_string(),
                ))
            }
            "sendgrid" => Ok(()),
            other => Err(ConfigValidationError::InvalidValue(format!(
                "Unknown mail provider '{}'",
                other
            ))),
        }
    }

    /// Pool settings for the persistence layer.
    pub fn pool_config(&self) -> persistence::db::DatabaseConfig {
        persistence::db::DatabaseConfig {
            url: self.database.url.clone(),
            max_connections: self.database.max_connections,
            min_connections: self.database.min_connections,
            connect_timeout_secs: self.database.connect_timeout_secs,
            idle_timeout_secs: self.database.idle_timeout_secs,
        }
    }

    /// Settings handed to each queue dispatcher.
    pub fn dispatcher_settings(&self) -> DispatcherSettings {
        DispatcherSettings {
            batch_size: self.dispatcher.batch_size,
            max_retries: self.dispatcher.max_retries,
            claim_lease: Duration::from_secs(self.dispatcher.claim_lease_secs),
            mail_type: self.dispatcher.mail_type.parse().unwrap_or(MailType::Alarm),
            sender_email: self.mail.sender_email.clone(),
            ip_address: self.mail.source_address.clone(),
        }
    }

    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics.listen_addr.parse().ok()
    }
}
