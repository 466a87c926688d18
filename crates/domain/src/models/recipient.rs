//! Mail recipient domain model.

use serde::{Deserialize, Serialize};

/// A destination address with optional display metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Recipient {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Recipient {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Key used for duplicate detection: the trimmed, lowercased address.
    pub fn dedup_key(&self) -> String {
        self.email.trim().to_lowercase()
    }
}

/// Serialize recipients into the comma separated form stored in the send log.
pub fn serialize_recipients(recipients: &[Recipient]) -> String {
    shared::join_list(
        &recipients
            .iter()
            .map(|r| r.email.as_str())
            .collect::<Vec<_>>(),
    )
}

/// Build recipients from a stored comma separated list.
pub fn recipients_from_list(csv: Option<&str>) -> Vec<Recipient> {
    shared::parse_list(csv)
        .into_iter()
        .map(Recipient::new)
        .collect()
}
