//! Mail recipient configuration entity.

use chrono::{DateTime, Utc};
use domain::models::recipients_from_list;
use domain::services::RecipientSet;
use sqlx::FromRow;

/// Database row mapping for the mail_recipient table.
#[derive(Debug, Clone, FromRow)]
pub struct MailRecipientEntity {
    pub mail_source: String,
    pub to_list: Option<String>,
    pub cc_list: Option<String>,
    pub enabled: bool,
    pub updated_at: DateTime<Utc>,
}

impl MailRecipientEntity {
    /// Parse the comma separated lists. Disabled sources resolve to nobody.
    pub fn into_recipient_set(self) -> RecipientSet {
        if !self.enabled {
            return RecipientSet::default();
        }

        RecipientSet {
            to: recipients_from_list(self.to_list.as_deref()),
            cc: recipients_from_list(self.cc_list.as_deref()),
        }
    }
}
