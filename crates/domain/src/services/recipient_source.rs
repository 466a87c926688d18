//! Recipient resolution for a mail source.

use crate::models::Recipient;

use super::queue_store::StoreError;

/// Addresses configured for one mail source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipientSet {
    pub to: Vec<Recipient>,
    pub cc: Vec<Recipient>,
}

impl RecipientSet {
    pub fn is_empty(&self) -> bool {
        self.to.is_empty() && self.cc.is_empty()
    }
}

/// Looks up who should receive mail for a given mail source.
///
/// An unknown source resolves to an empty set, which validation rejects.
#[async_trait::async_trait]
pub trait RecipientSource: Send + Sync {
    async fn resolve(&self, mail_source: &str) -> Result<RecipientSet, StoreError>;
}
