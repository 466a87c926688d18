//! Recipient validation.
//!
//! Gatekeeper run before any message is handed to the transport. The check is
//! all-or-nothing: the first problem found is reported and nothing is filtered.

use std::collections::HashSet;
use thiserror::Error;

use crate::models::Recipient;

/// Reasons a recipient set is rejected. None of these are retriable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Recipient list is empty")]
    EmptyRecipients,

    #[error("Recipient #{index} has no email address")]
    MissingAddress { index: usize },

    #[error("Malformed email address: {address}")]
    MalformedAddress { address: String },

    #[error("Duplicate email address: {address}")]
    DuplicateAddress { address: String },
}

/// Validates recipient sets against the conservative address pattern.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecipientValidator;

impl RecipientValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a recipient set.
    ///
    /// Checks run in order: empty set, then per recipient missing or
    /// malformed address (first offender wins), then duplicates compared
    /// case-insensitively (first repeat wins).
    pub fn validate(&self, recipients: &[Recipient]) -> Result<(), ValidationError> {
        if recipients.is_empty() {
            return Err(ValidationError::EmptyRecipients);
        }

        for (index, recipient) in recipients.iter().enumerate() {
            if recipient.email.trim().is_empty() {
                return Err(ValidationError::MissingAddress { index });
            }
            if !shared::validation::is_well_formed_address(&recipient.email) {
                return Err(ValidationError::MalformedAddress {
                    address: recipient.email.clone(),
                });
            }
        }

        let mut seen = HashSet::with_capacity(recipients.len());
        for recipient in recipients {
            if !seen.insert(recipient.dedup_key()) {
                return Err(ValidationError::DuplicateAddress {
                    address: recipient.email.clone(),
                });
            }
        }

        Ok(())
    }

    /// Validate the union of `to` and `cc`; an address may not appear in both.
    pub fn validate_message(
        &self,
        to: &[Recipient],
        cc: &[Recipient],
    ) -> Result<(), ValidationError> {
        if to.is_empty() {
            return Err(ValidationError::EmptyRecipients);
        }

        let all: Vec<Recipient> = to.iter().chain(cc.iter()).cloned().collect();
        self.validate(&all)
    }
}
