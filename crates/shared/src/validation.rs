//! Common validation utilities.

use validator::ValidationError;

lazy_static::lazy_static! {
    /// Conservative address pattern: local part, `@`, domain, dot, alphabetic TLD.
    ///
    /// Stricter than RFC 5322 on purpose; anything rejected here would most
    /// likely be refused by the relay anyway.
    pub static ref EMAIL_ADDRESS_REGEX: regex::Regex =
        regex::Regex::new(r"^[A-Za-z0-9+_.-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap();
}

/// Returns true when `address` matches [`EMAIL_ADDRESS_REGEX`].
pub fn is_well_formed_address(address: &str) -> bool {
    EMAIL_ADDRESS_REGEX.is_match(address)
}

/// Validates a single address, in the shape `validator` custom checks expect.
pub fn validate_email_address(address: &str) -> Result<(), ValidationError> {
    if address.trim().is_empty() {
        let mut err = ValidationError::new("email_missing");
        err.message = Some("Email address is required".into());
        return Err(err);
    }

    if is_well_formed_address(address) {
        Ok(())
    } else {
        let mut err = ValidationError::new("email_format");
        err.message = Some("Email address is malformed".into());
        Err(err)
    }
}
