//! Comma separated list helpers.
//!
//! Recipient lists and query parameter names are stored as a single
//! comma separated column.

/// Splits `csv` on commas, trimming each token and dropping empty ones.
///
/// `None` and blank input both yield an empty list. Token order is kept.
pub fn parse_list(csv: Option<&str>) -> Vec<String> {
    let Some(csv) = csv else {
        return Vec::new();
    };

    csv.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Joins tokens back into the stored comma separated form.
pub fn join_list<S: AsRef<str>>(tokens: &[S]) -> String {
    tokens
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(",")
}
