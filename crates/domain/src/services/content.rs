//! Content normalization.
//!
//! Stored content arrives as plain text, large object handles or arbitrary
//! column values. Everything is turned into plain strings here so the rest of
//! the dispatcher never sees dynamic values.

use std::io;
use thiserror::Error;

use crate::models::{Row, RowValue, StringRow};

/// Reading a large text object failed.
#[derive(Debug, Error)]
#[error("Failed to read content from {handle}: {source}")]
pub struct ContentReadError {
    pub handle: String,
    #[source]
    pub source: io::Error,
}

/// Converts heterogeneous content into message-ready strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentNormalizer;

impl ContentNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Unify a stored value into plain text.
    ///
    /// Large objects are read in full, bounded by their reported length.
    pub fn to_text(&self, value: &RowValue) -> Result<String, ContentReadError> {
        match value {
            RowValue::Null => Ok(String::new()),
            RowValue::Text(text) => Ok(text.clone()),
            RowValue::LargeText(lob) => {
                let read_error = |source| ContentReadError {
                    handle: lob.handle(),
                    source,
                };

                let length = lob.length().map_err(read_error)?;
                if length == 0 {
                    return Ok(String::new());
                }
                lob.read(length).map_err(read_error)
            }
            other => Ok(other.to_string()),
        }
    }

    /// Split a comma separated list, trimming tokens and dropping blanks.
    pub fn parse_list(&self, csv: Option<&str>) -> Vec<String> {
        shared::parse_list(csv)
    }

    /// Stringify rows for table rendering.
    ///
    /// Missing rows are skipped, key order is preserved and null values become
    /// empty strings.
    pub fn rows_to_string_maps(&self, rows: Option<&[Option<Row>]>) -> Vec<StringRow> {
        let Some(rows) = rows else {
            return Vec::new();
        };

        rows.iter()
            .flatten()
            .map(|row| row.map_values(RowValue::to_string))
            .collect()
    }
}
