//! Loosely typed values returned by catalog queries and stored content columns.

use chrono::{DateTime, Utc};
use shared::OrderedMap;
use std::fmt;
use std::io;
use std::sync::Arc;

/// Handle to a large text object whose content is read on demand.
pub trait LargeText: Send + Sync + fmt::Debug {
    /// Identifier of the referenced object, used in logs and errors.
    fn handle(&self) -> String;

    /// Length of the object as reported by the store.
    fn length(&self) -> io::Result<u64>;

    /// Read the first `len` bytes of the object as text.
    fn read(&self, len: u64) -> io::Result<String>;
}

/// Large object whose bytes were fetched together with the row.
#[derive(Debug, Clone)]
pub struct LoadedLargeObject {
    oid: u32,
    bytes: Vec<u8>,
}

impl LoadedLargeObject {
    pub fn new(oid: u32, bytes: Vec<u8>) -> Self {
        Self { oid, bytes }
    }
}

impl LargeText for LoadedLargeObject {
    fn handle(&self) -> String {
        format!("lo:{}", self.oid)
    }

    fn length(&self) -> io::Result<u64> {
        Ok(self.bytes.len() as u64)
    }

    fn read(&self, len: u64) -> io::Result<String> {
        let end = usize::try_from(len)
            .unwrap_or(usize::MAX)
            .min(self.bytes.len());

        String::from_utf8(self.bytes[..end].to_vec())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// A single loosely typed column value.
#[derive(Debug, Clone)]
pub enum RowValue {
    Null,
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    LargeText(Arc<dyn LargeText>),
}

impl RowValue {
    pub fn is_null(&self) -> bool {
        matches!(self, RowValue::Null)
    }

    pub fn large_text(handle: impl LargeText + 'static) -> Self {
        RowValue::LargeText(Arc::new(handle))
    }
}

/// Default string representation. `Null` renders as the empty string and a
/// large object renders as its handle, never its content.
impl fmt::Display for RowValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowValue::Null => Ok(()),
            RowValue::Text(s) => f.write_str(s),
            RowValue::Integer(i) => write!(f, "{}", i),
            RowValue::Float(v) => write!(f, "{}", v),
            RowValue::Bool(b) => write!(f, "{}", b),
            RowValue::Timestamp(ts) => write!(f, "{}", ts),
            RowValue::LargeText(lob) => f.write_str(&lob.handle()),
        }
    }
}

impl From<&str> for RowValue {
    fn from(value: &str) -> Self {
        RowValue::Text(value.to_string())
    }
}

impl From<String> for RowValue {
    fn from(value: String) -> Self {
        RowValue::Text(value)
    }
}

impl From<i64> for RowValue {
    fn from(value: i64) -> Self {
        RowValue::Integer(value)
    }
}

impl From<i32> for RowValue {
    fn from(value: i32) -> Self {
        RowValue::Integer(value as i64)
    }
}

impl From<f64> for RowValue {
    fn from(value: f64) -> Self {
        RowValue::Float(value)
    }
}

impl From<bool> for RowValue {
    fn from(value: bool) -> Self {
        RowValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for RowValue {
    fn from(value: DateTime<Utc>) -> Self {
        RowValue::Timestamp(value)
    }
}

impl<T: Into<RowValue>> From<Option<T>> for RowValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(RowValue::Null)
    }
}

/// One row of a detail query, columns in query order.
pub type Row = OrderedMap<RowValue>;

/// A row after every value has been rendered to text.
pub type StringRow = OrderedMap<String>;

/// Named parameters passed to a catalog query.
pub type QueryParams = OrderedMap<RowValue>;
