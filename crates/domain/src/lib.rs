//! Domain layer for the mail dispatcher.
//!
//! This crate contains:
//! - Domain models (QueueEntry, Recipient, SendLogEntry, RowValue)
//! - Recipient validation and content normalization
//! - The queue dispatcher and the traits it talks to

pub mod models;
pub mod services;
