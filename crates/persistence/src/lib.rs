//! Persistence layer for the mail dispatcher.
//!
//! This crate contains:
//! - Database connection management
//! - Entity definitions (database row mappings)
//! - Repository implementations of the dispatcher's storage traits

pub mod db;
pub mod entities;
pub mod metrics;
pub mod repositories;
