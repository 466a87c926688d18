//! Shared utilities and common types for the mail dispatcher.
//!
//! This crate provides common functionality used across all other crates:
//! - Address format validation
//! - Comma separated list parsing
//! - Insertion-ordered column maps for loosely typed rows

pub mod list;
pub mod ordered;
pub mod validation;

pub use list::{join_list, parse_list};
pub use ordered::OrderedMap;
