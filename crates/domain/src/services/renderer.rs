//! Body rendering seam.

use crate::models::{QueueEntry, StringRow};

/// Everything a renderer needs to produce the HTML body of one entry.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub entry: &'a QueueEntry,
    pub section_text: &'a str,
    pub rows: &'a [StringRow],
}

pub trait MailRenderer: Send + Sync {
    fn render(&self, context: &RenderContext<'_>) -> String;
}
