//! HTML body rendering for queued alarm mail.
//!
//! Section content is produced upstream as an HTML fragment and is embedded
//! as is. Everything else, detail table cells included, is escaped.

use domain::models::Severity;
use domain::services::{MailRenderer, RenderContext};
use std::fmt::Write;

/// Renders a severity banner, the section and one detail table.
#[derive(Debug, Clone, Default)]
pub struct HtmlTableRenderer {
    footer: Option<String>,
}

impl HtmlTableRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plain text line appended below the table.
    pub fn with_footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }
}

fn banner_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "#2f6fb3",
        Severity::Warning => "#d48806",
        Severity::Critical => "#c0392b",
    }
}

/// Escape text for HTML element and attribute content.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

impl MailRenderer for HtmlTableRenderer {
    fn render(&self, context: &RenderContext<'_>) -> String {
        let entry = context.entry;
        let mut html = String::with_capacity(1024 + context.section_text.len());

        // Writing into a String cannot fail
        let _ = write!(
            html,
            concat!(
                "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n",
                "<title>{title}</title>\n</head>\n",
                "<body style=\"font-family: Arial, Helvetica, sans-serif; color: #333;\">\n",
                "<div style=\"background: {color}; color: #fff; padding: 12px 16px;\">",
                "<strong>{severity}</strong> {alarm}</div>\n"
            ),
            title = escape_html(&entry.subject()),
            color = banner_color(entry.severity),
            severity = entry.severity,
            alarm = escape_html(&entry.alarm_name),
        );

        if let Some(title) = entry.section_title.as_deref().filter(|t| !t.is_empty()) {
            let _ = writeln!(html, "<h3>{}</h3>", escape_html(title));
        }
        if !context.section_text.is_empty() {
            let _ = writeln!(html, "<div>{}</div>", context.section_text);
        }

        if let Some(first) = context.rows.first() {
            html.push_str(
                "<table style=\"border-collapse: collapse; margin-top: 12px;\" border=\"1\" cellpadding=\"4\">\n<tr>",
            );
            let columns: Vec<&str> = first.keys().collect();
            for column in &columns {
                let _ = write!(html, "<th>{}</th>", escape_html(column));
            }
            html.push_str("</tr>\n");

            for row in context.rows {
                html.push_str("<tr>");
                for column in &columns {
                    let cell = row.get(column).map(String::as_str).unwrap_or("");
                    let _ = write!(html, "<td>{}</td>", escape_html(cell));
                }
                html.push_str("</tr>\n");
            }
            html.push_str("</table>\n");
        }

        if let Some(footer) = &self.footer {
            let _ = writeln!(
                html,
                "<p style=\"color: #999; font-size: 12px;\">{}</p>",
                escape_html(footer)
            );
        }

        html.push_str("</body>\n</html>\n");
        html
    }
}
