//! Registered detail query entity.

use sqlx::FromRow;

/// Database row mapping for the mail_detail_query table.
#[derive(Debug, Clone, FromRow)]
pub struct MailDetailQueryEntity {
    pub query_id: String,
    pub sql_text: String,
    /// Comma separated parameter names, bound as `$1..$n` in this order.
    pub param_names: Option<String>,
    pub description: Option<String>,
}

impl MailDetailQueryEntity {
    pub fn param_names(&self) -> Vec<String> {
        shared::parse_list(self.param_names.as_deref())
    }
}
