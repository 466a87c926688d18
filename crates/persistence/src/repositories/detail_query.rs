//! Detail query catalog.
//!
//! Queue entries name a registered query instead of carrying SQL. The SQL is
//! looked up in `mail_detail_query`, its parameters are bound positionally in
//! the registered order and each result row is decoded column by column.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use domain::models::{QueryParams, Row, RowValue};
use domain::services::StoreError;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::types::Decimal;
use sqlx::{Column, PgPool, Postgres, Row as _, TypeInfo};
use std::fmt::Display;

use crate::entities::MailDetailQueryEntity;
use crate::metrics::QueryTimer;

/// Repository for registered detail queries.
pub struct DetailQueryRepository {
    pool: PgPool,
}

impl DetailQueryRepository {
    /// Create a new repository instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a registered query.
    pub async fn find_by_id(
        &self,
        query_id: &str,
    ) -> Result<Option<MailDetailQueryEntity>, sqlx::Error> {
        sqlx::query_as::<_, MailDetailQueryEntity>(
            r#"
            SELECT query_id, sql_text, param_names, description
            FROM mail_detail_query
            WHERE query_id = $1
            "#,
        )
        .bind(query_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Run a registered query and decode its rows in column order.
    pub async fn fetch_rows(
        &self,
        query_id: &str,
        params: &QueryParams,
    ) -> Result<Vec<Row>, StoreError> {
        let definition = self
            .find_by_id(query_id)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?
            .ok_or_else(|| StoreError::QueryNotFound(query_id.to_string()))?;

        let mut query = sqlx::query(&definition.sql_text);
        for name in definition.param_names() {
            query = bind_param(query, params.get(&name));
        }

        let timer = QueryTimer::new("mail_detail_query");
        let rows = query.fetch_all(&self.pool).await;
        timer.record();

        let execution_error = |message: String| StoreError::QueryExecution {
            query_id: query_id.to_string(),
            message,
        };
        let rows = rows.map_err(|e| execution_error(e.to_string()))?;

        rows.iter()
            .map(|row| decode_row(row).map_err(&execution_error))
            .collect()
    }
}

/// Bind a named parameter; names with no value bind as NULL.
fn bind_param<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: Option<&RowValue>,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        None | Some(RowValue::Null) => query.bind(Option::<String>::None),
        Some(RowValue::Text(text)) => query.bind(text.clone()),
        Some(RowValue::Integer(n)) => query.bind(*n),
        Some(RowValue::Float(f)) => query.bind(*f),
        Some(RowValue::Bool(b)) => query.bind(*b),
        Some(RowValue::Timestamp(ts)) => query.bind(*ts),
        Some(other) => query.bind(other.to_string()),
    }
}

fn decode_row(row: &PgRow) -> Result<Row, String> {
    row.columns()
        .iter()
        .map(|column| {
            decode_column(row, column.ordinal(), column.type_info().name())
                .map(|value| (column.name(), value))
                .map_err(|e| format!("column '{}': {}", column.name(), e))
        })
        .collect()
}

/// Decode one column by its Postgres type name.
///
/// Types without a text conversion here fail the query; registered SQL casts
/// such columns to TEXT.
fn decode_column(row: &PgRow, index: usize, type_name: &str) -> Result<RowValue, String> {
    let value = match type_name {
        "TEXT" | "VARCHAR" | "BPCHAR" | "CHAR" | "NAME" | "CITEXT" => {
            row.try_get::<Option<String>, _>(index).map(RowValue::from)
        }
        "INT2" => row
            .try_get::<Option<i16>, _>(index)
            .map(|v| RowValue::from(v.map(i64::from))),
        "INT4" => row
            .try_get::<Option<i32>, _>(index)
            .map(|v| RowValue::from(v.map(i64::from))),
        "INT8" => row.try_get::<Option<i64>, _>(index).map(RowValue::from),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(index)
            .map(|v| RowValue::from(v.map(f64::from))),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index).map(RowValue::from),
        "NUMERIC" => row.try_get::<Option<Decimal>, _>(index).map(numeric_value),
        "BOOL" => row.try_get::<Option<bool>, _>(index).map(RowValue::from),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(index)
            .map(RowValue::from),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(index)
            .map(|v| RowValue::from(v.map(|ts| ts.and_utc()))),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(index)
            .map(|v| RowValue::from(v.map(|d| d.to_string()))),
        "UUID" => row
            .try_get::<Option<uuid::Uuid>, _>(index)
            .map(|v| RowValue::from(v.map(|u| u.to_string()))),
        "JSON" | "JSONB" => row
            .try_get::<Option<serde_json::Value>, _>(index)
            .map(|v| RowValue::from(v.map(|j| j.to_string()))),
        "TEXT[]" | "VARCHAR[]" | "BPCHAR[]" | "NAME[]" => row
            .try_get::<Option<Vec<String>>, _>(index)
            .map(array_value),
        "INT2[]" => row.try_get::<Option<Vec<i16>>, _>(index).map(array_value),
        "INT4[]" => row.try_get::<Option<Vec<i32>>, _>(index).map(array_value),
        "INT8[]" => row.try_get::<Option<Vec<i64>>, _>(index).map(array_value),
        "FLOAT8[]" => row.try_get::<Option<Vec<f64>>, _>(index).map(array_value),
        "BOOL[]" => row.try_get::<Option<Vec<bool>>, _>(index).map(array_value),
        other => return unsupported(row, index, other),
    };

    value.map_err(|e| e.to_string())
}

/// NUMERIC keeps the scale Postgres reports, so `12.50` stays `12.50`.
fn numeric_value(value: Option<Decimal>) -> RowValue {
    RowValue::from(value.map(|d| d.to_string()))
}

/// Arrays render as `{a,b,c}`.
fn array_value<T: Display>(value: Option<Vec<T>>) -> RowValue {
    RowValue::from(value.map(|items| {
        let items: Vec<String> = items.iter().map(ToString::to_string).collect();
        format!("{{{}}}", items.join(","))
    }))
}

fn unsupported(row: &PgRow, index: usize, type_name: &str) -> Result<RowValue, String> {
    match row.try_get_raw(index) {
        Ok(raw) if sqlx::ValueRef::is_null(&raw) => Ok(RowValue::Null),
        _ => Err(unsupported_type_message(type_name)),
    }
}

fn unsupported_type_message(type_name: &str) -> String {
    format!(
        "type {} has no text conversion, cast the column to TEXT in the registered query",
        type_name
    )
}
