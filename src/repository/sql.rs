//! Whitelisted read-only SQL execution.
//!
//! External tooling is allowed to run ad-hoc SELECTs against the store.
//! Statements are validated before execution: single SELECT only, no
//! mutating keywords, no blacklisted tables, LIMIT enforced, and a
//! per-statement timeout applied inside a throwaway transaction. This is
//! the one interface in the crate that reports failures as an
//! `{error: ...}` payload instead of an error type.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::postgres::PgRow;
use sqlx::{Column, Row};
use tracing::error;

use crate::db::MemnonPool;

/// Longest text value returned before truncation.
const MAX_TEXT_LEN: usize = 2_000;

const FORBIDDEN_KEYWORDS: &[&str] = &[
    "update", "insert", "delete", "alter", "create", "drop", "grant", "revoke", "truncate",
    "vacuum", "copy",
];

const FORBIDDEN_TABLE_PREFIXES: &[&str] =
    &["alembic_", "pg_", "information_schema", "chunk_embeddings_"];

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SqlResponse {
    Rows(SqlRows),
    Error { error: String },
}

#[derive(Debug, Serialize)]
pub struct SqlRows {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
    pub row_count: usize,
    pub sql: String,
}

fn limit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\blimit\s+\d+").expect("limit pattern is valid"))
}

fn table_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\b(?:from|join)\s+([a-zA-Z_][a-zA-Z0-9_."]*)"#).expect("table pattern is valid")
    })
}

/// Validate a statement and return the normalized form to execute.
/// Pure; exercised directly by tests.
pub fn validate_readonly(sql: &str, max_rows: usize) -> Result<String, String> {
    let trimmed = sql.trim().trim_end_matches(';').trim();
    if trimmed.is_empty() {
        return Err("Empty SQL".to_string());
    }

    let lowered = trimmed.to_lowercase();
    if !lowered.starts_with("select ") {
        return Err("Only SELECT statements are allowed".to_string());
    }
    if lowered.contains(';') {
        return Err("Multiple statements are not allowed".to_string());
    }

    let padded = format!(" {} ", lowered.replace(['\n', '\t'], " "));
    for keyword in FORBIDDEN_KEYWORDS {
        if padded.contains(&format!(" {} ", keyword)) {
            return Err(format!("Forbidden keyword in SQL: {}", keyword));
        }
    }

    for table in referenced_tables(&lowered) {
        for prefix in FORBIDDEN_TABLE_PREFIXES {
            if table.starts_with(prefix) {
                return Err(format!("Table not allowed: {} (blacklisted prefix)", table));
            }
        }
    }

    if limit_re().is_match(&lowered) {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{} LIMIT {}", trimmed, max_rows))
    }
}

/// Table references after `FROM`/`JOIN`, both schema-qualified and bare, so
/// prefix checks catch `information_schema.tables` as well as
/// `public.chunk_embeddings_1024d`.
fn referenced_tables(lowered: &str) -> Vec<String> {
    let mut tables = Vec::new();
    for captures in table_re().captures_iter(lowered) {
        let qualified = captures[1].trim_matches('"').to_string();
        let bare = qualified
            .rsplit('.')
            .next()
            .unwrap_or(&qualified)
            .trim_matches('"')
            .to_string();
        if bare != qualified {
            tables.push(qualified);
        }
        tables.push(bare);
    }
    tables
}

/// Execute a whitelisted SELECT with row and time limits. Never raises;
/// every failure comes back as an error payload.
pub async fn execute_readonly_sql(
    pool: &MemnonPool,
    sql: &str,
    max_rows: usize,
    timeout_ms: u64,
) -> SqlResponse {
    let statement = match validate_readonly(sql, max_rows) {
        Ok(statement) => statement,
        Err(error) => return SqlResponse::Error { error },
    };

    match run(pool, &statement, max_rows, timeout_ms).await {
        Ok((columns, rows)) => SqlResponse::Rows(SqlRows {
            row_count: rows.len(),
            columns,
            rows,
            sql: sql.trim().to_string(),
        }),
        Err(e) => {
            error!("Error executing read-only SQL: {}", e);
            SqlResponse::Error {
                error: e.to_string(),
            }
        }
    }
}

async fn run(
    pool: &MemnonPool,
    statement: &str,
    max_rows: usize,
    timeout_ms: u64,
) -> Result<(Vec<String>, Vec<Map<String, Value>>), sqlx::Error> {
    let mut tx = pool.begin().await?;
    // timeout_ms is a caller-supplied integer, not user SQL
    sqlx::query(&format!("SET LOCAL statement_timeout = {}", timeout_ms))
        .execute(&mut *tx)
        .await?;
    let rows = sqlx::query(statement).fetch_all(&mut *tx).await?;
    tx.rollback().await.ok();

    let columns: Vec<String> = rows
        .first()
        .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();

    let decoded = rows
        .iter()
        .take(max_rows)
        .map(|row| {
            let mut object = Map::new();
            for (index, column) in row.columns().iter().enumerate() {
                object.insert(column.name().to_string(), decode_value(row, index));
            }
            object
        })
        .collect();

    Ok((columns, decoded))
}

/// Best-effort decode of a dynamically typed column into JSON. Values over
/// the text cap are truncated.
fn decode_value(row: &PgRow, index: usize) -> Value {
    if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
        return value.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<i32>, _>(index) {
        return value.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<f64>, _>(index) {
        return value.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<f32>, _>(index) {
        return value.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<bool>, _>(index) {
        return value.map(Value::from).unwrap_or(Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<String>, _>(index) {
        return value.map(|text| Value::String(truncate_text(text))).unwrap_or(Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<DateTime<Utc>>, _>(index) {
        return value
            .map(|ts| Value::String(ts.to_rfc3339()))
            .unwrap_or(Value::Null);
    }
    if let Ok(value) = row.try_get::<Option<Vec<String>>, _>(index) {
        return value
            .map(|items| Value::Array(items.into_iter().map(Value::String).collect()))
            .unwrap_or(Value::Null);
    }
    Value::Null
}

fn truncate_text(text: String) -> String {
    if text.chars().count() > MAX_TEXT_LEN {
        let truncated: String = text.chars().take(MAX_TEXT_LEN).collect();
        format!("{}...", truncated)
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_select_gets_a_limit() {
        let statement = validate_readonly("SELECT id FROM narrative_chunks", 50).expect("valid");
        assert_eq!(statement, "SELECT id FROM narrative_chunks LIMIT 50");
    }

    #[test]
    fn existing_limit_is_preserved() {
        let statement =
            validate_readonly("SELECT id FROM narrative_chunks LIMIT 5", 50).expect("valid");
        assert_eq!(statement, "SELECT id FROM narrative_chunks LIMIT 5");
    }

    #[test]
    fn trailing_semicolon_is_stripped() {
        let statement = validate_readonly("SELECT 1;", 10).expect("valid");
        assert_eq!(statement, "SELECT 1 LIMIT 10");
    }

    #[test]
    fn non_select_is_rejected() {
        assert!(validate_readonly("UPDATE characters SET name = 'x'", 50).is_err());
        assert!(validate_readonly("DELETE FROM places", 50).is_err());
        assert!(validate_readonly("", 50).is_err());
    }

    #[test]
    fn embedded_statements_are_rejected() {
        let error = validate_readonly("SELECT 1; DROP TABLE narrative_chunks", 50)
            .expect_err("must reject");
        assert!(error.contains("Multiple statements"));
    }

    #[test]
    fn forbidden_keywords_are_rejected() {
        for sql in [
            "SELECT * FROM x WHERE drop = 1",
            "SELECT 1 UNION SELECT 2 FROM y GROUP BY truncate",
        ] {
            assert!(validate_readonly(sql, 50).is_err(), "{sql}");
        }
    }

    #[test]
    fn blacklisted_tables_are_rejected() {
        for sql in [
            "SELECT * FROM pg_class",
            "SELECT * FROM public.chunk_embeddings_1024d",
            "SELECT a.* FROM characters a JOIN alembic_version v ON true",
            "SELECT * FROM information_schema.tables",
        ] {
            let error = validate_readonly(sql, 50).expect_err(sql);
            assert!(error.contains("not allowed"), "{sql}: {error}");
        }
    }

    #[test]
    fn allowed_joins_pass() {
        let sql = "SELECT nc.id, cm.season FROM narrative_chunks nc \
                   JOIN chunk_metadata cm ON nc.id = cm.chunk_id WHERE cm.season = 2";
        assert!(validate_readonly(sql, 50).is_ok());
    }

    #[test]
    fn long_text_is_truncated() {
        let long = "x".repeat(MAX_TEXT_LEN + 10);
        let truncated = truncate_text(long);
        assert_eq!(truncated.chars().count(), MAX_TEXT_LEN + 3);
        assert!(truncated.ends_with("..."));
    }
}
