use crate::domain::error::{AppError, Result};
use crate::domain::history::{HistoryPage, HistoryRecord, NewHistoryRecord};
use crate::infrastructure::db::postgres::PostgresHistoryStore;
use crate::infrastructure::db::sqlite::SqliteHistoryStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;

pub const HISTORY_TABLE: &str = "api_request";

/// Append-only log of relayed requests.
///
/// Implementations open a fresh connection per call and close it before
/// returning, so a dropped database between calls never poisons later ones.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Appends one record and returns its store-assigned id.
    async fn insert(&self, record: &NewHistoryRecord) -> Result<i64>;

    /// Returns the window at offset `(page - 1) * limit`, newest first, plus the
    /// total row count. Out-of-range windows are empty rather than errors.
    async fn query(&self, page: i64, limit: i64) -> Result<HistoryPage>;

    /// Connection target with credentials removed, for logs.
    fn target(&self) -> &str;
}

pub type SharedHistoryStore = Arc<dyn HistoryStore>;

/// Builds the store handle for a connection string. No connection is made yet.
pub fn open_history_store(database_url: &str) -> Result<SharedHistoryStore> {
    let scheme = database_url
        .split_once(':')
        .map(|(scheme, _)| scheme.to_ascii_lowercase())
        .unwrap_or_default();

    match scheme.as_str() {
        "postgres" | "postgresql" => Ok(Arc::new(PostgresHistoryStore::from_url(database_url)?)),
        "sqlite" => Ok(Arc::new(SqliteHistoryStore::from_url(database_url)?)),
        _ => Err(AppError::ConfigError(format!(
            "Unsupported history database: {}",
            redact_connection_string(database_url)
        ))),
    }
}

pub fn redact_connection_string(database_url: &str) -> String {
    match url::Url::parse(database_url) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("***"));
            }
            parsed.to_string()
        }
        Err(_) => "<unparsable connection string>".to_string(),
    }
}

// Window bounds for a page request; `None` means the window is empty.
pub(crate) fn window(page: i64, limit: i64) -> Option<(i64, i64)> {
    let offset = crate::domain::history::page_offset(page, limit);
    if limit <= 0 || offset < 0 {
        return None;
    }
    Some((limit, offset))
}

#[derive(sqlx::FromRow)]
pub(crate) struct HistoryRow {
    pub id: i64,
    pub method: String,
    pub url: String,
    pub headers: Option<String>,
    pub body: Option<String>,
    pub response: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<HistoryRow> for HistoryRecord {
    fn from(row: HistoryRow) -> Self {
        Self {
            id: row.id,
            method: row.method,
            url: row.url,
            headers: decode_json_column(row.headers),
            body: row.body,
            response: decode_json_column(row.response),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub(crate) fn encode_json_column<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| AppError::Internal(format!("Failed to serialize history column: {}", e)))
}

/// Parses a stored JSON column. Double-encoded text is unwrapped once,
/// unparsable text is handed back as a string and NULL reads as `{}`.
pub(crate) fn decode_json_column(raw: Option<String>) -> Value {
    let Some(raw) = raw else {
        return Value::Object(Map::new());
    };
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::String(inner)) => {
            serde_json::from_str::<Value>(&inner).unwrap_or(Value::String(inner))
        }
        Ok(value) => value,
        Err(_) => Value::String(raw),
    }
}
