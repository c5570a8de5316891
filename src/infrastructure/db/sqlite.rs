use crate::domain::error::{AppError, Result};
use crate::domain::history::{HistoryPage, HistoryRecord, NewHistoryRecord};
use crate::infrastructure::db::history_store::{
    encode_json_column, redact_connection_string, window, HistoryRow, HistoryStore,
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::Connection;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS api_request (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    headers TEXT,
    body TEXT,
    response TEXT,
    created_at DATETIME NOT NULL,
    updated_at DATETIME NOT NULL
)";

const CREATE_CREATED_AT_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS api_request_created_at_idx ON api_request (created_at DESC)";

const SELECT_PAGE: &str = "SELECT id, method, url, headers, body, response, created_at, updated_at
    FROM api_request
    ORDER BY created_at DESC, id DESC
    LIMIT ? OFFSET ?";

/// Single-file history store for local use.
pub struct SqliteHistoryStore {
    options: SqliteConnectOptions,
    target: String,
    schema_ready: AtomicBool,
}

impl SqliteHistoryStore {
    pub fn from_url(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::ConfigError(format!("Failed to parse history DB URL: {}", e)))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        Ok(Self {
            options,
            target: redact_connection_string(database_url),
            schema_ready: AtomicBool::new(false),
        })
    }

    async fn connect(&self) -> Result<SqliteConnection> {
        let mut conn = SqliteConnection::connect_with(&self.options)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect history DB: {}", e)))?;

        if !self.schema_ready.load(Ordering::Acquire) {
            if let Err(err) = ensure_schema(&mut conn).await {
                close(conn).await;
                return Err(err);
            }
            self.schema_ready.store(true, Ordering::Release);
            info!(target_db = %self.target, "History table ready");
        }

        Ok(conn)
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn insert(&self, record: &NewHistoryRecord) -> Result<i64> {
        let headers_json = encode_json_column(&record.headers)?;
        let response_json = encode_json_column(&record.response)?;
        let now = Utc::now();

        let mut conn = self.connect().await?;
        let result = sqlx::query(
            "INSERT INTO api_request (method, url, headers, body, response, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.method)
        .bind(&record.url)
        .bind(&headers_json)
        .bind(&record.body)
        .bind(&response_json)
        .bind(now)
        .bind(now)
        .execute(&mut conn)
        .await
        .map(|done| done.last_insert_rowid())
        .map_err(|e| AppError::DatabaseError(format!("Failed to insert history record: {}", e)));
        close(conn).await;

        result
    }

    async fn query(&self, page: i64, limit: i64) -> Result<HistoryPage> {
        let mut conn = self.connect().await?;
        let result = fetch_page(&mut conn, page, limit).await;
        close(conn).await;

        result
    }

    fn target(&self) -> &str {
        &self.target
    }
}

async fn fetch_page(conn: &mut SqliteConnection, page: i64, limit: i64) -> Result<HistoryPage> {
    let records = match window(page, limit) {
        Some((limit, offset)) => sqlx::query_as::<_, HistoryRow>(SELECT_PAGE)
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch history: {}", e)))?
            .into_iter()
            .map(HistoryRecord::from)
            .collect(),
        None => Vec::new(),
    };

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM api_request")
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to count history: {}", e)))?;

    Ok(HistoryPage { records, total })
}

async fn ensure_schema(conn: &mut SqliteConnection) -> Result<()> {
    for statement in [CREATE_TABLE, CREATE_CREATED_AT_INDEX] {
        sqlx::query(statement)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to create history table: {}", e))
            })?;
    }
    Ok(())
}

async fn close(conn: SqliteConnection) {
    if let Err(e) = conn.close().await {
        debug!(error = %e, "History DB connection did not close cleanly");
    }
}
