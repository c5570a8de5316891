use crate::domain::error::{AppError, Result};
use crate::domain::history::{HistoryPage, HistoryRecord, NewHistoryRecord};
use crate::infrastructure::db::history_store::{
    encode_json_column, redact_connection_string, window, HistoryRow, HistoryStore,
};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS api_request (
    id BIGSERIAL PRIMARY KEY,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    headers JSONB NULL,
    body TEXT NULL,
    response JSONB NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)";

const CREATE_CREATED_AT_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS api_request_created_at_idx ON api_request (created_at DESC)";

// Casts keep older tables (integer ids, json/text columns, naive timestamps) readable.
const SELECT_PAGE: &str = "SELECT id::bigint AS id, method, url,
        headers::text AS headers, body, response::text AS response,
        created_at::timestamptz AS created_at, updated_at::timestamptz AS updated_at
    FROM api_request
    ORDER BY created_at DESC, id DESC
    LIMIT $1 OFFSET $2";

pub struct PostgresHistoryStore {
    options: PgConnectOptions,
    target: String,
    schema_ready: AtomicBool,
}

impl PostgresHistoryStore {
    pub fn from_url(database_url: &str) -> Result<Self> {
        let options = PgConnectOptions::from_str(database_url).map_err(|e| {
            AppError::ConfigError(format!("Failed to parse history DB URL: {}", e))
        })?;

        Ok(Self {
            options,
            target: redact_connection_string(database_url),
            schema_ready: AtomicBool::new(false),
        })
    }

    async fn connect(&self) -> Result<PgConnection> {
        let mut conn = PgConnection::connect_with(&self.options)
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
impl HistoryStore for PostgresHistoryStore {
    async fn insert(&self, record: &NewHistoryRecord) -> Result<i64> {
        let headers_json = encode_json_column(&record.headers)?;
        let response_json = encode_json_column(&record.response)?;

        let mut conn = self.connect().await?;
        let result = sqlx::query_scalar::<_, i64>(
            "INSERT INTO api_request (method, url, headers, body, response, created_at, updated_at)
             VALUES ($1, $2, $3::jsonb, $4, $5::jsonb, NOW(), NOW())
             RETURNING id::bigint",
        )
        .bind(&record.method)
        .bind(&record.url)
        .bind(&headers_json)
        .bind(&record.body)
        .bind(&response_json)
        .fetch_one(&mut conn)
        .await
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

async fn fetch_page(conn: &mut PgConnection, page: i64, limit: i64) -> Result<HistoryPage> {
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

async fn ensure_schema(conn: &mut PgConnection) -> Result<()> {
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

async fn close(conn: PgConnection) {
    if let Err(e) = conn.close().await {
        debug!(error = %e, "History DB connection did not close cleanly");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::relay::Outcome;
    use serde_json::json;
    use std::collections::BTreeMap;

    // Runs only against a real server: TEST_DATABASE_URL=postgres://...
    fn test_store() -> Option<PostgresHistoryStore> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        if !url.starts_with("postgres") {
            return None;
        }
        Some(PostgresHistoryStore::from_url(&url).unwrap())
    }

    fn record(url: &str) -> NewHistoryRecord {
        NewHistoryRecord {
            method: "POST".to_string(),
            url: url.to_string(),
            headers: BTreeMap::from([("X-Test".to_string(), "1".to_string())]),
            body: Some(r#"{"a":1}"#.to_string()),
            response: Outcome {
                status: 200,
                status_text: "OK".to_string(),
                headers: BTreeMap::new(),
                data: json!({ "ok": true }),
                duration: 3,
            },
        }
    }

    #[test]
    fn from_url_rejects_garbage() {
        assert!(matches!(
            PostgresHistoryStore::from_url("postgres://[::1"),
            Err(AppError::ConfigError(_))
        ));
    }

    #[tokio::test]
    async fn insert_then_query_round_trips() {
        let Some(store) = test_store() else {
            return;
        };
        let url = format!(
            "https://example.com/pg/{}",
            chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
        );

        let id = store.insert(&record(&url)).await.unwrap();
        let next_id = store.insert(&record(&url)).await.unwrap();
        assert!(next_id > id);

        let page = store.query(1, 2).await.unwrap();
        assert!(page.total >= 2);
        assert_eq!(page.records[0].id, next_id);
        assert_eq!(page.records[1].id, id);
        assert_eq!(page.records[0].headers, json!({ "X-Test": "1" }));
        assert_eq!(page.records[0].body.as_deref(), Some(r#"{"a":1}"#));
        assert_eq!(page.records[0].response["status"], 200);
        assert_eq!(page.records[0].created_at, page.records[0].updated_at);
    }
}
