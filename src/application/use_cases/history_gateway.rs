use crate::domain::history::{HistoryRecord, NewHistoryRecord, Pagination};
use crate::infrastructure::db::history_store::SharedHistoryStore;
use serde::Serialize;
use tracing::{debug, warn};

pub const NOT_CONFIGURED_MESSAGE: &str = "Database not configured. History is not available.";
pub const CONNECTION_FAILED_MESSAGE: &str =
    "Database connection failed. History is not available.";

/// A page of history as handed to the client. `message` is set only in degraded mode.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HistoryListing {
    #[serde(rename = "requests")]
    pub records: Vec<HistoryRecord>,
    pub pagination: Pagination,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HistoryListing {
    fn degraded(message: &str) -> Self {
        Self {
            records: Vec::new(),
            pagination: Pagination::degraded(),
            message: Some(message.to_string()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.message.is_some()
    }
}

/// Shields callers from storage trouble: a missing or failing store yields
/// "unavailable" results instead of errors on both paths.
#[derive(Clone)]
pub struct HistoryGateway {
    store: Option<SharedHistoryStore>,
}

impl HistoryGateway {
    pub fn new(store: Option<SharedHistoryStore>) -> Self {
        Self { store }
    }

    pub fn unconfigured() -> Self {
        Self { store: None }
    }

    pub fn is_configured(&self) -> bool {
        self.store.is_some()
    }

    /// Appends a record; `None` when storage is unconfigured or the write failed.
    pub async fn record(&self, record: &NewHistoryRecord) -> Option<i64> {
        let Some(store) = self.store.as_ref() else {
            debug!("History store not configured, skipping save");
            return None;
        };

        match store.insert(record).await {
            Ok(id) => {
                debug!(id, "Saved request to history");
                Some(id)
            }
            Err(err) => {
                warn!(
                    error = %err,
                    target_db = %store.target(),
                    "Failed to save request to history"
                );
                None
            }
        }
    }

    pub async fn list(&self, page: i64, limit: i64) -> HistoryListing {
        let Some(store) = self.store.as_ref() else {
            return HistoryListing::degraded(NOT_CONFIGURED_MESSAGE);
        };

        match store.query(page, limit).await {
            Ok(result) => HistoryListing {
                records: result.records,
                pagination: Pagination::new(page, limit, result.total),
                message: None,
            },
            Err(err) => {
                warn!(
                    error = %err,
                    target_db = %store.target(),
                    "Failed to load history"
                );
                HistoryListing::degraded(CONNECTION_FAILED_MESSAGE)
            }
        }
    }
}
