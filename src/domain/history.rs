use crate::domain::relay::Outcome;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 10;

/// Row about to be appended to the history log. The store assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewHistoryRecord {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
    pub response: Outcome,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: i64,
    pub method: String,
    pub url: String,
    pub headers: Value,
    pub body: Option<String>,
    pub response: Value,
    #[serde(serialize_with = "serialize_iso_millis")]
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub updated_at: DateTime<Utc>,
}

/// One window of the history log plus the size of the whole log.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryPage {
    pub records: Vec<HistoryRecord>,
    pub total: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(page: i64, limit: i64, total: i64) -> Self {
        Self {
            page,
            limit,
            total,
            total_pages: total_pages(total, limit),
        }
    }

    /// Shape reported whenever history storage cannot be used.
    pub fn degraded() -> Self {
        Self::new(DEFAULT_PAGE, DEFAULT_LIMIT, 0)
    }
}

/// Offset of the first row of `page`; not clamped.
pub fn page_offset(page: i64, limit: i64) -> i64 {
    page.saturating_sub(1).saturating_mul(limit)
}

fn total_pages(total: i64, limit: i64) -> i64 {
    if limit <= 0 || total <= 0 {
        return 0;
    }
    (total + limit - 1) / limit
}

fn serialize_iso_millis<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
}
