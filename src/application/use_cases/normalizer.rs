use crate::domain::relay::{Outcome, NETWORK_ERROR_STATUS_TEXT};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// A response that made it back from the remote end, whatever its status.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

/// Maps a transport attempt onto the uniform [`Outcome`] shape.
///
/// Every status code (1xx-5xx) counts as a completed relay. Only `Err`,
/// meaning no response was obtained, turns into a `status = 0` outcome.
pub fn normalize(attempt: Result<RawResponse, String>, elapsed: Duration) -> Outcome {
    match attempt {
        Ok(raw) => from_response(raw, elapsed),
        Err(message) => from_failure(message, elapsed),
    }
}

pub fn from_response(raw: RawResponse, elapsed: Duration) -> Outcome {
    Outcome {
        status: raw.status,
        status_text: status_text(raw.status),
        headers: raw.headers,
        data: decode_body(raw.body),
        duration: duration_ms(elapsed),
    }
}

pub fn from_failure(message: impl Into<String>, elapsed: Duration) -> Outcome {
    Outcome {
        status: 0,
        status_text: NETWORK_ERROR_STATUS_TEXT.to_string(),
        headers: BTreeMap::new(),
        data: json!({ "error": message.into() }),
        duration: duration_ms(elapsed),
    }
}

fn status_text(status: u16) -> String {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or_default()
        .to_string()
}

// JSON bodies become structured data; anything else is kept verbatim as a string.
fn decode_body(body: String) -> Value {
    match serde_json::from_str::<Value>(&body) {
        Ok(value) => value,
        Err(_) => Value::String(body),
    }
}

fn duration_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
