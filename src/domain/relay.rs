use crate::domain::error::AppError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const NETWORK_ERROR_STATUS_TEXT: &str = "Network Error";

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            "PATCH" => Ok(HttpMethod::Patch),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            other => Err(AppError::ValidationError(format!(
                "Unsupported HTTP method: {}",
                other
            ))),
        }
    }
}

/// A caller-composed HTTP call, as handed to the relay.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescription {
    pub method: HttpMethod,
    /// Passed to the HTTP client untouched.
    pub url: String,
    pub headers: BTreeMap<String, String>,
    /// Raw JSON text; parsed right before sending.
    pub body: Option<String>,
}

/// Normalized result of one relay attempt.
///
/// `status == 0` means no response was obtained at all; `data` then holds
/// `{"error": <message>}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub status: u16,
    pub status_text: String,
    pub headers: BTreeMap<String, String>,
    pub data: Value,
    /// Milliseconds from attempt start to resolution.
    pub duration: u64,
}

impl Outcome {
    pub fn is_network_error(&self) -> bool {
        self.status == 0
    }
}
