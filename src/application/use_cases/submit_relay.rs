use crate::application::use_cases::history_gateway::HistoryGateway;
use crate::application::use_cases::relay_executor::RelayExecutor;
use crate::domain::error::{AppError, Result};
use crate::domain::history::NewHistoryRecord;
use crate::domain::relay::{HttpMethod, Outcome, RequestDescription};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use validator::Validate;

/// Body of a submit-relay call as sent by the browser.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct SubmitRelayRequest {
    #[validate(
        required(message = "method is required"),
        length(min = 1, message = "method must not be empty")
    )]
    pub method: Option<String>,
    #[validate(
        required(message = "url is required"),
        length(min = 1, message = "url must not be empty")
    )]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    pub body: Option<String>,
}

impl SubmitRelayRequest {
    pub fn into_description(self) -> Result<RequestDescription> {
        self.validate()
            .map_err(|e| AppError::ValidationError(e.to_string()))?;

        let method: HttpMethod = self.method.unwrap_or_default().parse()?;
        Ok(RequestDescription {
            method,
            url: self.url.unwrap_or_default(),
            headers: self
                .headers
                .unwrap_or_default()
                .into_iter()
                .filter_map(|(name, value)| header_value(value).map(|value| (name, value)))
                .collect(),
            body: self.body,
        })
    }
}

/// Browsers send whatever the header editor holds; scalars are stringified
/// and null entries are dropped.
fn header_value(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RelayResult {
    pub id: Option<i64>,
    #[serde(rename = "response")]
    pub outcome: Outcome,
}

pub struct SubmitRelayUseCase {
    executor: Arc<RelayExecutor>,
    history: HistoryGateway,
}

impl SubmitRelayUseCase {
    pub fn new(executor: Arc<RelayExecutor>, history: HistoryGateway) -> Self {
        Self { executor, history }
    }

    /// Relays the call, then saves it. Only malformed input fails; network and
    /// storage trouble are folded into the returned value.
    pub async fn execute(&self, request: SubmitRelayRequest) -> Result<RelayResult> {
        let description = request.into_description()?;

        let outcome = self.executor.execute(&description).await;

        let id = self
            .history
            .record(&NewHistoryRecord {
                method: description.method.to_string(),
                url: description.url,
                headers: description.headers,
                body: description.body,
                response: outcome.clone(),
            })
            .await;

        Ok(RelayResult { id, outcome })
    }
}
