use crate::application::use_cases::normalizer::{self, RawResponse};
use crate::domain::error::{AppError, Result};
use crate::domain::relay::{HttpMethod, Outcome, RequestDescription};
use reqwest::header::HeaderMap;
use reqwest::Method;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// End-to-end bound (connect + transfer) for one relayed call.
pub const RELAY_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Sends exactly one outbound request per call and always yields an [`Outcome`].
pub struct RelayExecutor {
    client: reqwest::Client,
    timeout: Duration,
}

impl RelayExecutor {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn execute(&self, description: &RequestDescription) -> Outcome {
        info!(
            method = %description.method,
            url = %description.url,
            "Relaying request"
        );

        let started = Instant::now();
        let attempt = self.attempt(description).await;
        let outcome = normalizer::normalize(attempt, started.elapsed());

        if outcome.is_network_error() {
            warn!(
                method = %description.method,
                url = %description.url,
                duration_ms = outcome.duration,
                error = %outcome.data["error"],
                "Relay failed before a response was received"
            );
        } else {
            info!(
                method = %description.method,
                url = %description.url,
                status = outcome.status,
                duration_ms = outcome.duration,
                "Relay completed"
            );
        }

        outcome
    }

    async fn attempt(
        &self,
        description: &RequestDescription,
    ) -> std::result::Result<RawResponse, String> {
        let payload = parse_body(description.body.as_deref())?;

        let mut request = self
            .client
            .request(to_reqwest_method(description.method), description.url.as_str());
        for (name, value) in &description.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(payload) = payload {
            request = request.json(&payload);
        }

        let response = request.send().await.map_err(|e| self.describe(&e))?;
        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());
        let body = response.text().await.map_err(|e| self.describe(&e))?;

        Ok(RawResponse {
            status,
            headers,
            body,
        })
    }

    fn describe(&self, err: &reqwest::Error) -> String {
        if err.is_timeout() {
            return format!("timeout of {}ms exceeded", self.timeout.as_millis());
        }
        error_chain(err)
    }
}

fn to_reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Head => Method::HEAD,
        HttpMethod::Options => Method::OPTIONS,
    }
}

// An empty body is the same as no body.
fn parse_body(body: Option<&str>) -> std::result::Result<Option<Value>, String> {
    match body {
        None | Some("") => Ok(None),
        Some(text) => serde_json::from_str(text)
            .map(Some)
            .map_err(|e| format!("Failed to parse request body as JSON: {}", e)),
    }
}

fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut collected: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        collected
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    collected
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn description(method: HttpMethod, url: String) -> RequestDescription {
        RequestDescription {
            method,
            url,
            headers: BTreeMap::new(),
            body: None,
        }
    }

    fn executor() -> RelayExecutor {
        RelayExecutor::new(RELAY_TIMEOUT).unwrap()
    }

    #[tokio::test]
    async fn returns_real_status_and_json_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status/200"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        let outcome = executor()
            .execute(&description(
                HttpMethod::Get,
                format!("{}/status/200", server.uri()),
            ))
            .await;

        assert_eq!(outcome.status, 200);
        assert_eq!(outcome.status_text, "OK");
        assert_eq!(outcome.data, json!({ "ok": true }));
        assert_eq!(outcome.headers["content-type"], "application/json");
    }

    #[tokio::test]
    async fn every_status_class_is_a_completed_relay() {
        let server = MockServer::start().await;
        for status in [200u16, 204, 302, 400, 404, 500, 503] {
            Mock::given(path(format!("/status/{}", status)))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;
        }

        let executor = executor();
        for status in [200u16, 204, 302, 400, 404, 500, 503] {
            let outcome = executor
                .execute(&description(
                    HttpMethod::Get,
                    format!("{}/status/{}", server.uri(), status),
                ))
                .await;
            assert_eq!(outcome.status, status);
            assert!(!outcome.is_network_error());
        }
    }

    #[tokio::test]
    async fn forwards_headers_and_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/items"))
            .and(header("x-test", "1"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({ "a": 1 })))
            .respond_with(ResponseTemplate::new(201).set_body_string("created"))
            .expect(1)
            .mount(&server)
            .await;

        let mut request = description(HttpMethod::Post, format!("{}/items", server.uri()));
        request
            .headers
            .insert("X-Test".to_string(), "1".to_string());
        request.body = Some(r#"{"a":1}"#.to_string());

        let outcome = executor().execute(&request).await;
        assert_eq!(outcome.status, 201);
        assert_eq!(outcome.data, Value::String("created".to_string()));
    }

    #[tokio::test]
    async fn malformed_body_is_a_network_style_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let mut request = description(HttpMethod::Post, format!("{}/fail", server.uri()));
        request.body = Some("not-json".to_string());

        let outcome = executor().execute(&request).await;
        assert_eq!(outcome.status, 0);
        assert_eq!(outcome.status_text, "Network Error");
        assert!(outcome.headers.is_empty());
        let message = outcome.data["error"].as_str().unwrap();
        assert!(message.contains("parse"), "unexpected message: {}", message);
    }

    #[tokio::test]
    async fn empty_body_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut request = description(HttpMethod::Put, server.uri());
        request.body = Some(String::new());

        let outcome = executor().execute(&request).await;
        assert_eq!(outcome.status, 200);
        let received = server.received_requests().await.unwrap();
        assert!(received[0].body.is_empty());
    }

    #[tokio::test]
    async fn unreachable_host_yields_network_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let outcome = executor()
            .execute(&description(
                HttpMethod::Get,
                format!("http://127.0.0.1:{}/", port),
            ))
            .await;

        assert_eq!(outcome.status, 0);
        assert_eq!(outcome.status_text, "Network Error");
        assert!(!outcome.data["error"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_url_yields_network_error() {
        let outcome = executor()
            .execute(&description(HttpMethod::Get, "not a url".to_string()))
            .await;
        assert_eq!(outcome.status, 0);
        assert!(!outcome.data["error"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let executor = RelayExecutor::new(Duration::from_millis(200)).unwrap();
        let outcome = executor
            .execute(&description(HttpMethod::Get, server.uri()))
            .await;

        assert_eq!(outcome.status, 0);
        assert_eq!(outcome.data["error"], "timeout of 200ms exceeded");
        assert!(outcome.duration >= 200);
        assert!(outcome.duration < 5_000);
    }

    #[tokio::test]
    #[ignore = "waits out the full 30s relay bound"]
    async fn default_bound_cuts_off_a_31s_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(31)))
            .mount(&server)
            .await;

        let outcome = executor()
            .execute(&description(HttpMethod::Get, server.uri()))
            .await;

        assert_eq!(outcome.status, 0);
        assert_eq!(outcome.data["error"], "timeout of 30000ms exceeded");
    }

    #[test]
    fn repeated_headers_are_joined() {
        let mut headers = HeaderMap::new();
        headers.append("set-cookie", "a=1".parse().unwrap());
        headers.append("set-cookie", "b=2".parse().unwrap());
        let collected = collect_headers(&headers);
        assert_eq!(collected["set-cookie"], "a=1, b=2");
    }
}
