use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::credentials::CredentialProvider;
use crate::errors::{ClientError, api_error_from_body};
use crate::model::RunRequest;
use crate::outcome::RunStatus;
use crate::transport::API_KEY_HEADER;

pub const RUN_SYNC_PATH: &str = "/v1/automation/run";
pub const RUN_ASYNC_PATH: &str = "/v1/automation/run-async";
pub const RUNS_PATH: &str = "/v1/runs";

/// A run as reported by the synchronous run and get-run endpoints.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RunRecord {
    #[serde(default)]
    pub run_id: Option<String>,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streaming_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_of_steps: Option<u64>,
}

impl RunRecord {
    /// Error text whether the API sent a string or a `{message}` object.
    pub fn error_message(&self) -> Option<String> {
        match self.error.as_ref()? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(obj) => Some(
                obj.get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("Unknown error")
                    .to_string(),
            ),
            other => Some(other.to_string()),
        }
    }
}

/// Handle returned when an asynchronous run is accepted.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AsyncRun {
    pub run_id: String,
}

#[derive(serde::Deserialize)]
struct AsyncRunResponse {
    #[serde(default)]
    run_id: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Cursor information returned with a page of runs.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// One page of the run listing.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RunPage {
    #[serde(default)]
    pub data: Vec<RunRecord>,
    #[serde(default)]
    pub pagination: Pagination,
}

/// Filters for [`RequestRelay::list_runs`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListRunsQuery {
    pub status: Option<RunStatus>,
    pub limit: u32,
    pub cursor: Option<String>,
}

impl ListRunsQuery {
    pub const MAX_LIMIT: u32 = 100;

    pub fn status(mut self, status: RunStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    fn to_query_pairs(&self) -> Result<Vec<(&'static str, String)>, ClientError> {
        if !(1..=Self::MAX_LIMIT).contains(&self.limit) {
            return Err(ClientError::Validation(format!(
                "limit must be between 1 and {}, got {}",
                Self::MAX_LIMIT,
                self.limit
            )));
        }
        let mut pairs = vec![("limit", self.limit.to_string())];
        if let Some(status) = &self.status {
            pairs.push(("status", status.to_string()));
        }
        if let Some(cursor) = self.cursor.as_deref().filter(|c| !c.trim().is_empty()) {
            pairs.push(("cursor", cursor.to_string()));
        }
        Ok(pairs)
    }
}

impl Default for ListRunsQuery {
    fn default() -> Self {
        Self {
            status: None,
            limit: 20,
            cursor: None,
        }
    }
}

/// One-shot authenticated calls to the web agent API.
///
/// Retryable failures (429, 5xx, connect errors, client timeouts) are
/// repeated according to the configured [`RetryPolicy`](crate::retry::RetryPolicy).
#[derive(Clone)]
pub struct RequestRelay {
    client: reqwest::Client,
    credentials: Arc<dyn CredentialProvider>,
    config: ClientConfig,
}

impl RequestRelay {
    pub fn new(
        client: reqwest::Client,
        credentials: Arc<dyn CredentialProvider>,
        config: ClientConfig,
    ) -> Self {
        Self {
            client,
            credentials,
            config,
        }
    }

    /// Runs the automation and waits for its result in a single response.
    pub async fn run_sync(&self, request: &RunRequest) -> Result<RunRecord, ClientError> {
        let body = request.to_payload()?;
        self.send_json(
            reqwest::Method::POST,
            self.endpoint(RUN_SYNC_PATH)?,
            Some(body),
            &[],
            self.config.sync_run_timeout,
        )
        .await
    }

    /// Starts the automation and returns its run id immediately.
    pub async fn run_async(&self, request: &RunRequest) -> Result<AsyncRun, ClientError> {
        let body = request.to_payload()?;
        let response: AsyncRunResponse = self
            .send_json(
                reqwest::Method::POST,
                self.endpoint(RUN_ASYNC_PATH)?,
                Some(body),
                &[],
                self.config.request_timeout,
            )
            .await?;

        if let Some(error) = response.error.filter(|e| !e.is_null()) {
            let message = match &error {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Object(obj) => obj
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("Unknown error")
                    .to_string(),
                other => other.to_string(),
            };
            return Err(ClientError::Api {
                status: 200,
                code: None,
                message: format!("failed to create run: {message}"),
            });
        }
        match response.run_id.filter(|id| !id.is_empty()) {
            Some(run_id) => Ok(AsyncRun { run_id }),
            None => Err(ClientError::Decode(
                "async run response did not include a run_id".into(),
            )),
        }
    }

    /// Fetches one run by id.
    pub async fn get_run(&self, run_id: &str) -> Result<RunRecord, ClientError> {
        let run_id = run_id.trim();
        if run_id.is_empty() {
            return Err(ClientError::Validation("run_id is required".into()));
        }
        if matches!(run_id, "." | "..") || run_id.chars().any(char::is_control) {
            return Err(ClientError::Validation(format!("invalid run_id: {run_id:?}")));
        }
        let mut url = self.endpoint(RUNS_PATH)?;
        // Pushed as one segment so `/`, `?`, `#` and `%` are percent-encoded.
        url.path_segments_mut()
            .map_err(|()| ClientError::Config("base_url cannot carry a path".into()))?
            .pop_if_empty()
            .push(run_id);
        self.send_json(
            reqwest::Method::GET,
            url,
            None,
            &[],
            self.config.request_timeout,
        )
        .await
    }

    /// Lists one page of runs.
    pub async fn list_runs(&self, query: &ListRunsQuery) -> Result<RunPage, ClientError> {
        let pairs = query.to_query_pairs()?;
        self.send_json(
            reqwest::Method::GET,
            self.endpoint(RUNS_PATH)?,
            None,
            &pairs,
            self.config.request_timeout,
        )
        .await
    }

    fn endpoint(&self, path: &str) -> Result<reqwest::Url, ClientError> {
        let raw = self.config.endpoint(path);
        reqwest::Url::parse(&raw)
            .map_err(|e| ClientError::Config(format!("invalid endpoint {raw:?}: {e}")))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        url: reqwest::Url,
        body: Option<serde_json::Value>,
        query: &[(&'static str, String)],
        timeout: Duration,
    ) -> Result<T, ClientError> {
        let api_key = self.credentials.api_key()?;
        let policy = &self.config.retry_policy;
        let path = url.path().to_string();
        debug!(
            event = "http.request_configured",
            domain = "relay",
            method = %method,
            path = %path,
            timeout_ms = timeout.as_millis() as u64,
            max_retries = policy.max_retries()
        );

        let mut retries_done = 0u32;
        loop {
            let attempt = retries_done + 1;
            debug!(
                event = "http.request_attempt",
                domain = "relay",
                attempt = attempt,
                path = %path
            );
            let outcome = self
                .attempt(method.clone(), url.clone(), &api_key, body.as_ref(), query, timeout)
                .await;
            match outcome {
                Ok(text) => {
                    debug!(
                        event = "http.request_succeeded",
                        domain = "relay",
                        attempt = attempt,
                        response_bytes = text.len() as u64
                    );
                    return serde_json::from_str(&text).map_err(|e| {
                        ClientError::Decode(format!("failed to decode response from {path}: {e}"))
                    });
                }
                Err(err) => {
                    let next_delay = policy.next_delay(&err, retries_done);
                    debug!(
                        event = "http.request_failed",
                        domain = "relay",
                        code = err.code(),
                        attempt = attempt,
                        retryable = err.is_retryable(),
                        will_retry = next_delay.is_some(),
                        provider_status = ?err.status(),
                        error = %err
                    );
                    let Some(backoff) = next_delay else {
                        return Err(err);
                    };
                    info!(
                        event = "relay.retry_scheduled",
                        domain = "relay",
                        code = err.code(),
                        attempt = attempt,
                        next_attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64
                    );
                    tokio::time::sleep(backoff).await;
                    retries_done += 1;
                }
            }
        }
    }

    async fn attempt(
        &self,
        method: reqwest::Method,
        url: reqwest::Url,
        api_key: &str,
        body: Option<&serde_json::Value>,
        query: &[(&'static str, String)],
        timeout: Duration,
    ) -> Result<String, ClientError> {
        let mut request = self
            .client
            .request(method, url)
            .header(API_KEY_HEADER, api_key)
            .timeout(timeout);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(ClientError::from_reqwest)?;
        let status = response.status();
        let text = response.text().await.map_err(ClientError::from_reqwest)?;
        if !status.is_success() {
            return Err(api_error_from_body(status.as_u16(), &text));
        }
        Ok(text)
    }
}
