use std::time::Duration;

use crate::errors::ClientError;
use crate::retry::RetryPolicy;

pub const DEFAULT_BASE_URL: &str = "https://agent.tinyfish.ai";

/// Configuration shared by the relay and the streamed runner.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the web agent API.
    ///
    /// Useful for proxies or local test servers.
    pub base_url: String,
    /// HTTP timeout for one-shot requests (get/list/async submit).
    pub request_timeout: Duration,
    /// HTTP timeout for the synchronous run endpoint, which holds the
    /// connection until the automation finishes.
    pub sync_run_timeout: Duration,
    /// Retry policy for one-shot requests. Streamed runs never retry.
    pub retry_policy: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            sync_run_timeout: Duration::from_secs(300),
            retry_policy: RetryPolicy::exponential(2, Duration::from_secs(1), 2.0),
        }
    }
}

impl ClientConfig {
    /// Builds a config, honouring `TINYFISH_BASE_URL` when it is set.
    pub fn from_env() -> Self {
        let config = Self::default();
        match std::env::var("TINYFISH_BASE_URL") {
            Ok(url) if !url.trim().is_empty() => config.base_url(url.trim()),
            _ => config,
        }
    }

    /// Overrides the API base URL.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn sync_run_timeout(mut self, timeout: Duration) -> Self {
        self.sync_run_timeout = timeout;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ClientError> {
        let parsed = reqwest::Url::parse(&self.base_url).map_err(|e| {
            ClientError::Config(format!("invalid base_url {:?}: {e}", self.base_url))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ClientError::Config(format!(
                "base_url must use http or https: {}",
                self.base_url
            )));
        }
        Ok(())
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}
