use std::sync::Arc;

use crate::config::ClientConfig;
use crate::credentials::{CredentialProvider, EnvApiKey};
use crate::errors::ClientError;
use crate::model::{RunRequest, StreamTimeout};
use crate::outcome::RunOutcome;
use crate::relay::{AsyncRun, ListRunsQuery, RequestRelay, RunPage, RunRecord};
use crate::stream::{ProtocolEvent, StreamedRunner};
use crate::transport::{ReqwestTransport, RunTransport};

/// Entry point for every web agent operation.
///
/// Cheap to clone; clones share the HTTP connection pool.
#[derive(Clone)]
pub struct WebAgentClient {
    runner: StreamedRunner,
    relay: RequestRelay,
}

impl WebAgentClient {
    pub fn builder() -> WebAgentClientBuilder {
        WebAgentClientBuilder::default()
    }

    /// Builds a client from `TINYFISH_API_KEY` and `TINYFISH_BASE_URL`.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::builder().config(ClientConfig::from_env()).build()
    }

    /// Runs the automation over the event stream and waits for its terminal
    /// event, giving up after `timeout`.
    pub async fn run_streamed(
        &self,
        request: &RunRequest,
        timeout: StreamTimeout,
    ) -> Result<RunOutcome, ClientError> {
        self.runner.run_streamed(request, timeout).await
    }

    /// Like [`WebAgentClient::run_streamed`], reporting each event to `observer`.
    pub async fn run_streamed_with<F>(
        &self,
        request: &RunRequest,
        timeout: StreamTimeout,
        observer: F,
    ) -> Result<RunOutcome, ClientError>
    where
        F: FnMut(&ProtocolEvent) + Send,
    {
        self.runner.run_streamed_with(request, timeout, observer).await
    }

    pub async fn run_sync(&self, request: &RunRequest) -> Result<RunRecord, ClientError> {
        self.relay.run_sync(request).await
    }

    pub async fn run_async(&self, request: &RunRequest) -> Result<AsyncRun, ClientError> {
        self.relay.run_async(request).await
    }

    pub async fn get_run(&self, run_id: &str) -> Result<RunRecord, ClientError> {
        self.relay.get_run(run_id).await
    }

    pub async fn list_runs(&self, query: &ListRunsQuery) -> Result<RunPage, ClientError> {
        self.relay.list_runs(query).await
    }
}

/// Builder for [`WebAgentClient`].
///
/// Defaults: [`ClientConfig::default`], credentials from `TINYFISH_API_KEY`
/// (read per call), and a reqwest-backed transport.
#[derive(Default)]
pub struct WebAgentClientBuilder {
    config: Option<ClientConfig>,
    credentials: Option<Arc<dyn CredentialProvider>>,
    transport: Option<Arc<dyn RunTransport>>,
    http: Option<reqwest::Client>,
}

impl WebAgentClientBuilder {
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Replaces the transport used for streamed runs.
    pub fn transport(mut self, transport: Arc<dyn RunTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Shares an existing `reqwest::Client` between streamed and one-shot calls.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http = Some(client);
        self
    }

    pub fn build(self) -> Result<WebAgentClient, ClientError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let http = self.http.unwrap_or_default();
        let credentials = self
            .credentials
            .unwrap_or_else(|| Arc::new(EnvApiKey::default()));
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(ReqwestTransport::new(http.clone())));

        Ok(WebAgentClient {
            runner: StreamedRunner::new(&config, transport, Arc::clone(&credentials)),
            relay: RequestRelay::new(http, credentials, config),
        })
    }
}
