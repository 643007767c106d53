//! Client for the TinyFish web agent automation API.
//!
//! Runs can be executed three ways: streamed over server-sent events with a
//! client-side deadline, synchronously in one long request, or asynchronously
//! with later polling through `get_run`/`list_runs`.
//!
//! # Streamed run
//!
//! ```no_run
//! use webagent_client::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ClientError> {
//! let client = WebAgentClient::from_env()?;
//!
//! let request = RunRequest::builder("https://example.com", "Extract the page title")
//!     .browser_profile(BrowserProfile::Stealth)
//!     .proxy(Some(ProxyCountry::Us))
//!     .build()?;
//!
//! let outcome = client
//!     .run_streamed_with(&request, StreamTimeout::new(120)?, |event| {
//!         if let ProtocolEvent::Progress { purpose } = event {
//!             eprintln!("progress: {purpose}");
//!         }
//!     })
//!     .await?;
//!
//! println!("{}", outcome.to_json());
//! # Ok(())
//! # }
//! ```

/// Client configuration shared by every operation.
pub mod config;
/// Pluggable API key sources.
pub mod credentials;
/// Public error type and API error mapping.
pub mod errors;
/// Run request, proxy and timeout types.
pub mod model;
/// Normalized outcomes of streamed runs.
pub mod outcome;
/// Common imports for typical usage.
pub mod prelude;
/// One-shot API calls: sync run, async run, get and list.
pub mod relay;
/// Retry policy for one-shot calls.
pub mod retry;
/// Streamed runs: decoding, state folding and deadline supervision.
pub mod stream;
/// HTTP transport seam for streamed runs.
pub mod transport;

mod client;

pub use client::{WebAgentClient, WebAgentClientBuilder};
pub use config::{ClientConfig, DEFAULT_BASE_URL};
pub use credentials::{API_KEY_ENV, CredentialProvider, EnvApiKey, StaticApiKey};
pub use errors::{ApiErrorCode, ClientError, TransportErrorKind};
pub use model::{
    BrowserProfile, ProxyConfig, ProxyCountry, RunRequest, RunRequestBuilder, StreamTimeout,
};
pub use outcome::{CompletedRun, FailedRun, RunOutcome, RunStatus};
pub use relay::{AsyncRun, ListRunsQuery, Pagination, RequestRelay, RunPage, RunRecord};
pub use retry::RetryPolicy;
pub use stream::{AbortHandle, AbortSignal, ProtocolEvent, RunPhase, RunState, StreamedRunner};
pub use transport::{OpenedResponse, OutboundRequest, ReqwestTransport, RunTransport};
