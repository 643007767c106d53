//! Common imports for typical client usage.
pub use crate::{
    BrowserProfile, ClientConfig, ClientError, CredentialProvider, EnvApiKey, ListRunsQuery,
    ProtocolEvent, ProxyCountry, RunOutcome, RunRecord, RunRequest, RunStatus, StaticApiKey,
    StreamTimeout, WebAgentClient, WebAgentClientBuilder,
};
