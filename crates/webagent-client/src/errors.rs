use std::fmt;
use std::time::Duration;

use crate::outcome::{FailedRun, RunOutcome, RunStatus};

/// Coarse classification of a transport-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The connection could not be established.
    Connect,
    /// The HTTP client gave up waiting for the server.
    Timeout,
    /// The request could not be built or sent.
    Request,
    /// Reading the response body failed mid-stream.
    Body,
    /// The server answered with a non-success status.
    Status,
}

impl TransportErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Timeout => "timeout",
            Self::Request => "request",
            Self::Body => "body",
            Self::Status => "status",
        }
    }

    pub(crate) fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect
        } else if err.is_body() || err.is_decode() {
            Self::Body
        } else if err.is_status() {
            Self::Status
        } else {
            Self::Request
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error codes the web agent API returns in `{"error": {"code": ...}}` bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiErrorCode {
    MissingApiKey,
    InvalidApiKey,
    Unauthorized,
    Forbidden,
    NotFound,
    InvalidInput,
    RateLimitExceeded,
    InternalError,
    Other(String),
}

impl ApiErrorCode {
    pub fn parse(code: &str) -> Self {
        match code {
            "MISSING_API_KEY" => Self::MissingApiKey,
            "INVALID_API_KEY" => Self::InvalidApiKey,
            "UNAUTHORIZED" => Self::Unauthorized,
            "FORBIDDEN" => Self::Forbidden,
            "NOT_FOUND" => Self::NotFound,
            "INVALID_INPUT" => Self::InvalidInput,
            "RATE_LIMIT_EXCEEDED" => Self::RateLimitExceeded,
            "INTERNAL_ERROR" => Self::InternalError,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::MissingApiKey => "MISSING_API_KEY",
            Self::InvalidApiKey => "INVALID_API_KEY",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::InvalidInput => "INVALID_INPUT",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::InternalError => "INTERNAL_ERROR",
            Self::Other(code) => code,
        }
    }
}

/// Top-level error type for every client operation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClientError {
    /// Invalid client configuration or missing credentials.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid caller input (run request, query, run id).
    #[error("validation error: {0}")]
    Validation(String),
    /// The connection failed or the server rejected the request.
    #[error("{}", render_transport(.kind, .status, .message))]
    Transport {
        kind: TransportErrorKind,
        status: Option<u16>,
        message: String,
    },
    /// The server accepted the streamed run but sent no body.
    #[error("response body is empty")]
    EmptyResponse,
    /// The event stream ended or misbehaved before a terminal event.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The client-side deadline elapsed before a terminal event.
    #[error("{}", render_timeout(.elapsed, .last_progress))]
    Timeout {
        elapsed: Duration,
        run_id: String,
        last_progress: String,
    },
    /// The API answered a one-shot request with an error status.
    #[error("api error (status {status}): {message}")]
    Api {
        status: u16,
        code: Option<ApiErrorCode>,
        message: String,
    },
    /// A one-shot response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn transport(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self::Transport {
            kind,
            status: None,
            message: message.into(),
        }
    }

    /// Non-success status before any body was consumed; `body` is kept verbatim.
    pub fn rejected(status: u16, body: impl Into<String>) -> Self {
        Self::Transport {
            kind: TransportErrorKind::Status,
            status: Some(status),
            message: body.into(),
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        Self::Transport {
            kind: TransportErrorKind::from_reqwest(&err),
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }

    pub(crate) fn protocol_msg(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// HTTP status associated with this error, when there is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether a one-shot request that failed this way is worth repeating.
    ///
    /// Streamed runs are never retried regardless of this value.
    pub fn is_retryable(&self) -> bool {
        if let Some(status) = self.status() {
            return status == 429 || (500..600).contains(&status);
        }
        matches!(
            self,
            Self::Transport {
                kind: TransportErrorKind::Connect | TransportErrorKind::Timeout,
                ..
            }
        )
    }

    /// Short stable code used in structured logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Validation(_) => "validation",
            Self::Transport { status: Some(401), .. } | Self::Api { status: 401, .. } => {
                "http.auth.401"
            }
            Self::Transport { status: Some(403), .. } | Self::Api { status: 403, .. } => {
                "http.forbidden.403"
            }
            Self::Transport { status: Some(429), .. } | Self::Api { status: 429, .. } => {
                "http.rate_limited.429"
            }
            Self::Transport {
                status: Some(500..=599),
                ..
            }
            | Self::Api {
                status: 500..=599, ..
            } => "http.server_error.5xx",
            Self::Transport {
                kind: TransportErrorKind::Timeout,
                ..
            } => "http.timeout",
            Self::Transport { .. } | Self::Api { .. } => "http.invalid_request",
            Self::EmptyResponse => "stream.empty_body",
            Self::Protocol(_) => "stream.protocol",
            Self::Timeout { .. } => "stream.timeout",
            Self::Decode(_) => "http.decode",
        }
    }

    /// Converts a streamed-run timeout into the TIMEOUT record hosts report
    /// when they continue past failed items. Other errors yield `None`.
    pub fn timeout_outcome(&self) -> Option<RunOutcome> {
        match self {
            Self::Timeout {
                run_id,
                last_progress,
                ..
            } => Some(RunOutcome::NotCompleted(FailedRun {
                status: RunStatus::Timeout,
                run_id: run_id.clone(),
                last_progress: last_progress.clone(),
                error: self.to_string(),
            })),
            _ => None,
        }
    }
}

fn render_transport(kind: &TransportErrorKind, status: &Option<u16>, message: &str) -> String {
    match status {
        Some(status) => format!("API request failed with status {status}: {message}"),
        None => format!("transport failure ({kind}): {message}"),
    }
}

fn render_timeout(elapsed: &Duration, last_progress: &str) -> String {
    let secs = elapsed.as_secs_f64();
    let mut out = if secs >= 1.0 {
        format!("run timed out after {} seconds", elapsed.as_secs())
    } else {
        format!("run timed out after {secs:.2} seconds")
    };
    if !last_progress.is_empty() {
        out.push_str(&format!(" (last progress: \"{last_progress}\")"));
    }
    out
}

/// Maps a failed one-shot response body to an actionable message.
///
/// Bodies that do not carry a recognised `{"error": {...}}` object fall back
/// to `API request failed with status N: <body>`.
pub(crate) fn api_error_from_body(status: u16, body: &str) -> ClientError {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let error_obj = parsed
        .as_ref()
        .and_then(|v| v.get("error"))
        .filter(|v| v.is_object());
    let Some(error_obj) = error_obj else {
        return ClientError::Api {
            status,
            code: None,
            message: format!("API request failed with status {status}: {body}"),
        };
    };

    let code = error_obj
        .get("code")
        .and_then(|v| v.as_str())
        .map(ApiErrorCode::parse);
    let server_message = error_obj.get("message").and_then(|v| v.as_str());
    let details = error_obj.get("details").and_then(|v| v.as_object());

    let message = match &code {
        Some(ApiErrorCode::MissingApiKey) => {
            "API key is missing. Add your TinyFish API key to the client credentials.".to_string()
        }
        Some(ApiErrorCode::InvalidApiKey) => "Invalid API key. Verify your key at \
             https://agent.tinyfish.ai/api-keys or generate a new one."
            .to_string(),
        Some(ApiErrorCode::Unauthorized) => "Authentication failed. Check your account status \
             at https://agent.tinyfish.ai/api-keys."
            .to_string(),
        Some(ApiErrorCode::Forbidden) => "Insufficient credits or no active subscription. \
             Check your account at https://agent.tinyfish.ai/api-keys."
            .to_string(),
        Some(ApiErrorCode::NotFound) => format!(
            "{}. Verify the run ID is correct.",
            server_message.unwrap_or("Resource not found")
        ),
        Some(ApiErrorCode::InvalidInput) => match details.filter(|d| !d.is_empty()) {
            Some(details) => {
                let rendered = details
                    .iter()
                    .map(|(k, v)| match v.as_str() {
                        Some(s) => format!("{k}: {s}"),
                        None => format!("{k}: {v}"),
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("Invalid input ({rendered}). Check your URL and goal parameters.")
            }
            None => format!(
                "Invalid input: {}. Check your URL and goal parameters.",
                server_message.unwrap_or("Validation failed")
            ),
        },
        Some(ApiErrorCode::RateLimitExceeded) => "Rate limit exceeded. Wait a few minutes and \
             try again, or reduce request frequency."
            .to_string(),
        Some(ApiErrorCode::InternalError) => format!(
            "TinyFish server error: {}. Try again later.",
            server_message.unwrap_or("An unexpected error occurred")
        ),
        Some(ApiErrorCode::Other(_)) | None => match server_message {
            Some(message) => message.to_string(),
            None => format!("API request failed with status {status}: {body}"),
        },
    };

    ClientError::Api {
        status,
        code,
        message,
    }
}
