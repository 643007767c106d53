use futures::StreamExt as _;
use tracing::debug;

use crate::errors::ClientError;
use crate::stream::decoder::ByteStream;
use crate::stream::supervisor::AbortSignal;

/// Header carrying the API key on every request.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// A fully built streamed-run request.
#[derive(Clone, Debug)]
pub struct OutboundRequest {
    pub url: String,
    pub api_key: String,
    pub body: serde_json::Value,
}

/// Response head plus the (still unread) body.
pub struct OpenedResponse {
    pub status: u16,
    /// `None` when the server sent headers but no body stream.
    pub body: Option<ByteStream>,
}

impl OpenedResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Opens streamed-run connections.
///
/// Implementations must stop producing body chunks once `signal` is aborted.
/// Dropping the returned body releases the connection.
#[async_trait::async_trait]
pub trait RunTransport: Send + Sync {
    async fn open(
        &self,
        request: OutboundRequest,
        signal: AbortSignal,
    ) -> Result<OpenedResponse, ClientError>;
}

/// Default transport backed by a shared `reqwest::Client`.
///
/// The client carries no overall timeout: the streamed-run deadline is
/// enforced by the caller.
#[derive(Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl RunTransport for ReqwestTransport {
    async fn open(
        &self,
        request: OutboundRequest,
        signal: AbortSignal,
    ) -> Result<OpenedResponse, ClientError> {
        debug!(event = "stream.connect", url = %request.url);
        let response = self
            .client
            .post(&request.url)
            .header(API_KEY_HEADER, &request.api_key)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&request.body)
            .send()
            .await
            .map_err(ClientError::from_reqwest)?;

        let status = response.status().as_u16();
        let body: ByteStream = Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(ClientError::from_reqwest))
                .take_until(signal.into_aborted()),
        );
        Ok(OpenedResponse {
            status,
            body: Some(body),
        })
    }
}

/// Reads a whole body as text, replacing invalid UTF-8.
///
/// A read error ends the body early; what arrived before it is returned.
pub(crate) async fn read_body_text(body: Option<ByteStream>) -> String {
    let Some(mut body) = body else {
        return String::new();
    };
    let mut bytes = Vec::new();
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(chunk) => bytes.extend_from_slice(&chunk),
            Err(err) => {
                debug!(
                    event = "stream.error_body_truncated",
                    bytes_read = bytes.len() as u64,
                    code = err.code(),
                    error = %err,
                    "error body read failed; keeping the bytes received so far"
                );
                break;
            }
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::supervisor::abort_pair;

    fn outbound(url: String) -> OutboundRequest {
        OutboundRequest {
            url,
            api_key: "test-key".into(),
            body: serde_json::json!({"url": "https://example.com", "goal": "g"}),
        }
    }

    #[tokio::test]
    async fn sends_api_key_and_json_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/automation/run-sse")
            .match_header("x-api-key", "test-key")
            .match_body(mockito::Matcher::Json(
                serde_json::json!({"url": "https://example.com", "goal": "g"}),
            ))
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body("data: {\"type\":\"STARTED\",\"runId\":\"r\"}\n")
            .create_async()
            .await;

        let (_handle, signal) = abort_pair();
        let opened = ReqwestTransport::default()
            .open(
                outbound(format!("{}/v1/automation/run-sse", server.url())),
                signal,
            )
            .await
            .expect("open");
        assert!(opened.is_success());
        let text = read_body_text(opened.body).await;
        assert!(text.contains("STARTED"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_returned_with_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/automation/run-sse")
            .with_status(403)
            .with_body("no credits")
            .create_async()
            .await;

        let (_handle, signal) = abort_pair();
        let opened = ReqwestTransport::default()
            .open(
                outbound(format!("{}/v1/automation/run-sse", server.url())),
                signal,
            )
            .await
            .expect("open");
        assert_eq!(opened.status, 403);
        assert_eq!(read_body_text(opened.body).await, "no credits");
    }

    #[tokio::test]
    async fn aborted_signal_ends_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/run")
            .with_status(200)
            .with_body("data: {}\n")
            .create_async()
            .await;

        let (handle, signal) = abort_pair();
        handle.abort();
        let opened = ReqwestTransport::default()
            .open(outbound(format!("{}/run", server.url())), signal)
            .await
            .expect("open");
        let mut body = opened.body.expect("body");
        assert!(body.next().await.is_none());
    }

    #[tokio::test]
    async fn error_body_read_failure_keeps_the_received_prefix() {
        let body: ByteStream = Box::pin(futures::stream::iter(vec![
            Ok(bytes::Bytes::from_static(b"quota ")),
            Ok(bytes::Bytes::from_static(b"exceeded")),
            Err(ClientError::transport(
                crate::errors::TransportErrorKind::Body,
                "connection reset",
            )),
            Ok(bytes::Bytes::from_static(b" never read")),
        ]));
        assert_eq!(read_body_text(Some(body)).await, "quota exceeded");
        assert_eq!(read_body_text(None).await, "");
    }

    #[tokio::test]
    async fn connection_refused_is_transport_error() {
        let (_handle, signal) = abort_pair();
        let err = ReqwestTransport::default()
            .open(outbound("http://127.0.0.1:1/run".into()), signal)
            .await
            .err()
            .expect("connect error");
        assert!(matches!(err, ClientError::Transport { status: None, .. }));
    }
}
