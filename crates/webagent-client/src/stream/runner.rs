use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt as _;
use tracing::{debug, info, warn};

use super::decoder::decode_events;
use super::event::ProtocolEvent;
use super::state::RunState;
use super::supervisor::{AbortSignal, Deadline, abort_pair};
use crate::config::ClientConfig;
use crate::credentials::CredentialProvider;
use crate::errors::ClientError;
use crate::model::{RunRequest, StreamTimeout};
use crate::outcome::RunOutcome;
use crate::transport::{OutboundRequest, RunTransport, read_body_text};

pub const RUN_SSE_PATH: &str = "/v1/automation/run-sse";

/// Phases of one streamed call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Connecting,
    Streaming,
    Completed,
    Failed,
    TimedOut,
}

impl RunPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        }
    }

    pub fn is_final(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs automation jobs over the event-stream endpoint.
///
/// Each call owns its decoder, state snapshot and deadline, so one runner can
/// serve many concurrent calls.
#[derive(Clone)]
pub struct StreamedRunner {
    transport: Arc<dyn RunTransport>,
    credentials: Arc<dyn CredentialProvider>,
    endpoint: String,
}

impl StreamedRunner {
    pub fn new(
        config: &ClientConfig,
        transport: Arc<dyn RunTransport>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            transport,
            credentials,
            endpoint: config.endpoint(RUN_SSE_PATH),
        }
    }

    /// Runs `request` to a terminal event or until `timeout` elapses.
    ///
    /// A server-reported failure is returned as `Ok(RunOutcome::NotCompleted)`.
    pub async fn run_streamed(
        &self,
        request: &RunRequest,
        timeout: StreamTimeout,
    ) -> Result<RunOutcome, ClientError> {
        self.run_streamed_within(request, timeout.as_duration(), |_| {}).await
    }

    /// Like [`StreamedRunner::run_streamed`], calling `observer` for every
    /// event as it is folded.
    pub async fn run_streamed_with<F>(
        &self,
        request: &RunRequest,
        timeout: StreamTimeout,
        observer: F,
    ) -> Result<RunOutcome, ClientError>
    where
        F: FnMut(&ProtocolEvent) + Send,
    {
        self.run_streamed_within(request, timeout.as_duration(), observer).await
    }

    /// Core entry point with an arbitrary deadline.
    pub async fn run_streamed_within<F>(
        &self,
        request: &RunRequest,
        timeout: Duration,
        observer: F,
    ) -> Result<RunOutcome, ClientError>
    where
        F: FnMut(&ProtocolEvent) + Send,
    {
        let call_id = uuid::Uuid::new_v4();
        let outbound = OutboundRequest {
            url: self.endpoint.clone(),
            api_key: self.credentials.api_key()?,
            body: request.to_payload()?,
        };

        let (abort, signal) = abort_pair();
        let mut call = StreamedCall {
            call_id,
            phase: RunPhase::Idle,
            state: RunState::default(),
            deadline: Deadline::arm(timeout, abort),
        };
        let result = call.drive(&*self.transport, outbound, signal, observer).await;
        call.deadline.disarm();

        match &result {
            Ok(outcome) => info!(
                event = "stream.finished",
                call_id = %call_id,
                run_id = %outcome.run_id(),
                status = %outcome.status(),
                elapsed_ms = call.deadline.elapsed().as_millis() as u64
            ),
            Err(err) => warn!(
                event = "stream.failed",
                call_id = %call_id,
                code = err.code(),
                phase = %call.phase,
                error = %err
            ),
        }
        result
    }
}

struct StreamedCall {
    call_id: uuid::Uuid,
    phase: RunPhase,
    state: RunState,
    deadline: Deadline,
}

impl StreamedCall {
    async fn drive<F>(
        &mut self,
        transport: &dyn RunTransport,
        outbound: OutboundRequest,
        mut signal: AbortSignal,
        mut observer: F,
    ) -> Result<RunOutcome, ClientError>
    where
        F: FnMut(&ProtocolEvent) + Send,
    {
        self.transition(RunPhase::Connecting);
        let transport_signal = signal.clone();
        let connect = transport.open(outbound, transport_signal);
        let opened = match until_aborted(&mut signal, connect).await {
            Some(Ok(opened)) => opened,
            Some(Err(err)) => {
                self.transition(RunPhase::Failed);
                return Err(err);
            }
            None => return Err(self.timed_out()),
        };

        if !opened.is_success() {
            self.transition(RunPhase::Failed);
            let status = opened.status;
            return match until_aborted(&mut signal, read_body_text(opened.body)).await {
                Some(body) => Err(ClientError::rejected(status, body)),
                None => Err(self.timed_out()),
            };
        }
        let Some(body) = opened.body else {
            self.transition(RunPhase::Failed);
            return Err(ClientError::EmptyResponse);
        };

        self.transition(RunPhase::Streaming);
        let mut events = Box::pin(decode_events(body));
        loop {
            let next = match until_aborted(&mut signal, events.next()).await {
                Some(next) => next,
                None => return Err(self.timed_out()),
            };
            match next {
                Some(Ok(event)) => {
                    debug!(event = "stream.event", call_id = %self.call_id, kind = event_kind(&event));
                    observer(&event);
                    self.state = std::mem::take(&mut self.state).apply(event);
                    if let Some(outcome) = self.state.terminal.clone() {
                        self.transition(if outcome.is_completed() {
                            RunPhase::Completed
                        } else {
                            RunPhase::Failed
                        });
                        return Ok(outcome);
                    }
                }
                Some(Err(err)) => {
                    if signal.is_aborted() {
                        return Err(self.timed_out());
                    }
                    self.transition(RunPhase::Failed);
                    return Err(err);
                }
                None => {
                    if signal.is_aborted() {
                        return Err(self.timed_out());
                    }
                    self.transition(RunPhase::Failed);
                    return Err(ClientError::protocol_msg(
                        "event stream ended without a COMPLETE event",
                    ));
                }
            }
        }
    }

    fn timed_out(&mut self) -> ClientError {
        self.transition(RunPhase::TimedOut);
        ClientError::Timeout {
            elapsed: self.deadline.elapsed(),
            run_id: self.state.run_id.clone(),
            last_progress: self.state.last_progress.clone(),
        }
    }

    fn transition(&mut self, next: RunPhase) {
        debug!(
            event = "stream.phase",
            call_id = %self.call_id,
            from = %self.phase,
            to = %next
        );
        self.phase = next;
    }
}

/// Runs `fut` unless the signal fires first; `None` means aborted.
async fn until_aborted<F: Future>(signal: &mut AbortSignal, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = signal.aborted() => None,
        out = fut => Some(out),
    }
}

fn event_kind(event: &ProtocolEvent) -> &'static str {
    match event {
        ProtocolEvent::Started { .. } => "started",
        ProtocolEvent::StreamingUrlAnnounced { .. } => "streaming_url",
        ProtocolEvent::Progress { .. } => "progress",
        ProtocolEvent::Complete(_) => "complete",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticApiKey;
    use crate::outcome::RunStatus;
    use crate::stream::decoder::ByteStream;
    use crate::transport::OpenedResponse;
    use futures::stream;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum FakeBehavior {
        ConnectError(ClientError),
        Status(u16, &'static str),
        NoBody,
        Chunks(Vec<&'static str>),
        /// Sends the chunks, then hangs without ending the body.
        ChunksThenHang(Vec<&'static str>),
        /// Never answers the connect call.
        HangOnConnect,
    }

    struct FakeTransport {
        behavior: FakeBehavior,
        aborts_seen: Arc<AtomicUsize>,
        requests: Mutex<Vec<OutboundRequest>>,
    }

    impl FakeTransport {
        fn new(behavior: FakeBehavior) -> Self {
            Self {
                behavior,
                aborts_seen: Arc::new(AtomicUsize::new(0)),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    fn chunk_stream(
        chunks: &[&'static str],
    ) -> impl futures::Stream<Item = Result<bytes::Bytes, ClientError>> + Send + 'static {
        let items: Vec<Result<bytes::Bytes, ClientError>> = chunks
            .iter()
            .map(|c| Ok(bytes::Bytes::from_static(c.as_bytes())))
            .collect();
        stream::iter(items)
    }

    #[async_trait::async_trait]
    impl RunTransport for FakeTransport {
        async fn open(
            &self,
            request: OutboundRequest,
            signal: AbortSignal,
        ) -> Result<OpenedResponse, ClientError> {
            self.requests.lock().expect("requests lock").push(request);
            let aborts_seen = Arc::clone(&self.aborts_seen);
            let watcher = signal.clone();
            tokio::spawn(async move {
                watcher.into_aborted().await;
                aborts_seen.fetch_add(1, Ordering::SeqCst);
            });

            match &self.behavior {
                FakeBehavior::ConnectError(err) => Err(err.clone()),
                FakeBehavior::Status(status, body) => Ok(OpenedResponse {
                    status: *status,
                    body: Some(Box::pin(chunk_stream(&[*body]))),
                }),
                FakeBehavior::NoBody => Ok(OpenedResponse {
                    status: 200,
                    body: None,
                }),
                FakeBehavior::Chunks(chunks) => Ok(OpenedResponse {
                    status: 200,
                    body: Some(Box::pin(chunk_stream(chunks))),
                }),
                FakeBehavior::ChunksThenHang(chunks) => {
                    let body: ByteStream =
                        Box::pin(chunk_stream(chunks).chain(stream::pending()));
                    Ok(OpenedResponse {
                        status: 200,
                        body: Some(body),
                    })
                }
                FakeBehavior::HangOnConnect => {
                    std::future::pending::<()>().await;
                    unreachable!("pending never resolves")
                }
            }
        }
    }

    fn runner(transport: Arc<FakeTransport>) -> StreamedRunner {
        StreamedRunner::new(
            &ClientConfig::default().base_url("http://agent.test"),
            transport,
            Arc::new(StaticApiKey::new("key-1").expect("key")),
        )
    }

    fn request() -> RunRequest {
        RunRequest::builder("https://shop.test/products", "List product names")
            .build()
            .expect("request")
    }

    #[tokio::test]
    async fn completed_stream_returns_success_outcome() {
        let transport = Arc::new(FakeTransport::new(FakeBehavior::Chunks(vec![
            "data: {\"type\":\"STARTED\",\"runId\":\"run_9\"}\n",
            "data: {\"type\":\"STREAMING_URL\",\"streamingUrl\":\"https://live.test/9\"}\n",
            "data: {\"type\":\"PROGRESS\",\"purpose\":\"loading\"}\ndata: {\"type\":\"PRO",
            "GRESS\",\"purpose\":\"extracting\"}\n",
            "data: {\"type\":\"COMPLETE\",\"status\":\"COMPLETED\",\"resultJson\":{\"a\":1}}\n",
        ])));
        let mut seen = Vec::new();
        let outcome = runner(Arc::clone(&transport))
            .run_streamed_with(&request(), StreamTimeout::default(), |event| {
                seen.push(event.clone())
            })
            .await
            .expect("outcome");

        assert_eq!(
            outcome.to_json(),
            serde_json::json!({
                "status": "COMPLETED",
                "runId": "run_9",
                "streamingUrl": "https://live.test/9",
                "lastProgress": "extracting",
                "resultJson": {"a": 1}
            })
        );
        assert_eq!(seen.len(), 5);

        let requests = transport.requests.lock().expect("requests lock");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "http://agent.test/v1/automation/run-sse");
        assert_eq!(requests[0].api_key, "key-1");
        assert_eq!(requests[0].body["goal"], "List product names");
    }

    #[tokio::test]
    async fn server_failure_is_returned_not_thrown() {
        let transport = Arc::new(FakeTransport::new(FakeBehavior::Chunks(vec![
            "data: {\"type\":\"STARTED\",\"runId\":\"run_f\"}\n",
            "data: {\"type\":\"COMPLETE\",\"status\":\"FAILED\",\"error\":\"blocked\"}\n",
        ])));
        let outcome = runner(transport)
            .run_streamed(&request(), StreamTimeout::default())
            .await
            .expect("outcome");
        match outcome {
            RunOutcome::NotCompleted(run) => {
                assert_eq!(run.status, RunStatus::Failed);
                assert_eq!(run.run_id, "run_f");
                assert_eq!(run.error, "blocked");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_frame_between_valid_frames_is_skipped() {
        let transport = Arc::new(FakeTransport::new(FakeBehavior::Chunks(vec![
            "data: {\"type\":\"PROGRESS\",\"purpose\":\"step one\"}\n",
            "data: {not json\n",
            "data: {\"type\":\"COMPLETE\",\"status\":\"COMPLETED\",\"resultJson\":[1,2]}\n",
        ])));
        let outcome = runner(transport)
            .run_streamed(&request(), StreamTimeout::default())
            .await
            .expect("outcome");
        assert!(outcome.is_completed());
        assert_eq!(outcome.last_progress(), "step one");
    }

    #[tokio::test]
    async fn events_after_complete_are_not_consumed() {
        let transport = Arc::new(FakeTransport::new(FakeBehavior::ChunksThenHang(vec![
            "data: {\"type\":\"COMPLETE\",\"status\":\"CANCELLED\"}\n",
        ])));
        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            runner(transport).run_streamed(&request(), StreamTimeout::default()),
        )
        .await
        .expect("returned without draining the body")
        .expect("outcome");
        assert_eq!(outcome.status(), &RunStatus::Cancelled);
    }

    #[tokio::test]
    async fn stream_ending_without_complete_is_protocol_failure() {
        let transport = Arc::new(FakeTransport::new(FakeBehavior::Chunks(vec![
            "data: {\"type\":\"STARTED\",\"runId\":\"r\"}\n",
            "data: {\"type\":\"PROGRESS\",\"purpose\":\"working\"}\n",
        ])));
        let err = runner(transport)
            .run_streamed(&request(), StreamTimeout::default())
            .await
            .expect_err("protocol failure");
        assert!(matches!(err, ClientError::Protocol(msg) if msg.contains("COMPLETE")));
    }

    #[tokio::test]
    async fn rejected_status_includes_body_verbatim() {
        let transport = Arc::new(FakeTransport::new(FakeBehavior::Status(
            401,
            r#"{"error":{"code":"INVALID_API_KEY"}}"#,
        )));
        let err = runner(transport)
            .run_streamed(&request(), StreamTimeout::default())
            .await
            .expect_err("rejected");
        assert_eq!(err.status(), Some(401));
        assert_eq!(
            err.to_string(),
            r#"API request failed with status 401: {"error":{"code":"INVALID_API_KEY"}}"#
        );
    }

    #[tokio::test]
    async fn missing_body_is_empty_response_failure() {
        let transport = Arc::new(FakeTransport::new(FakeBehavior::NoBody));
        let err = runner(transport)
            .run_streamed(&request(), StreamTimeout::default())
            .await
            .expect_err("empty");
        assert_eq!(err, ClientError::EmptyResponse);
    }

    #[tokio::test]
    async fn connect_error_propagates_as_transport_failure() {
        let transport = Arc::new(FakeTransport::new(FakeBehavior::ConnectError(
            ClientError::transport(crate::errors::TransportErrorKind::Connect, "refused"),
        )));
        let err = runner(transport)
            .run_streamed(&request(), StreamTimeout::default())
            .await
            .expect_err("connect");
        assert!(matches!(err, ClientError::Transport { .. }));
    }

    #[tokio::test]
    async fn deadline_aborts_hanging_stream_once_with_last_progress() {
        let transport = Arc::new(FakeTransport::new(FakeBehavior::ChunksThenHang(vec![
            "data: {\"type\":\"STARTED\",\"runId\":\"run_t\"}\n",
            "data: {\"type\":\"PROGRESS\",\"purpose\":\"waiting for login\"}\n",
        ])));
        let started = tokio::time::Instant::now();
        let err = runner(Arc::clone(&transport))
            .run_streamed_within(&request(), Duration::from_millis(50), |_| {})
            .await
            .expect_err("timeout");
        assert!(started.elapsed() < Duration::from_secs(2));

        match &err {
            ClientError::Timeout {
                elapsed,
                run_id,
                last_progress,
            } => {
                assert!(*elapsed >= Duration::from_millis(50));
                assert_eq!(run_id, "run_t");
                assert_eq!(last_progress, "waiting for login");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("\"waiting for login\""));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(transport.aborts_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn deadline_also_covers_the_connect_phase() {
        let transport = Arc::new(FakeTransport::new(FakeBehavior::HangOnConnect));
        let err = runner(Arc::clone(&transport))
            .run_streamed_within(&request(), Duration::from_millis(30), |_| {})
            .await
            .expect_err("timeout");
        assert!(matches!(
            err,
            ClientError::Timeout { ref last_progress, .. } if last_progress.is_empty()
        ));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(transport.aborts_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn completed_call_never_signals_abort() {
        let transport = Arc::new(FakeTransport::new(FakeBehavior::Chunks(vec![
            "data: {\"type\":\"COMPLETE\",\"status\":\"COMPLETED\"}\n",
        ])));
        runner(Arc::clone(&transport))
            .run_streamed_within(&request(), Duration::from_millis(30), |_| {})
            .await
            .expect("outcome");
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(transport.aborts_seen.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn concurrent_calls_do_not_share_state() {
        let fast = Arc::new(FakeTransport::new(FakeBehavior::Chunks(vec![
            "data: {\"type\":\"STARTED\",\"runId\":\"a\"}\n",
            "data: {\"type\":\"COMPLETE\",\"status\":\"COMPLETED\"}\n",
        ])));
        let slow = Arc::new(FakeTransport::new(FakeBehavior::Chunks(vec![
            "data: {\"type\":\"STARTED\",\"runId\":\"b\"}\n",
            "data: {\"type\":\"COMPLETE\",\"status\":\"FAILED\",\"error\":\"x\"}\n",
        ])));
        let req = request();
        let (fast_runner, slow_runner) = (runner(fast), runner(slow));
        let (a, b) = tokio::join!(
            fast_runner.run_streamed(&req, StreamTimeout::default()),
            slow_runner.run_streamed(&req, StreamTimeout::default()),
        );
        assert_eq!(a.expect("a").run_id(), "a");
        assert_eq!(b.expect("b").run_id(), "b");
    }

    #[test]
    fn final_phases() {
        assert!(RunPhase::TimedOut.is_final());
        assert!(!RunPhase::Streaming.is_final());
        assert_eq!(RunPhase::TimedOut.to_string(), "timed_out");
    }
}
