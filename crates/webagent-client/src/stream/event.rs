use serde::Deserialize;

/// Literal prefix that marks an event frame in the stream.
pub const DATA_PREFIX: &str = "data: ";

/// One decoded event of a streamed run.
#[derive(Clone, Debug, PartialEq)]
pub enum ProtocolEvent {
    /// The server accepted the run and assigned it an id.
    Started { run_id: String },
    /// A live-view URL for the browser session.
    StreamingUrlAnnounced { url: String },
    /// Human-readable description of what the agent is doing now.
    Progress { purpose: String },
    /// Terminal event.
    Complete(CompleteEvent),
}

impl ProtocolEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_))
    }
}

/// Payload of the terminal `COMPLETE` event.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompleteEvent {
    pub status: Option<String>,
    pub result_json: Option<serde_json::Value>,
    pub error: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum WireEvent {
    Started {
        #[serde(rename = "runId", default)]
        run_id: Option<String>,
    },
    StreamingUrl {
        #[serde(rename = "streamingUrl", default)]
        streaming_url: Option<String>,
    },
    Progress {
        #[serde(default)]
        purpose: Option<String>,
    },
    Complete {
        #[serde(default)]
        status: Option<String>,
        #[serde(rename = "resultJson", default)]
        result_json: Option<serde_json::Value>,
        #[serde(default)]
        error: Option<serde_json::Value>,
    },
    #[serde(other)]
    Unknown,
}

/// Parses one line of the stream.
///
/// Returns `None` for anything that is not a well-formed event frame: lines
/// without the data prefix, invalid JSON, and unknown `type` values.
pub fn parse_frame(line: &str) -> Option<ProtocolEvent> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    let payload = line.strip_prefix(DATA_PREFIX)?;
    let wire: WireEvent = match serde_json::from_str(payload) {
        Ok(wire) => wire,
        Err(e) => {
            tracing::trace!(event = "stream.frame_discarded", reason = "invalid_json", error = %e);
            return None;
        }
    };
    match wire {
        WireEvent::Started { run_id } => Some(ProtocolEvent::Started {
            run_id: run_id.unwrap_or_default(),
        }),
        WireEvent::StreamingUrl { streaming_url } => Some(ProtocolEvent::StreamingUrlAnnounced {
            url: streaming_url.unwrap_or_default(),
        }),
        WireEvent::Progress { purpose } => Some(ProtocolEvent::Progress {
            purpose: purpose.unwrap_or_default(),
        }),
        WireEvent::Complete {
            status,
            result_json,
            error,
        } => Some(ProtocolEvent::Complete(CompleteEvent {
            status: status.filter(|s| !s.is_empty()),
            result_json: result_json.filter(|v| !v.is_null()),
            error: error.and_then(error_text),
        })),
        WireEvent::Unknown => {
            tracing::trace!(event = "stream.frame_discarded", reason = "unknown_type");
            None
        }
    }
}

// The API sends either a bare string or an object carrying `message`.
fn error_text(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) if s.is_empty() => None,
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Object(ref obj) => match obj.get("message").and_then(|m| m.as_str()) {
            Some(message) => Some(message.to_string()),
            None => Some(value.to_string()),
        },
        other => Some(other.to_string()),
    }
}
