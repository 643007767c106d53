use std::fmt;

/// Run status as reported by the API.
///
/// Unrecognised statuses are preserved verbatim in `Other`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    /// Synthesized client-side when the streamed-run deadline elapses.
    Timeout,
    Other(String),
}

impl RunStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Timeout => "TIMEOUT",
            Self::Other(status) => status,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl From<&str> for RunStatus {
    fn from(value: &str) -> Self {
        match value {
            "PENDING" => Self::Pending,
            "RUNNING" => Self::Running,
            "COMPLETED" => Self::Completed,
            "FAILED" => Self::Failed,
            "CANCELLED" => Self::Cancelled,
            "TIMEOUT" => Self::Timeout,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for RunStatus {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<RunStatus> for String {
    fn from(value: RunStatus) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal record of a run that finished with `COMPLETED`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedRun {
    pub status: RunStatus,
    pub run_id: String,
    pub streaming_url: String,
    pub last_progress: String,
    pub result_json: serde_json::Value,
}

/// Terminal record of a run that ended in any other status.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedRun {
    pub status: RunStatus,
    pub run_id: String,
    pub last_progress: String,
    pub error: String,
}

/// Normalized result of a streamed run.
///
/// A server-reported failure is a valid protocol outcome and is returned as
/// `NotCompleted`, not as an error.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum RunOutcome {
    Completed(CompletedRun),
    NotCompleted(FailedRun),
}

impl RunOutcome {
    pub fn status(&self) -> &RunStatus {
        match self {
            Self::Completed(run) => &run.status,
            Self::NotCompleted(run) => &run.status,
        }
    }

    pub fn run_id(&self) -> &str {
        match self {
            Self::Completed(run) => &run.run_id,
            Self::NotCompleted(run) => &run.run_id,
        }
    }

    pub fn last_progress(&self) -> &str {
        match self {
            Self::Completed(run) => &run.last_progress,
            Self::NotCompleted(run) => &run.last_progress,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Serializes the outcome with the camelCase keys hosts expect.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
