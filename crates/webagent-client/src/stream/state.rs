use super::event::{CompleteEvent, ProtocolEvent};
use crate::outcome::{CompletedRun, FailedRun, RunOutcome, RunStatus};

/// What is known about a streamed run so far.
///
/// `run_id` and `streaming_url` only move forward: once set they are never
/// cleared. After `terminal` is set the snapshot is frozen.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunState {
    pub run_id: String,
    pub streaming_url: String,
    pub last_progress: String,
    pub terminal: Option<RunOutcome>,
}

impl RunState {
    /// Folds one event into the snapshot.
    pub fn apply(mut self, event: ProtocolEvent) -> Self {
        if self.terminal.is_some() {
            return self;
        }
        match event {
            ProtocolEvent::Started { run_id } => {
                if self.run_id.is_empty() {
                    self.run_id = run_id;
                }
            }
            ProtocolEvent::StreamingUrlAnnounced { url } => {
                if !url.is_empty() {
                    self.streaming_url = url;
                }
            }
            ProtocolEvent::Progress { purpose } => {
                self.last_progress = purpose;
            }
            ProtocolEvent::Complete(complete) => {
                let outcome = self.outcome_for(complete);
                self.terminal = Some(outcome);
            }
        }
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal.is_some()
    }

    fn outcome_for(&self, complete: CompleteEvent) -> RunOutcome {
        let status = complete
            .status
            .map(RunStatus::from)
            .unwrap_or(RunStatus::Failed);
        if status.is_completed() {
            RunOutcome::Completed(CompletedRun {
                status,
                run_id: self.run_id.clone(),
                streaming_url: self.streaming_url.clone(),
                last_progress: self.last_progress.clone(),
                result_json: complete
                    .result_json
                    .unwrap_or_else(|| serde_json::Value::Object(Default::default())),
            })
        } else {
            RunOutcome::NotCompleted(FailedRun {
                status,
                run_id: self.run_id.clone(),
                last_progress: self.last_progress.clone(),
                error: complete
                    .error
                    .unwrap_or_else(|| "Unknown error".to_string()),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fold(events: Vec<ProtocolEvent>) -> RunState {
        events.into_iter().fold(RunState::default(), RunState::apply)
    }

    fn started(id: &str) -> ProtocolEvent {
        ProtocolEvent::Started { run_id: id.into() }
    }

    fn progress(text: &str) -> ProtocolEvent {
        ProtocolEvent::Progress {
            purpose: text.into(),
        }
    }

    #[test]
    fn completed_run_keeps_latest_progress_and_payload() {
        let state = fold(vec![
            started("run_1"),
            progress("loading"),
            progress("extracting"),
            ProtocolEvent::Complete(CompleteEvent {
                status: Some("COMPLETED".into()),
                result_json: Some(serde_json::json!({"a": 1})),
                error: None,
            }),
        ]);
        assert_eq!(
            state.terminal,
            Some(RunOutcome::Completed(CompletedRun {
                status: RunStatus::Completed,
                run_id: "run_1".into(),
                streaming_url: String::new(),
                last_progress: "extracting".into(),
                result_json: serde_json::json!({"a": 1}),
            }))
        );
    }

    #[test]
    fn failed_run_carries_server_error() {
        let state = fold(vec![
            started("run_2"),
            ProtocolEvent::Complete(CompleteEvent {
                status: Some("FAILED".into()),
                result_json: None,
                error: Some("blocked".into()),
            }),
        ]);
        assert_eq!(
            state.terminal,
            Some(RunOutcome::NotCompleted(FailedRun {
                status: RunStatus::Failed,
                run_id: "run_2".into(),
                last_progress: String::new(),
                error: "blocked".into(),
            }))
        );
    }

    #[test]
    fn complete_defaults_apply_when_fields_are_missing() {
        let state = fold(vec![ProtocolEvent::Complete(CompleteEvent::default())]);
        match state.terminal {
            Some(RunOutcome::NotCompleted(run)) => {
                assert_eq!(run.status, RunStatus::Failed);
                assert_eq!(run.error, "Unknown error");
            }
            other => panic!("unexpected terminal: {other:?}"),
        }

        let state = fold(vec![ProtocolEvent::Complete(CompleteEvent {
            status: Some("COMPLETED".into()),
            ..Default::default()
        })]);
        match state.terminal {
            Some(RunOutcome::Completed(run)) => {
                assert_eq!(run.result_json, serde_json::json!({}));
            }
            other => panic!("unexpected terminal: {other:?}"),
        }
    }

    #[test]
    fn cancelled_status_is_preserved() {
        let state = fold(vec![ProtocolEvent::Complete(CompleteEvent {
            status: Some("CANCELLED".into()),
            ..Default::default()
        })]);
        assert_eq!(
            state.terminal.as_ref().map(RunOutcome::status),
            Some(&RunStatus::Cancelled)
        );
    }

    #[test]
    fn identifiers_only_move_forward() {
        let state = fold(vec![
            started("first"),
            ProtocolEvent::StreamingUrlAnnounced {
                url: "https://live.test/a".into(),
            },
            started("second"),
            ProtocolEvent::StreamingUrlAnnounced { url: String::new() },
        ]);
        assert_eq!(state.run_id, "first");
        assert_eq!(state.streaming_url, "https://live.test/a");
        assert!(!state.is_terminal());
    }

    #[test]
    fn events_after_terminal_are_ignored() {
        let state = fold(vec![
            started("run_3"),
            ProtocolEvent::Complete(CompleteEvent {
                status: Some("COMPLETED".into()),
                ..Default::default()
            }),
            progress("late"),
            ProtocolEvent::Complete(CompleteEvent {
                status: Some("FAILED".into()),
                ..Default::default()
            }),
        ]);
        assert_eq!(state.last_progress, "");
        assert!(state.terminal.as_ref().is_some_and(RunOutcome::is_completed));
    }
}
