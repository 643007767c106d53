//! Streamed runs over the event-stream endpoint.
//!
//! Bytes flow through [`decoder::EventDecoder`] into [`event::ProtocolEvent`]s,
//! which [`state::RunState::apply`] folds into a snapshot. The
//! [`runner::StreamedRunner`] owns the connection and the deadline.

pub mod decoder;
pub mod event;
pub mod runner;
pub mod state;
pub mod supervisor;

pub use decoder::{ByteStream, EventDecoder, decode_events};
pub use event::{CompleteEvent, ProtocolEvent, parse_frame};
pub use runner::{RUN_SSE_PATH, RunPhase, StreamedRunner};
pub use state::RunState;
pub use supervisor::{AbortHandle, AbortSignal, Deadline, abort_pair};
