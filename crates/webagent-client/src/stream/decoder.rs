use std::collections::VecDeque;
use std::pin::Pin;

use encoding_rs::{CoderResult, UTF_8};
use futures::StreamExt as _;
use futures::stream;
use tracing::debug;

use super::event::{ProtocolEvent, parse_frame};
use crate::errors::ClientError;

/// Response body as delivered by a transport.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, ClientError>> + Send + 'static>>;

/// Incremental line decoder for the run event stream.
///
/// Bytes are decoded with a stateful UTF-8 decoder so a multi-byte character
/// split across chunks is reassembled, then split on `\n`. The trailing
/// segment without a terminator stays buffered until more input arrives.
pub struct EventDecoder {
    decoder: encoding_rs::Decoder,
    buffer: String,
    finished: bool,
}

impl Default for EventDecoder {
    fn default() -> Self {
        Self {
            decoder: UTF_8.new_decoder_without_bom_handling(),
            buffer: String::new(),
            finished: false,
        }
    }
}

impl EventDecoder {
    /// Feeds one chunk and returns the events completed by it.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Vec<ProtocolEvent> {
        if self.finished {
            return Vec::new();
        }
        self.decode_into_buffer(chunk, false);
        self.drain_complete_lines()
    }

    /// Flushes the character decoder at end of input.
    ///
    /// Complete lines recovered by the flush are returned; a final segment
    /// without a newline terminator is dropped.
    pub fn finish(&mut self) -> Vec<ProtocolEvent> {
        if self.finished {
            return Vec::new();
        }
        self.decode_into_buffer(&[], true);
        self.finished = true;
        let events = self.drain_complete_lines();
        if !self.buffer.is_empty() {
            debug!(
                event = "stream.tail_discarded",
                tail_len = self.buffer.len() as u64,
                "unterminated data left in buffer at end of stream"
            );
            self.buffer.clear();
        }
        events
    }

    /// Bytes of text currently held back waiting for a newline.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    fn decode_into_buffer(&mut self, chunk: &[u8], last: bool) {
        let mut src = chunk;
        loop {
            let needed = self
                .decoder
                .max_utf8_buffer_length(src.len())
                .unwrap_or(src.len().saturating_mul(3).saturating_add(4));
            self.buffer.reserve(needed);
            let (result, read, _replaced) =
                self.decoder.decode_to_string(src, &mut self.buffer, last);
            src = &src[read..];
            match result {
                CoderResult::InputEmpty => break,
                CoderResult::OutputFull => continue,
            }
        }
    }

    fn drain_complete_lines(&mut self) -> Vec<ProtocolEvent> {
        let Some(last_newline) = self.buffer.rfind('\n') else {
            return Vec::new();
        };
        let events = self.buffer[..last_newline]
            .split('\n')
            .filter_map(parse_frame)
            .collect();
        self.buffer.drain(..=last_newline);
        events
    }
}

/// Turns a response body into a lazy, finite sequence of events.
///
/// The sequence ends when the body reports end of data; a body read error is
/// yielded once and ends the sequence.
pub fn decode_events(
    body: ByteStream,
) -> impl futures::Stream<Item = Result<ProtocolEvent, ClientError>> + Send {
    struct State {
        body: ByteStream,
        decoder: EventDecoder,
        pending: VecDeque<ProtocolEvent>,
        done: bool,
    }

    stream::try_unfold(
        State {
            body,
            decoder: EventDecoder::default(),
            pending: VecDeque::new(),
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(event) = state.pending.pop_front() {
                    return Ok(Some((event, state)));
                }
                if state.done {
                    return Ok(None);
                }

                match state.body.next().await {
                    Some(Ok(chunk)) => {
                        state.pending.extend(state.decoder.push_chunk(&chunk));
                    }
                    Some(Err(e)) => return Err(e),
                    None => {
                        state.pending.extend(state.decoder.finish());
                        state.done = true;
                    }
                }
            }
        },
    )
}
