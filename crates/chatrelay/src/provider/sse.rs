//! SSE framing for streamed completions
//!
//! Network chunks do not line up with SSE events: one chunk may carry several
//! events, and one event (or one multi-byte character) may be split across
//! chunks. [`SseLineBuffer`] keeps the undecoded tail as bytes until a full
//! line arrives.

use bytes::Bytes;
use futures::{Stream, StreamExt, stream};
use std::collections::VecDeque;
use std::pin::Pin;

use super::{FragmentStream, ProviderError};

/// A parsed SSE event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A `data:` payload with the prefix stripped
    Data(String),
    /// The `[DONE]` terminator
    Done,
}

/// Line-buffering SSE parser
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk, returning the events completed by it
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Some(event) = parse_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Parse whatever is left once the byte stream has ended
    pub fn flush(&mut self) -> Vec<SseEvent> {
        let rest = std::mem::take(&mut self.pending);
        parse_line(&String::from_utf8_lossy(&rest))
            .into_iter()
            .collect()
    }
}

fn parse_line(line: &str) -> Option<SseEvent> {
    let line = line.trim_end_matches(['\r', '\n']);
    // Comments, `event:`, `id:` and `retry:` fields carry no content
    let data = line.strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);

    if data.trim() == "[DONE]" {
        Some(SseEvent::Done)
    } else if data.trim().is_empty() {
        None
    } else {
        Some(SseEvent::Data(data.to_string()))
    }
}

struct FragmentState<S> {
    bytes: Pin<Box<S>>,
    parser: SseLineBuffer,
    ready: VecDeque<String>,
    finished: bool,
}

/// Turn a provider byte stream into a stream of raw `data:` payloads.
///
/// The stream ends at `[DONE]` or when the body ends; a transport error is
/// yielded once as the last item.
pub fn fragment_stream<S>(bytes: S) -> FragmentStream
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    let state = FragmentState {
        bytes: Box::pin(bytes),
        parser: SseLineBuffer::new(),
        ready: VecDeque::new(),
        finished: false,
    };

    let fragments = stream::unfold(state, |mut state| async move {
        loop {
            if let Some(fragment) = state.ready.pop_front() {
                return Some((Ok(fragment), state));
            }
            if state.finished {
                return None;
            }

            let events = match state.bytes.next().await {
                Some(Ok(chunk)) => state.parser.feed(&chunk),
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(ProviderError::Stream(e.to_string())), state));
                }
                None => {
                    state.finished = true;
                    state.parser.flush()
                }
            };

            for event in events {
                match event {
                    SseEvent::Data(data) => state.ready.push_back(data),
                    SseEvent::Done => {
                        state.finished = true;
                        break;
                    }
                }
            }
        }
    });

    Box::pin(fragments)
}
