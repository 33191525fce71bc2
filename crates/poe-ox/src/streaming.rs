use std::collections::VecDeque;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};

use crate::error::PoeRequestError;
use crate::event::SseEvent;

/// Incremental SSE framer.
///
/// Bytes may be fed in arbitrary slices; the events produced only depend on
/// the concatenated input, never on where the slices were cut.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: String,
    data: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a slice of the byte stream, returning every event it completes.
    ///
    /// Lines are decoded lossily; an invalid byte only affects the line it is on.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        // Everything already buffered is a partial line without a terminator.
        let mut cursor = self.buffer.len();
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = self.buffer[cursor..].iter().position(|&b| b == b'\n') {
            let end = cursor + offset + 1;
            let line = String::from_utf8_lossy(&self.buffer[consumed..end]).into_owned();
            self.process_line(&line, &mut events);
            consumed = end;
            cursor = end;
        }
        self.buffer.drain(..consumed);

        events
    }

    /// Signal end of input: flush a trailing unterminated line and any pending event
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();

        if !self.buffer.is_empty() {
            let line = String::from_utf8_lossy(&self.buffer).into_owned();
            self.buffer.clear();
            self.process_line(&line, &mut events);
        }

        if let Some(event) = self.take_pending() {
            events.push(event);
        }

        events
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<SseEvent>) {
        let line = line.trim_end_matches(['\n', '\r']);

        if line.trim().is_empty() {
            if let Some(event) = self.take_pending() {
                events.push(event);
            }
            return;
        }

        if let Some(rest) = line.strip_prefix("event:") {
            if let Some(event) = self.take_pending() {
                events.push(event);
            }
            self.event = rest.trim().to_string();
            return;
        }

        if let Some(rest) = line.strip_prefix("data:") {
            let rest = rest.strip_prefix(' ').unwrap_or(rest);
            self.data.push_str(rest);
        }

        // Comments, id:, retry: and anything else carry nothing we use
    }

    fn take_pending(&mut self) -> Option<SseEvent> {
        if self.event.is_empty() && self.data.is_empty() {
            return None;
        }

        let event = std::mem::take(&mut self.event);
        let data = std::mem::take(&mut self.data);
        Some(SseEvent {
            event,
            data: data.trim().to_string(),
        })
    }
}

/// Byte stream of a streaming response body
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// Server-Sent Events parser over an async byte stream
pub struct SseParser<S> {
    byte_stream: S,
    decoder: SseDecoder,
    ready: VecDeque<SseEvent>,
    exhausted: bool,
}

impl SseParser<ByteStream> {
    pub fn from_response(response: reqwest::Response) -> Self {
        Self::new(Box::pin(response.bytes_stream()))
    }
}

impl<S, E> SseParser<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    PoeRequestError: From<E>,
{
    pub fn new(byte_stream: S) -> Self {
        Self {
            byte_stream,
            decoder: SseDecoder::new(),
            ready: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Get the next parsed event.
    ///
    /// `Ok(None)` is normal end of input; a failed read surfaces as `Err`.
    pub async fn next_event(&mut self) -> Result<Option<SseEvent>, PoeRequestError> {
        loop {
            if let Some(event) = self.ready.pop_front() {
                return Ok(Some(event));
            }

            if self.exhausted {
                return Ok(None);
            }

            match self.byte_stream.next().await {
                Some(chunk) => {
                    let chunk = chunk?;
                    self.ready.extend(self.decoder.feed(&chunk));
                }
                None => {
                    self.exhausted = true;
                    self.ready.extend(self.decoder.finish());
                }
            }
        }
    }
}

/// Parse a complete SSE document held in memory
pub fn parse_sse_events(input: &str) -> Vec<SseEvent> {
    let mut decoder = SseDecoder::new();
    let mut events = decoder.feed(input.as_bytes());
    events.extend(decoder.finish());
    events
}
