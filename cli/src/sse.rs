//! Server-sent events over a chunked HTTP body.

use std::collections::VecDeque;
use std::pin::Pin;

use futures_util::stream::{Stream, StreamExt, unfold};

/// Splits a byte stream into `data:` payloads. Network chunks are not aligned
/// with event lines, so incomplete lines (and incomplete UTF-8 sequences) are
/// held until their newline arrives.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` and return every complete data payload.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut payloads = Vec::new();
        while let Some(newline) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            if let Some(data) = data_payload(&line) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Payload of a trailing line that never got its newline.
    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        data_payload(&rest)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(line);
    let data = text.trim().strip_prefix("data:")?.trim();
    // event:, id:, retry: and comment lines carry nothing for us
    if data.is_empty() {
        None
    } else {
        Some(data.to_string())
    }
}

pub type EventStream<T, E> = Pin<Box<dyn Stream<Item = Result<T, E>> + Send>>;

struct State<S, T, E, F> {
    bytes: Pin<Box<S>>,
    buffer: SseLineBuffer,
    ready: VecDeque<Result<T, E>>,
    ended: bool,
    parse: F,
}

/// Turn a raw body stream into parsed events. `parse` returns `None` for
/// payloads that carry nothing worth emitting.
pub fn event_stream<S, B, T, E, F>(bytes: S, parse: F) -> EventStream<T, E>
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]>,
    T: Send + 'static,
    E: From<reqwest::Error> + Send + 'static,
    F: Fn(&str) -> Option<Result<T, E>> + Send + 'static,
{
    let state = State {
        bytes: Box::pin(bytes),
        buffer: SseLineBuffer::new(),
        ready: VecDeque::new(),
        ended: false,
        parse,
    };

    let stream = unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.ready.pop_front() {
                return Some((item, state));
            }
            if state.ended {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    for data in state.buffer.feed(chunk.as_ref()) {
                        if let Some(item) = (state.parse)(&data) {
                            state.ready.push_back(item);
                        }
                    }
                }
                Some(Err(e)) => {
                    state.ended = true;
                    state.ready.push_back(Err(E::from(e)));
                }
                None => {
                    state.ended = true;
                    if let Some(item) = state.buffer.flush().and_then(|data| (state.parse)(&data)) {
                        state.ready.push_back(item);
                    }
                }
            }
        }
    });
    Box::pin(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_lines_split_across_chunks() {
        let mut buffer = SseLineBuffer::new();
        assert!(buffer.feed(b"data: {\"a\":").is_empty());
        assert_eq!(buffer.feed(b"1}\r\n\r\ndata: {\"b\":2}\n"), vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn keeps_multibyte_characters_split_across_chunks() {
        let text = "data: {\"text\":\"Grüße\"}\n".as_bytes();
        let split = text.iter().position(|b| *b == 0xc3).unwrap() + 1;
        let mut buffer = SseLineBuffer::new();
        assert!(buffer.feed(&text[..split]).is_empty());
        assert_eq!(buffer.feed(&text[split..]), vec!["{\"text\":\"Grüße\"}"]);
    }

    #[test]
    fn ignores_non_data_fields_and_flushes_the_tail() {
        let mut buffer = SseLineBuffer::new();
        assert!(buffer.feed(b": keep-alive\nevent: message\n").is_empty());
        assert!(buffer.feed(b"data: tail").is_empty());
        assert_eq!(buffer.flush().as_deref(), Some("tail"));
        assert_eq!(buffer.flush(), None);
    }
}
