//! Response body framing for streaming engines
//!
//! Engines stream either server-sent events (vLLM, MLX, TGI) or
//! newline-delimited JSON (Ollama). Both are line oriented, so bytes are
//! buffered until a full line is available. Decoding whole lines keeps
//! multi-byte UTF-8 characters intact when they straddle network chunks.

use crate::error::{LexaiError, Result};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

/// Stream of decoded frame payloads
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Turns complete lines into frame payloads
pub trait Decoder: Send {
    /// Handle one line, without its terminator
    fn line(&mut self, line: &str, out: &mut VecDeque<String>);

    /// Called once the body ends
    fn finish(&mut self, _out: &mut VecDeque<String>) {}
}

/// Server-sent events: yields the joined `data:` value of each event
#[derive(Debug, Default)]
pub struct SseDecoder {
    data: Vec<String>,
    event: Option<String>,
}

impl SseDecoder {
    /// Create a decoder with no pending event
    pub fn new() -> Self {
        Self::default()
    }

    fn dispatch(&mut self, out: &mut VecDeque<String>) {
        let event = self.event.take();
        if self.data.is_empty() {
            return;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        if event.is_some_and(|e| e.eq_ignore_ascii_case("ping")) {
            return;
        }
        out.push_back(data);
    }
}

impl Decoder for SseDecoder {
    fn line(&mut self, line: &str, out: &mut VecDeque<String>) {
        if line.is_empty() {
            self.dispatch(out);
        } else if line.starts_with(':') {
            // comment
        } else if let Some(value) = line.strip_prefix("data:") {
            self.data
                .push(value.strip_prefix(' ').unwrap_or(value).to_string());
        } else if let Some(value) = line.strip_prefix("event:") {
            self.event = Some(value.trim().to_string());
        }
    }

    fn finish(&mut self, out: &mut VecDeque<String>) {
        self.dispatch(out);
    }
}

/// Newline-delimited JSON: yields every non-blank line
#[derive(Debug, Default)]
pub struct LineDecoder;

impl Decoder for LineDecoder {
    fn line(&mut self, line: &str, out: &mut VecDeque<String>) {
        let line = line.trim();
        if !line.is_empty() {
            out.push_back(line.to_string());
        }
    }
}

struct Framer<D> {
    buffer: Vec<u8>,
    decoder: D,
}

impl<D: Decoder> Framer<D> {
    fn feed(&mut self, chunk: &[u8], out: &mut VecDeque<String>) {
        self.buffer.extend_from_slice(chunk);
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.emit(&line, out);
        }
    }

    fn finish(&mut self, out: &mut VecDeque<String>) {
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.emit(&line, out);
        }
        self.decoder.finish(out);
    }

    fn emit(&mut self, line: &[u8], out: &mut VecDeque<String>) {
        let text = String::from_utf8_lossy(line);
        let text = text.trim_end_matches(|c| c == '\n' || c == '\r');
        self.decoder.line(text, out);
    }
}

/// Decode a byte stream into frame payloads
///
/// A transport error ends the stream after yielding one error item.
pub fn decode_stream<D, S, E>(bytes: S, decoder: D) -> FrameStream
where
    D: Decoder + 'static,
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let framer = Framer {
        buffer: Vec::new(),
        decoder,
    };
    let state = (Box::pin(bytes), framer, VecDeque::new(), false);

    Box::pin(futures::stream::unfold(
        state,
        |(mut bytes, mut framer, mut pending, mut done)| async move {
            loop {
                if let Some(frame) = pending.pop_front() {
                    return Some((Ok(frame), (bytes, framer, pending, done)));
                }
                if done {
                    return None;
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => framer.feed(&chunk, &mut pending),
                    Some(Err(e)) => {
                        tracing::error!("Engine stream read failed: {}", e);
                        let err = LexaiError::Engine(format!("Stream read failed: {}", e));
                        return Some((Err(err.into()), (bytes, framer, pending, true)));
                    }
                    None => {
                        framer.finish(&mut pending);
                        done = true;
                    }
                }
            }
        },
    ))
}

/// Decode a server-sent event response body
pub fn sse_frames(response: reqwest::Response) -> FrameStream {
    decode_stream(response.bytes_stream(), SseDecoder::new())
}

/// Decode a newline-delimited JSON response body
pub fn ndjson_frames(response: reqwest::Response) -> FrameStream {
    decode_stream(response.bytes_stream(), LineDecoder)
}
