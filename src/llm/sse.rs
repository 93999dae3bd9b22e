//! Server-sent-event decoding for streaming provider responses.
//!
//! DESIGN
//! ======
//! Providers deliver `data:` lines split arbitrarily across network reads.
//! [`SseDecoder`] buffers raw bytes until a full line is available and hands
//! back only the `data:` payloads. [`decode_stream`] drives a byte stream
//! through the decoder and a vendor-specific payload parser, producing the
//! normalized [`ChunkStream`].
//!
//! TRADE-OFFS
//! ==========
//! A payload the parser rejects is logged and dropped; the stream keeps
//! going. A transport error ends the stream with one `Err` item.

use futures::{Stream, StreamExt};

use super::types::{ChunkStream, LlmError, StreamChunk};

/// Sentinel payload some vendors send to close a stream.
pub const DONE_SENTINEL: &str = "[DONE]";

// =============================================================================
// LINE DECODER
// =============================================================================

/// Incremental `data:` line extractor.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes; return every complete `data:` payload now available.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(payload) = data_payload(&line[..line.len() - 1]) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Flush a trailing line that never received its newline.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        data_payload(&rest)
    }
}

/// Extract the payload of a single `data:` line. Other fields (`event:`,
/// `id:`, comments) and blank separators yield `None`.
fn data_payload(line: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim_end_matches('\r');
    let payload = text.strip_prefix("data:")?.trim();
    if payload.is_empty() {
        return None;
    }
    Some(payload.to_string())
}

// =============================================================================
// STREAM DRIVER
// =============================================================================

/// Outcome of parsing one `data:` payload.
#[derive(Debug, PartialEq, Eq)]
pub enum PayloadOutcome {
    /// Zero or more chunks to forward.
    Chunks(Vec<StreamChunk>),
    /// The vendor signaled end of stream.
    End,
    /// The vendor reported an error inside the stream.
    Failed(String),
}

/// Turn a raw byte stream into a normalized [`ChunkStream`].
///
/// `parse` maps one payload to an outcome; `Err` means the payload was
/// malformed and is skipped. The returned stream always ends with
/// [`StreamChunk::Done`] unless it ends with an error.
pub fn decode_stream<S, B, E, F>(bytes: S, parse: F) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
    F: Fn(&str) -> Result<PayloadOutcome, String> + Send + Sync + 'static,
{
    let stream = async_stream::stream! {
        let mut decoder = SseDecoder::new();
        let mut bytes = std::pin::pin!(bytes);

        while let Some(next) = bytes.next().await {
            let chunk = match next {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(LlmError::ApiRequest(e.to_string()));
                    return;
                }
            };
            for payload in decoder.push(chunk.as_ref()) {
                let step = classify(&payload, &parse);
                match step {
                    Step::Forward(chunks) => {
                        for c in chunks {
                            yield Ok(c);
                        }
                    }
                    Step::End => {
                        yield Ok(StreamChunk::Done);
                        return;
                    }
                    Step::Fail(message) => {
                        yield Err(LlmError::Stream(message));
                        return;
                    }
                }
            }
        }

        if let Some(payload) = decoder.finish() {
            let step = classify(&payload, &parse);
            match step {
                Step::Forward(chunks) => {
                    for c in chunks {
                        yield Ok(c);
                    }
                }
                Step::End => {}
                Step::Fail(message) => {
                    yield Err(LlmError::Stream(message));
                    return;
                }
            }
        }
        yield Ok(StreamChunk::Done);
    };
    Box::pin(stream)
}

enum Step {
    Forward(Vec<StreamChunk>),
    End,
    Fail(String),
}

fn classify<F>(payload: &str, parse: &F) -> Step
where
    F: Fn(&str) -> Result<PayloadOutcome, String>,
{
    if payload == DONE_SENTINEL {
        return Step::End;
    }
    match parse(payload) {
        Ok(PayloadOutcome::Chunks(chunks)) => Step::Forward(chunks),
        Ok(PayloadOutcome::End) => Step::End,
        Ok(PayloadOutcome::Failed(message)) => Step::Fail(message),
        Err(reason) => {
            tracing::debug!(%reason, payload_len = payload.len(), "sse: skipping malformed chunk");
            Step::Forward(Vec::new())
        }
    }
}

#[cfg(test)]
#[path = "sse_test.rs"]
mod tests;
