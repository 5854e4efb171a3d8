//! Incremental decoder for Ollama's newline-delimited JSON chat stream.
//!
//! Bytes are accumulated until a `\n` arrives, so lines (and multi-byte UTF-8
//! sequences) split across network chunks are reassembled before parsing.
//! Lines that are not valid JSON are skipped; they never end the stream.

use super::ollama_client::OllamaChatChunk;

/// Longest line kept in memory while waiting for its newline (1MB).
pub const MAX_LINE_BYTES: usize = 1_048_576;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Incremental assistant content.
    Fragment(String),
    /// The upstream reported an error inside the stream.
    Failed(String),
}

#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
    /// Set while discarding the remainder of an oversized line.
    skipping: bool,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of body bytes, returning events for every line it completes.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        let mut rest = bytes;

        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            let (line, tail) = rest.split_at(pos);
            rest = &tail[1..];

            if self.skipping {
                self.skipping = false;
                self.buffer.clear();
                continue;
            }

            if self.buffer.is_empty() {
                events.extend(decode_line(line));
            } else {
                self.buffer.extend_from_slice(line);
                let full = std::mem::take(&mut self.buffer);
                events.extend(decode_line(&full));
            }
        }

        if !self.skipping {
            if self.buffer.len() + rest.len() > MAX_LINE_BYTES {
                tracing::warn!(
                    limit = MAX_LINE_BYTES,
                    "discarding oversized stream line"
                );
                self.buffer.clear();
                self.skipping = true;
            } else {
                self.buffer.extend_from_slice(rest);
            }
        }

        events
    }

    /// Flush a trailing line that arrived without a newline.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        let line = std::mem::take(&mut self.buffer);
        if std::mem::take(&mut self.skipping) {
            return None;
        }
        decode_line(&line)
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

fn decode_line(line: &[u8]) -> Option<StreamEvent> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return None;
    }

    match serde_json::from_slice::<OllamaChatChunk>(line) {
        Ok(chunk) => {
            if let Some(err) = chunk.error {
                return Some(StreamEvent::Failed(err));
            }
            chunk
                .message
                .and_then(|m| m.content)
                .filter(|c| !c.is_empty())
                .map(StreamEvent::Fragment)
        }
        Err(e) => {
            tracing::debug!(error = %e, line = %String::from_utf8_lossy(line), "skipping malformed stream line");
            None
        }
    }
}
