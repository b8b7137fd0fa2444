//! Incremental parsing of streamed provider responses.
//!
//! Two wire framings exist in the wild:
//! - newline-delimited JSON objects `{"message":{"content":...},"done":bool}`
//!   (ollama chat), and
//! - server-sent-event lines `data: {json}` terminated by a literal
//!   `data: [DONE]` (OpenAI-compatible servers), with the delta at
//!   `choices[0].delta.content`.
//!
//! The accumulator buffers an incomplete trailing line across reads, skips
//! malformed lines instead of failing, and emits the running concatenation
//! after every parsed fragment so callers can render partial progress.

use serde::Deserialize;
use tracing::debug;

/// Wire framing for a streamed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Newline-delimited JSON objects with a `done` flag.
    JsonLines,
    /// `data: `-prefixed SSE lines ending with `data: [DONE]`.
    EventStream,
}

const SSE_DATA_PREFIX: &str = "data: ";
const SSE_DONE_SENTINEL: &str = "[DONE]";

#[derive(Deserialize)]
struct JsonLineFrame {
    #[serde(default)]
    message: Option<JsonLineMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Deserialize)]
struct JsonLineMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct SseFrame {
    #[serde(default)]
    choices: Vec<SseChoice>,
}

#[derive(Deserialize)]
struct SseChoice {
    #[serde(default)]
    delta: SseDelta,
}

#[derive(Deserialize, Default)]
struct SseDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Running concatenation of streamed text fragments.
pub struct StreamAccumulator {
    framing: Framing,
    /// Incomplete trailing line carried over between reads
    buffer: String,
    text: String,
    finished: bool,
}

impl StreamAccumulator {
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            buffer: String::new(),
            text: String::new(),
            finished: false,
        }
    }

    /// Feed one chunk of raw bytes; returns the accumulated snapshot after
    /// each fragment parsed from this chunk, in stream order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        if self.finished {
            return Vec::new();
        }

        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut snapshots = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }

            if let Some(fragment) = self.parse_line(line) {
                self.text.push_str(&fragment);
                snapshots.push(self.text.clone());
            }
            if self.finished {
                break;
            }
        }

        snapshots
    }

    /// Mark the underlying stream exhausted; flushes a complete final line
    /// left in the buffer (streams are not required to end with a newline).
    pub fn finish(&mut self) -> Option<String> {
        if self.finished {
            return None;
        }
        self.finished = true;

        let line = std::mem::take(&mut self.buffer);
        let line = line.trim_end();
        if line.is_empty() {
            return None;
        }

        // Temporarily un-finish so parse_line can flip the flag itself
        self.finished = false;
        let fragment = self.parse_line(line);
        self.finished = true;

        fragment.map(|f| {
            self.text.push_str(&f);
            self.text.clone()
        })
    }

    /// Extract the text fragment from one complete line, if any.
    /// Malformed lines are skipped, not fatal.
    fn parse_line(&mut self, line: &str) -> Option<String> {
        match self.framing {
            Framing::JsonLines => match serde_json::from_str::<JsonLineFrame>(line) {
                Ok(frame) => {
                    if frame.done {
                        self.finished = true;
                    }
                    frame
                        .message
                        .map(|m| m.content)
                        .filter(|c| !c.is_empty())
                }
                Err(e) => {
                    debug!("Skipping malformed stream line: {e}");
                    None
                }
            },
            Framing::EventStream => {
                let payload = line.strip_prefix(SSE_DATA_PREFIX)?;
                if payload == SSE_DONE_SENTINEL {
                    self.finished = true;
                    return None;
                }
                match serde_json::from_str::<SseFrame>(payload) {
                    Ok(frame) => frame
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|c| c.delta.content)
                        .filter(|c| !c.is_empty()),
                    Err(e) => {
                        debug!("Skipping malformed SSE line: {e}");
                        None
                    }
                }
            }
        }
    }

    /// True once a `done` flag, `[DONE]` sentinel, or stream end was seen.
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Latest accumulated snapshot.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }
}
