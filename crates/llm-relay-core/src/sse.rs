//! Incremental Server-Sent Events decoding.
//!
//! All four vendor protocols stream over SSE. [`SseDecoder`] accepts raw
//! network chunks, which may split UTF-8 sequences and event boundaries
//! anywhere, and yields complete [`SseEvent`]s.

use crate::error::LlmError;

/// Maximum bytes buffered without seeing an event boundary.
const MAX_BUFFER: usize = 16 * 1024 * 1024; // 16 MiB

/// One dispatched SSE event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    /// The `event:` field, when present.
    pub event: Option<String>,
    /// The `data:` field(s), joined with `\n`.
    pub data: String,
    /// The `id:` field, when present.
    pub id: Option<String>,
}

impl SseEvent {
    /// Whether this is the OpenAI-style `[DONE]` sentinel.
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

#[derive(Debug, Default)]
struct EventBuilder {
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl EventBuilder {
    fn line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.find(':') {
            Some(pos) => {
                let value = &line[pos + 1..];
                (&line[..pos], value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line, ""),
        };
        match field {
            "data" => self.data.push(value.to_owned()),
            "event" => self.event = Some(value.to_owned()),
            "id" => self.id = Some(value.to_owned()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() {
            self.event = None;
            return None;
        }
        Some(SseEvent {
            event: self.event.take(),
            data: std::mem::take(&mut self.data).join("\n"),
            id: self.id.take(),
        })
    }
}

/// Stateful decoder fed with network chunks.
#[derive(Debug, Default)]
pub struct SseDecoder {
    utf8: Vec<u8>,
    line: String,
    builder: EventBuilder,
}

impl SseDecoder {
    /// A decoder with empty buffers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns every event it completed.
    ///
    /// Incomplete UTF-8 sequences at the end of a chunk are held until the
    /// next one; permanently invalid bytes are skipped.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, LlmError> {
        self.utf8.extend_from_slice(chunk);
        if self.utf8.len() + self.line.len() > MAX_BUFFER {
            self.utf8.clear();
            self.line.clear();
            return Err(LlmError::Protocol {
                message: "SSE buffer exceeded 16 MiB without an event boundary".into(),
                raw: String::new(),
            });
        }

        let mut text = String::new();
        loop {
            match std::str::from_utf8(&self.utf8) {
                Ok(valid) => {
                    text.push_str(valid);
                    self.utf8.clear();
                    break;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&self.utf8[..valid_up_to]));
                    match e.error_len() {
                        // Truncated sequence: wait for the rest.
                        None => {
                            self.utf8.drain(..valid_up_to);
                            break;
                        }
                        Some(len) => {
                            self.utf8.drain(..valid_up_to + len);
                        }
                    }
                }
            }
        }

        let mut events = Vec::new();
        for ch in text.chars() {
            if ch == '\n' {
                let line = std::mem::take(&mut self.line);
                let line = line.strip_suffix('\r').unwrap_or(&line);
                if let Some(event) = self.builder.line(line) {
                    events.push(event);
                }
            } else {
                self.line.push(ch);
            }
        }
        Ok(events)
    }

    /// Dispatches whatever remains once the body ends.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.line.is_empty() {
            let line = std::mem::take(&mut self.line);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(event) = self.builder.line(line) {
                return Some(event);
            }
        }
        self.builder.dispatch()
    }
}
