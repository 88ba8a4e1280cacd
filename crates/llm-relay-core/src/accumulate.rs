//! Tool-call argument accumulation.
//!
//! Vendors stream tool-call arguments as raw JSON fragments that are only
//! valid once concatenated. [`ArgumentAccumulator`] buffers fragments per
//! content index and parses the result when the call ends. Parsing never
//! fails the stream: a malformed buffer yields `{}` plus an
//! [`ArgumentParseError`] holding the raw text.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::error::LlmError;

/// A tool call's argument buffer did not parse as JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgumentParseError {
    /// The concatenated fragments, exactly as received.
    pub raw: String,
    /// The JSON parser's complaint.
    pub message: String,
}

impl From<ArgumentParseError> for LlmError {
    fn from(err: ArgumentParseError) -> Self {
        Self::ArgumentParse {
            raw: err.raw,
            message: err.message,
        }
    }
}

/// The outcome of [`ArgumentAccumulator::finish`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedArguments {
    /// Parsed arguments, or `{}` when parsing failed.
    pub value: Value,
    /// Present when parsing failed.
    pub error: Option<ArgumentParseError>,
}

/// Per-call buffers of argument fragments keyed by content index.
#[derive(Debug, Default)]
pub struct ArgumentAccumulator {
    buffers: HashMap<usize, String>,
}

impl ArgumentAccumulator {
    /// An accumulator with no open buffers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fragment to the buffer for `index`, opening it if needed.
    pub fn push(&mut self, index: usize, fragment: &str) {
        self.buffers.entry(index).or_default().push_str(fragment);
    }

    /// The fragments received so far for `index`.
    pub fn buffered(&self, index: usize) -> Option<&str> {
        self.buffers.get(&index).map(String::as_str)
    }

    /// Closes the buffer for `index` and parses it.
    ///
    /// An empty or missing buffer is an empty argument object.
    pub fn finish(&mut self, index: usize) -> ParsedArguments {
        let raw = self.buffers.remove(&index).unwrap_or_default();
        parse_arguments(raw)
    }
}

fn parse_arguments(raw: String) -> ParsedArguments {
    if raw.trim().is_empty() {
        return ParsedArguments {
            value: Value::Object(Map::new()),
            error: None,
        };
    }
    match serde_json::from_str::<Value>(&raw) {
        Ok(value) => ParsedArguments { value, error: None },
        Err(e) => ParsedArguments {
            value: Value::Object(Map::new()),
            error: Some(ArgumentParseError {
                raw,
                message: e.to_string(),
            }),
        },
    }
}
