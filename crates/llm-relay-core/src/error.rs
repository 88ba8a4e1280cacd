//! Unified error type for every adapter.
//!
//! Each adapter maps its native failures into [`LlmError`]. Errors never
//! escape a stream as `Err` items: the streaming driver folds them into
//! a terminal [`Error`](crate::stream::AssistantMessageEvent::Error) event
//! whose message carries the rendered error text. The variants still
//! matter to callers because the awaited mode and the driver classify
//! them (abort vs. failure), and because [`LlmError::is_retryable`] is
//! the hook a caller-owned retry policy can use.
//!
//! # Taxonomy
//!
//! | Kind | Variants |
//! |------|----------|
//! | transport | [`Transport`](LlmError::Transport), [`Timeout`](LlmError::Timeout), [`Aborted`](LlmError::Aborted) |
//! | vendor | [`Vendor`](LlmError::Vendor), [`Auth`](LlmError::Auth), [`InvalidRequest`](LlmError::InvalidRequest) |
//! | protocol | [`Protocol`](LlmError::Protocol) |
//! | arguments | [`ArgumentParse`](LlmError::ArgumentParse) |

/// The unified error type returned by adapter internals.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum LlmError {
    /// The request never produced a usable response (DNS, connect, reset,
    /// body read failure).
    #[error("Transport error: {message}")]
    Transport {
        /// What went wrong.
        message: String,
        /// Whether a retry has a chance of succeeding.
        retryable: bool,
    },

    /// The caller-supplied timeout fired inside the transport.
    #[error("Request timed out after {elapsed_ms}ms")]
    Timeout {
        /// The configured timeout, in milliseconds (0 when unknown).
        elapsed_ms: u64,
    },

    /// The caller cancelled the request.
    #[error("Request was aborted")]
    Aborted,

    /// The vendor answered with a non-success status or reported an error
    /// inside the stream.
    #[error("Vendor error (status={status:?}, code={code:?}): {message}")]
    Vendor {
        /// HTTP status, when the error came from a response status line.
        status: Option<http::StatusCode>,
        /// Vendor-specific error code (e.g. `"overloaded_error"`).
        code: Option<String>,
        /// Human-readable description.
        message: String,
    },

    /// Credentials were missing or rejected.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The request could not be built or was rejected as malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The vendor stream was malformed or violated its own framing.
    #[error("Protocol error: {message}")]
    Protocol {
        /// What was wrong with the stream.
        message: String,
        /// The offending payload, for diagnostics.
        raw: String,
    },

    /// A tool call's accumulated argument buffer was not valid JSON.
    #[error("Tool-call arguments are not valid JSON: {message}")]
    ArgumentParse {
        /// The raw concatenated fragments.
        raw: String,
        /// The JSON parser's complaint.
        message: String,
    },
}

impl LlmError {
    /// Returns `true` if the error is transient and the request may
    /// succeed on retry.
    ///
    /// ```rust
    /// use llm_relay_core::LlmError;
    ///
    /// assert!(LlmError::Timeout { elapsed_ms: 5000 }.is_retryable());
    /// assert!(!LlmError::Auth("bad key".into()).is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { retryable, .. } => *retryable,
            Self::Timeout { .. } => true,
            Self::Vendor {
                status: Some(status),
                ..
            } => matches!(status.as_u16(), 408 | 429 | 500 | 502 | 503 | 504 | 529),
            Self::Vendor { code: Some(code), .. } => {
                code.contains("overloaded") || code.contains("rate_limit")
            }
            _ => false,
        }
    }

    /// Whether this error represents caller cancellation.
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// Classify a `reqwest` failure into the transport taxonomy.
    pub fn from_transport(err: &reqwest::Error, timeout: Option<std::time::Duration>) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                elapsed_ms: timeout.map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            }
        } else {
            Self::Transport {
                message: err.to_string(),
                retryable: err.is_connect() || err.is_request() || err.is_body(),
            }
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol {
            message: err.to_string(),
            raw: String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_transport() {
        let err = LlmError::Transport {
            message: "connection reset".into(),
            retryable: true,
        };
        assert!(format!("{err}").contains("connection reset"));
    }

    #[test]
    fn test_display_vendor_includes_status_and_code() {
        let err = LlmError::Vendor {
            status: Some(http::StatusCode::TOO_MANY_REQUESTS),
            code: Some("rate_limit_error".into()),
            message: "slow down".into(),
        };
        let display = format!("{err}");
        assert!(display.contains("429"));
        assert!(display.contains("rate_limit_error"));
        assert!(display.contains("slow down"));
    }

    #[test]
    fn test_display_argument_parse() {
        let err = LlmError::ArgumentParse {
            raw: "{\"a\":".into(),
            message: "EOF while parsing".into(),
        };
        assert!(format!("{err}").contains("EOF while parsing"));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(
            LlmError::Vendor {
                status: Some(http::StatusCode::SERVICE_UNAVAILABLE),
                code: None,
                message: String::new(),
            }
            .is_retryable()
        );
        assert!(
            LlmError::Vendor {
                status: None,
                code: Some("overloaded_error".into()),
                message: String::new(),
            }
            .is_retryable()
        );
        assert!(
            !LlmError::Vendor {
                status: Some(http::StatusCode::NOT_FOUND),
                code: None,
                message: String::new(),
            }
            .is_retryable()
        );
        assert!(!LlmError::Aborted.is_retryable());
        assert!(!LlmError::InvalidRequest("x".into()).is_retryable());
    }

    #[test]
    fn test_is_abort() {
        assert!(LlmError::Aborted.is_abort());
        assert!(!LlmError::Timeout { elapsed_ms: 1 }.is_abort());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: LlmError = json_err.into();
        assert!(matches!(err, LlmError::Protocol { .. }));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<LlmError>();
    }
}
