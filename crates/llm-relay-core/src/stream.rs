//! The canonical event contract.
//!
//! Every adapter translates its vendor stream into a sequence of
//! [`AssistantMessageEvent`]s delivered through an
//! [`AssistantMessageEventStream`]. The sequence is lawful:
//!
//! 1. exactly one [`Start`](AssistantMessageEvent::Start) comes first;
//! 2. for each content index, its `*Start` strictly precedes its
//!    `*Delta`s, which strictly precede its `*End`;
//! 3. indices are assigned once, in vendor emission order, and never
//!    reused;
//! 4. the stream ends with exactly one [`Done`](AssistantMessageEvent::Done)
//!    or exactly one [`Error`](AssistantMessageEvent::Error), never both.
//!
//! Errors are events, not `Err` items: nothing a vendor does can make the
//! stream yield anything but these variants.
//!
//! # Snapshots
//!
//! Each event carries an `Arc<AssistantMessage>` snapshot of the
//! in-progress message taken at emission time. Holding on to an event
//! across `.await` points is safe; later mutations never show through.
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use llm_relay_core::{AssistantMessageEvent, AssistantMessageEventStream};
//!
//! async fn print_stream(mut stream: AssistantMessageEventStream) {
//!     while let Some(event) = stream.next().await {
//!         match event {
//!             AssistantMessageEvent::TextDelta { delta, .. } => print!("{delta}"),
//!             AssistantMessageEvent::Done { reason, .. } => println!("\n[done: {reason:?}]"),
//!             AssistantMessageEvent::Error { error, .. } => {
//!                 eprintln!("failed: {:?}", error.error_message);
//!             }
//!             _ => {}
//!         }
//!     }
//! }
//! ```

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;

use crate::accumulate::ArgumentParseError;
use crate::chat::{AssistantMessage, StopReason, ToolCall};

/// A pinned, boxed, `Send` stream of [`AssistantMessageEvent`]s.
pub type AssistantMessageEventStream = Pin<Box<dyn Stream<Item = AssistantMessageEvent> + Send>>;

/// One step of an assistant response.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum AssistantMessageEvent {
    /// The call has started; `partial` is empty.
    Start {
        /// Snapshot of the in-progress message.
        partial: Arc<AssistantMessage>,
    },
    /// A text block opened at `content_index`.
    TextStart {
        /// Index into `partial.content`.
        content_index: usize,
        /// Snapshot of the in-progress message.
        partial: Arc<AssistantMessage>,
    },
    /// Text appended to the block at `content_index`.
    TextDelta {
        /// Index into `partial.content`.
        content_index: usize,
        /// The appended fragment.
        delta: String,
        /// Snapshot of the in-progress message.
        partial: Arc<AssistantMessage>,
    },
    /// The text block at `content_index` is complete.
    TextEnd {
        /// Index into `partial.content`.
        content_index: usize,
        /// The block's full text (the concatenation of its deltas).
        content: String,
        /// Snapshot of the in-progress message.
        partial: Arc<AssistantMessage>,
    },
    /// A thinking block opened at `content_index`.
    ThinkingStart {
        /// Index into `partial.content`.
        content_index: usize,
        /// Snapshot of the in-progress message.
        partial: Arc<AssistantMessage>,
    },
    /// Reasoning text appended to the block at `content_index`.
    ThinkingDelta {
        /// Index into `partial.content`.
        content_index: usize,
        /// The appended fragment.
        delta: String,
        /// Snapshot of the in-progress message.
        partial: Arc<AssistantMessage>,
    },
    /// The thinking block at `content_index` is complete.
    ThinkingEnd {
        /// Index into `partial.content`.
        content_index: usize,
        /// The block's full reasoning text.
        content: String,
        /// Snapshot of the in-progress message.
        partial: Arc<AssistantMessage>,
    },
    /// A tool call opened at `content_index`. Its id and name are already
    /// present in `partial`.
    ToolCallStart {
        /// Index into `partial.content`.
        content_index: usize,
        /// Snapshot of the in-progress message.
        partial: Arc<AssistantMessage>,
    },
    /// A raw argument fragment for the call at `content_index`.
    ToolCallDelta {
        /// Index into `partial.content`.
        content_index: usize,
        /// The raw JSON fragment.
        delta: String,
        /// Snapshot of the in-progress message.
        partial: Arc<AssistantMessage>,
    },
    /// The call at `content_index` is complete and its arguments parsed.
    ToolCallEnd {
        /// Index into `partial.content`.
        content_index: usize,
        /// The finished call.
        tool_call: ToolCall,
        /// Set when the argument buffer was not valid JSON; the call's
        /// arguments are then `{}`.
        parse_error: Option<ArgumentParseError>,
        /// Snapshot of the in-progress message.
        partial: Arc<AssistantMessage>,
    },
    /// The response finished normally. Always the last event.
    Done {
        /// `Stop`, `Length`, or `ToolUse`.
        reason: StopReason,
        /// The final message.
        message: Arc<AssistantMessage>,
    },
    /// The response failed or was cancelled. Always the last event.
    Error {
        /// `Error` or `Aborted`.
        reason: StopReason,
        /// The final message, with `error_message` populated.
        error: Arc<AssistantMessage>,
    },
}

impl AssistantMessageEvent {
    /// The content index for per-block events.
    pub fn content_index(&self) -> Option<usize> {
        match self {
            Self::TextStart { content_index, .. }
            | Self::TextDelta { content_index, .. }
            | Self::TextEnd { content_index, .. }
            | Self::ThinkingStart { content_index, .. }
            | Self::ThinkingDelta { content_index, .. }
            | Self::ThinkingEnd { content_index, .. }
            | Self::ToolCallStart { content_index, .. }
            | Self::ToolCallDelta { content_index, .. }
            | Self::ToolCallEnd { content_index, .. } => Some(*content_index),
            Self::Start { .. } | Self::Done { .. } | Self::Error { .. } => None,
        }
    }

    /// The message snapshot this event carries.
    pub fn partial(&self) -> &Arc<AssistantMessage> {
        match self {
            Self::Start { partial }
            | Self::TextStart { partial, .. }
            | Self::TextDelta { partial, .. }
            | Self::TextEnd { partial, .. }
            | Self::ThinkingStart { partial, .. }
            | Self::ThinkingDelta { partial, .. }
            | Self::ThinkingEnd { partial, .. }
            | Self::ToolCallStart { partial, .. }
            | Self::ToolCallDelta { partial, .. }
            | Self::ToolCallEnd { partial, .. } => partial,
            Self::Done { message, .. } => message,
            Self::Error { error, .. } => error,
        }
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }

    /// Stable snake_case name, used in logs and test assertions.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::TextStart { .. } => "text_start",
            Self::TextDelta { .. } => "text_delta",
            Self::TextEnd { .. } => "text_end",
            Self::ThinkingStart { .. } => "thinking_start",
            Self::ThinkingDelta { .. } => "thinking_delta",
            Self::ThinkingEnd { .. } => "thinking_end",
            Self::ToolCallStart { .. } => "toolcall_start",
            Self::ToolCallDelta { .. } => "toolcall_delta",
            Self::ToolCallEnd { .. } => "toolcall_end",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ApiKind;

    fn snapshot() -> Arc<AssistantMessage> {
        Arc::new(AssistantMessage::empty(
            ApiKind::AnthropicMessages,
            "anthropic",
            "claude",
        ))
    }

    #[test]
    fn test_content_index_only_on_block_events() {
        let partial = snapshot();
        let start = AssistantMessageEvent::Start {
            partial: Arc::clone(&partial),
        };
        let delta = AssistantMessageEvent::TextDelta {
            content_index: 2,
            delta: "hi".into(),
            partial: Arc::clone(&partial),
        };
        assert_eq!(start.content_index(), None);
        assert_eq!(delta.content_index(), Some(2));
    }

    #[test]
    fn test_terminal_events() {
        let partial = snapshot();
        let done = AssistantMessageEvent::Done {
            reason: StopReason::Stop,
            message: Arc::clone(&partial),
        };
        let error = AssistantMessageEvent::Error {
            reason: StopReason::Aborted,
            error: Arc::clone(&partial),
        };
        assert!(done.is_terminal());
        assert!(error.is_terminal());
        assert!(
            !AssistantMessageEvent::ThinkingStart {
                content_index: 0,
                partial
            }
            .is_terminal()
        );
    }

    #[test]
    fn test_kind_names() {
        let partial = snapshot();
        let event = AssistantMessageEvent::ToolCallDelta {
            content_index: 0,
            delta: "{".into(),
            partial,
        };
        assert_eq!(event.kind(), "toolcall_delta");
    }

    #[test]
    fn test_stream_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<AssistantMessageEventStream>();
        assert_send::<AssistantMessageEvent>();
    }
}
