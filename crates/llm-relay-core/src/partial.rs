//! The partial-message state machine shared by every adapter.
//!
//! Adapters never construct [`AssistantMessageEvent`]s themselves. They
//! drive a [`MessageBuilder`], which mutates the in-progress
//! [`AssistantMessage`] in place, enforces the per-index
//! start → delta → end ordering, and queues a snapshot-carrying event for
//! each step. The streaming driver drains the queue after every vendor
//! chunk.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::accumulate::ArgumentAccumulator;
use crate::chat::{AssistantMessage, ContentBlock, StopReason, TextContent, ThinkingContent, ToolCall};
use crate::error::LlmError;
use crate::model::{Model, ModelCost};
use crate::stream::AssistantMessageEvent;
use crate::usage::Usage;

/// Placeholder text for reasoning the vendor redacted.
pub const REDACTED_THINKING: &str = "[Reasoning redacted]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    Thinking,
    ToolCall,
}

impl BlockKind {
    fn name(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Thinking => "thinking",
            Self::ToolCall => "toolCall",
        }
    }
}

/// Builds one assistant message from vendor stream callbacks.
#[derive(Debug)]
pub struct MessageBuilder {
    message: Arc<AssistantMessage>,
    prices: ModelCost,
    open: BTreeMap<usize, BlockKind>,
    arguments: ArgumentAccumulator,
    events: Vec<AssistantMessageEvent>,
    started: bool,
    finished: bool,
}

impl MessageBuilder {
    /// A builder for a message produced by `model`.
    pub fn new(model: &Model) -> Self {
        Self {
            message: Arc::new(AssistantMessage::empty(
                model.api,
                model.provider.clone(),
                model.id.clone(),
            )),
            prices: model.cost,
            open: BTreeMap::new(),
            arguments: ArgumentAccumulator::new(),
            events: Vec::new(),
            started: false,
            finished: false,
        }
    }

    /// Events share the message; a mutation copies it only while an
    /// earlier snapshot is still alive.
    fn snapshot(&self) -> Arc<AssistantMessage> {
        Arc::clone(&self.message)
    }

    fn block_mut(&mut self, index: usize) -> Option<&mut ContentBlock> {
        Arc::make_mut(&mut self.message).content.get_mut(index)
    }

    fn push(&mut self, event: AssistantMessageEvent) {
        self.events.push(event);
    }

    /// The in-progress message.
    pub fn message(&self) -> &AssistantMessage {
        &self.message
    }

    /// Whether `done` or `error` has been queued.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Takes every queued event, oldest first.
    pub fn drain(&mut self) -> Vec<AssistantMessageEvent> {
        std::mem::take(&mut self.events)
    }

    /// Queues the `start` event. Idempotent.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        let partial = self.snapshot();
        self.push(AssistantMessageEvent::Start { partial });
    }

    /// Records the vendor's response id.
    pub fn set_response_id(&mut self, id: impl Into<String>) {
        Arc::make_mut(&mut self.message).response_id = Some(id.into());
    }

    /// Sets the stop reason reported by the vendor.
    pub fn set_stop_reason(&mut self, reason: StopReason) {
        Arc::make_mut(&mut self.message).stop_reason = reason;
    }

    /// Mutates the usage counters, then re-derives total and cost.
    pub fn update_usage(&mut self, f: impl FnOnce(&mut Usage)) {
        let message = Arc::make_mut(&mut self.message);
        f(&mut message.usage);
        message.usage.settle(&self.prices);
    }

    // ── Block lifecycle ─────────────────────────────────────────────

    fn open_block(&mut self, block: ContentBlock, kind: BlockKind) -> usize {
        self.start();
        let index = self.message.content.len();
        Arc::make_mut(&mut self.message).content.push(block);
        self.open.insert(index, kind);
        index
    }

    fn check_open(&self, index: usize, kind: BlockKind) -> Result<(), LlmError> {
        match self.open.get(&index) {
            Some(open) if *open == kind => Ok(()),
            Some(open) => Err(LlmError::Protocol {
                message: format!(
                    "{} event for content index {index}, which is a {} block",
                    kind.name(),
                    open.name()
                ),
                raw: String::new(),
            }),
            None => Err(LlmError::Protocol {
                message: format!("{} event for unknown or closed content index {index}", kind.name()),
                raw: String::new(),
            }),
        }
    }

    /// Opens a text block and returns its content index.
    pub fn begin_text(&mut self) -> usize {
        let index = self.open_block(ContentBlock::text(""), BlockKind::Text);
        let partial = self.snapshot();
        self.push(AssistantMessageEvent::TextStart {
            content_index: index,
            partial,
        });
        index
    }

    /// Appends to an open text block.
    pub fn text_delta(&mut self, index: usize, delta: &str) -> Result<(), LlmError> {
        self.check_open(index, BlockKind::Text)?;
        if let Some(ContentBlock::Text(text)) = self.block_mut(index) {
            text.text.push_str(delta);
        }
        let partial = self.snapshot();
        self.push(AssistantMessageEvent::TextDelta {
            content_index: index,
            delta: delta.to_owned(),
            partial,
        });
        Ok(())
    }

    /// Closes a text block.
    pub fn end_text(&mut self, index: usize) -> Result<(), LlmError> {
        self.check_open(index, BlockKind::Text)?;
        self.open.remove(&index);
        let content = match self.message.content.get(index) {
            Some(ContentBlock::Text(TextContent { text, .. })) => text.clone(),
            _ => String::new(),
        };
        let partial = self.snapshot();
        self.push(AssistantMessageEvent::TextEnd {
            content_index: index,
            content,
            partial,
        });
        Ok(())
    }

    /// Opens a thinking block and returns its content index.
    pub fn begin_thinking(&mut self) -> usize {
        let index = self.open_block(ContentBlock::Thinking(ThinkingContent::default()), BlockKind::Thinking);
        let partial = self.snapshot();
        self.push(AssistantMessageEvent::ThinkingStart {
            content_index: index,
            partial,
        });
        index
    }

    /// Emits a complete redacted-thinking block (start then end). The
    /// encrypted payload is kept as the block's signature.
    pub fn redacted_thinking(&mut self, data: impl Into<String>) {
        let index = self.open_block(
            ContentBlock::Thinking(ThinkingContent {
                thinking: REDACTED_THINKING.into(),
                signature: Some(data.into()),
                redacted: true,
            }),
            BlockKind::Thinking,
        );
        let partial = self.snapshot();
        self.push(AssistantMessageEvent::ThinkingStart {
            content_index: index,
            partial,
        });
        // The block was opened just above, so closing cannot fail.
        let _ = self.end_thinking(index);
    }

    /// Appends to an open thinking block.
    pub fn thinking_delta(&mut self, index: usize, delta: &str) -> Result<(), LlmError> {
        self.check_open(index, BlockKind::Thinking)?;
        if let Some(ContentBlock::Thinking(thinking)) = self.block_mut(index) {
            thinking.thinking.push_str(delta);
        }
        let partial = self.snapshot();
        self.push(AssistantMessageEvent::ThinkingDelta {
            content_index: index,
            delta: delta.to_owned(),
            partial,
        });
        Ok(())
    }

    /// Closes a thinking block.
    pub fn end_thinking(&mut self, index: usize) -> Result<(), LlmError> {
        self.check_open(index, BlockKind::Thinking)?;
        self.open.remove(&index);
        let content = match self.message.content.get(index) {
            Some(ContentBlock::Thinking(thinking)) => thinking.thinking.clone(),
            _ => String::new(),
        };
        let partial = self.snapshot();
        self.push(AssistantMessageEvent::ThinkingEnd {
            content_index: index,
            content,
            partial,
        });
        Ok(())
    }

    /// Opens a tool call and returns its content index.
    pub fn begin_tool_call(&mut self, id: impl Into<String>, name: impl Into<String>) -> usize {
        let index = self.open_block(
            ContentBlock::ToolCall(ToolCall {
                id: id.into(),
                name: name.into(),
                arguments: Value::Object(serde_json::Map::new()),
                thought_signature: None,
            }),
            BlockKind::ToolCall,
        );
        let partial = self.snapshot();
        self.push(AssistantMessageEvent::ToolCallStart {
            content_index: index,
            partial,
        });
        index
    }

    /// Buffers an argument fragment for an open tool call.
    pub fn tool_call_delta(&mut self, index: usize, fragment: &str) -> Result<(), LlmError> {
        self.check_open(index, BlockKind::ToolCall)?;
        self.arguments.push(index, fragment);
        let partial = self.snapshot();
        self.push(AssistantMessageEvent::ToolCallDelta {
            content_index: index,
            delta: fragment.to_owned(),
            partial,
        });
        Ok(())
    }

    /// Replaces the argument buffer of an open tool call, for vendors that
    /// resend the full argument string when the call completes.
    pub fn replace_tool_call_arguments(&mut self, index: usize, full: &str) -> Result<(), LlmError> {
        self.check_open(index, BlockKind::ToolCall)?;
        if self.arguments.buffered(index) != Some(full) {
            self.arguments.finish(index);
            self.arguments.push(index, full);
        }
        Ok(())
    }

    /// The argument text buffered so far for an open tool call.
    pub fn buffered_arguments(&self, index: usize) -> Option<&str> {
        self.arguments.buffered(index)
    }

    /// Closes a tool call, parsing its buffered arguments.
    pub fn end_tool_call(&mut self, index: usize) -> Result<(), LlmError> {
        self.check_open(index, BlockKind::ToolCall)?;
        self.open.remove(&index);
        let parsed = self.arguments.finish(index);
        let Some(ContentBlock::ToolCall(call)) = self.block_mut(index) else {
            return Err(LlmError::Protocol {
                message: format!("content index {index} is not a tool call"),
                raw: String::new(),
            });
        };
        call.arguments = parsed.value;
        let tool_call = call.clone();
        if let Some(err) = &parsed.error {
            warn!(tool = %tool_call.name, error = %err.message, "tool-call arguments are not valid JSON");
        }
        let partial = self.snapshot();
        self.push(AssistantMessageEvent::ToolCallEnd {
            content_index: index,
            tool_call,
            parse_error: parsed.error,
            partial,
        });
        Ok(())
    }

    /// Sets the opaque signature of a block: the text signature, the
    /// thinking signature, or the tool call's thought signature.
    pub fn set_signature(&mut self, index: usize, signature: impl Into<String>) {
        let signature = signature.into();
        match self.block_mut(index) {
            Some(ContentBlock::Text(text)) => text.signature = Some(signature),
            Some(ContentBlock::Thinking(thinking)) => thinking.signature = Some(signature),
            Some(ContentBlock::ToolCall(call)) => call.thought_signature = Some(signature),
            _ => {}
        }
    }

    /// Appends a streamed signature fragment to a thinking block.
    pub fn signature_delta(&mut self, index: usize, fragment: &str) {
        if let Some(ContentBlock::Thinking(thinking)) = self.block_mut(index) {
            thinking.signature.get_or_insert_with(String::new).push_str(fragment);
        }
    }

    /// Renames an open tool call (vendors that announce the id late).
    pub fn set_tool_call_id(&mut self, index: usize, id: impl Into<String>) {
        if let Some(ContentBlock::ToolCall(call)) = self.block_mut(index) {
            call.id = id.into();
        }
    }

    /// Content indices of blocks that are still open.
    pub fn open_indices(&self) -> Vec<usize> {
        self.open.keys().copied().collect()
    }

    /// Closes a block of any kind.
    pub fn end_block(&mut self, index: usize) -> Result<(), LlmError> {
        match self.open.get(&index) {
            Some(BlockKind::Text) => self.end_text(index),
            Some(BlockKind::Thinking) => self.end_thinking(index),
            Some(BlockKind::ToolCall) => self.end_tool_call(index),
            None => Ok(()),
        }
    }

    // ── Terminal events ─────────────────────────────────────────────

    /// Closes any open blocks in index order, settles usage, and queues
    /// `done`. A message that carries a tool call and would otherwise
    /// report `stop` reports `toolUse`.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.start();
        for index in self.open_indices() {
            if let Err(e) = self.end_block(index) {
                warn!(error = %e, "failed to close content block");
            }
        }
        let message = Arc::make_mut(&mut self.message);
        if message.stop_reason == StopReason::Stop && !message.tool_calls().is_empty() {
            message.stop_reason = StopReason::ToolUse;
        }
        message.usage.settle(&self.prices);
        self.finished = true;
        let reason = self.message.stop_reason;
        let message = self.snapshot();
        self.push(AssistantMessageEvent::Done { reason, message });
    }

    /// Records the failure and queues the terminal `error` event. Open
    /// blocks stay open; their content so far remains in the message.
    pub fn fail(&mut self, err: &LlmError) {
        if self.finished {
            return;
        }
        self.start();
        let reason = if err.is_abort() {
            StopReason::Aborted
        } else {
            StopReason::Error
        };
        let message = Arc::make_mut(&mut self.message);
        message.stop_reason = reason;
        message.error_message = Some(err.to_string());
        message.usage.settle(&self.prices);
        self.open.clear();
        self.finished = true;
        let error = self.snapshot();
        self.push(AssistantMessageEvent::Error { reason, error });
    }
}
