//! Translation of Anthropic Messages SSE events onto a [`MessageBuilder`].
//!
//! Anthropic numbers content blocks itself; the translator keeps a map
//! from the vendor index to the canonical content index because
//! redacted-thinking blocks open and close in one step and the canonical
//! numbering must stay dense.

use std::collections::HashMap;

use http::StatusCode;
use llm_relay_core::driver::StreamTranslator;
use llm_relay_core::sse::SseEvent;
use llm_relay_core::{LlmError, MessageBuilder, StopReason};
use tracing::debug;

use crate::convert;
use crate::types::{BlockDelta, StreamBlock, StreamEvent, StreamUsage};

/// Maps Anthropic `stop_reason` values onto the canonical taxonomy.
pub(crate) fn convert_stop_reason(reason: &str) -> StopReason {
    match reason {
        "end_turn" | "stop_sequence" | "pause_turn" => StopReason::Stop,
        "max_tokens" | "model_context_window_exceeded" => StopReason::Length,
        "tool_use" => StopReason::ToolUse,
        _ => StopReason::Error,
    }
}

/// Per-call translator state.
#[derive(Debug, Default)]
pub(crate) struct AnthropicStream {
    blocks: HashMap<usize, usize>,
    stop_reason: Option<String>,
}

impl AnthropicStream {
    pub fn new() -> Self {
        Self::default()
    }

    fn block(&self, vendor_index: usize) -> Result<usize, LlmError> {
        self.blocks.get(&vendor_index).copied().ok_or_else(|| LlmError::Protocol {
            message: format!("delta for unknown content block {vendor_index}"),
            raw: String::new(),
        })
    }
}

fn apply_usage(builder: &mut MessageBuilder, usage: &StreamUsage) {
    builder.update_usage(|u| {
        if let Some(n) = usage.input_tokens {
            u.input = n;
        }
        if let Some(n) = usage.output_tokens {
            u.output = n;
        }
        if let Some(n) = usage.cache_read_input_tokens {
            u.cache_read = n;
        }
        if let Some(n) = usage.cache_creation_input_tokens {
            u.cache_write = n;
        }
    });
}

impl StreamTranslator for AnthropicStream {
    fn on_event(&mut self, event: &SseEvent, builder: &mut MessageBuilder) -> Result<(), LlmError> {
        let parsed: StreamEvent = serde_json::from_str(&event.data).map_err(|e| LlmError::Protocol {
            message: format!("invalid Anthropic stream event: {e}"),
            raw: event.data.clone(),
        })?;

        match parsed {
            StreamEvent::MessageStart { message } => {
                if let Some(id) = message.id {
                    builder.set_response_id(id);
                }
                if let Some(usage) = &message.usage {
                    apply_usage(builder, usage);
                }
            }
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                StreamBlock::Text { text } => {
                    let i = builder.begin_text();
                    self.blocks.insert(index, i);
                    if !text.is_empty() {
                        builder.text_delta(i, &text)?;
                    }
                }
                StreamBlock::Thinking {
                    thinking,
                    signature,
                } => {
                    let i = builder.begin_thinking();
                    self.blocks.insert(index, i);
                    if !thinking.is_empty() {
                        builder.thinking_delta(i, &thinking)?;
                    }
                    if let Some(signature) = signature.filter(|s| !s.is_empty()) {
                        builder.set_signature(i, signature);
                    }
                }
                StreamBlock::RedactedThinking { data } => builder.redacted_thinking(data),
                StreamBlock::ToolUse { id, name } => {
                    let i = builder.begin_tool_call(id, name);
                    self.blocks.insert(index, i);
                }
                StreamBlock::Unknown => {
                    debug!(index, "ignoring unsupported content block");
                }
            },
            StreamEvent::ContentBlockDelta { index, delta } => match delta {
                BlockDelta::TextDelta { text } => builder.text_delta(self.block(index)?, &text)?,
                BlockDelta::ThinkingDelta { thinking } => {
                    builder.thinking_delta(self.block(index)?, &thinking)?;
                }
                BlockDelta::SignatureDelta { signature } => {
                    builder.signature_delta(self.block(index)?, &signature);
                }
                BlockDelta::InputJsonDelta { partial_json } => {
                    builder.tool_call_delta(self.block(index)?, &partial_json)?;
                }
                BlockDelta::Unknown => {}
            },
            StreamEvent::ContentBlockStop { index } => {
                if let Some(i) = self.blocks.remove(&index) {
                    builder.end_block(i)?;
                }
            }
            StreamEvent::MessageDelta { delta, usage } => {
                if let Some(reason) = delta.stop_reason {
                    builder.set_stop_reason(convert_stop_reason(&reason));
                    self.stop_reason = Some(reason);
                }
                if let Some(usage) = &usage {
                    apply_usage(builder, usage);
                }
            }
            StreamEvent::MessageStop => {
                if builder.message().stop_reason == StopReason::Error {
                    let reason = self.stop_reason.take().unwrap_or_default();
                    return Err(LlmError::Vendor {
                        status: None,
                        code: Some(reason.clone()),
                        message: format!("model stopped with reason '{reason}'"),
                    });
                }
                builder.finish();
            }
            StreamEvent::Error { error } => {
                return Err(convert::vendor_error(None, error.error_type, error.message));
            }
            StreamEvent::Ping => {}
            StreamEvent::Unknown => {
                debug!(event = ?event.event, "ignoring unknown stream event");
            }
        }
        Ok(())
    }

    fn on_end(&mut self, _builder: &mut MessageBuilder) -> Result<(), LlmError> {
        Err(LlmError::Protocol {
            message: "stream ended before message_stop".into(),
            raw: String::new(),
        })
    }

    fn vendor_error(status: StatusCode, body: &str) -> LlmError {
        convert::convert_error(status, body)
    }
}
