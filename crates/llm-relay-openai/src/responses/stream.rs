//! Translation of Responses API SSE events onto a [`MessageBuilder`].

use std::collections::{HashMap, HashSet};

use http::StatusCode;
use llm_relay_core::driver::StreamTranslator;
use llm_relay_core::sse::SseEvent;
use llm_relay_core::{LlmError, MessageBuilder, StopReason};
use tracing::debug;

use super::types::{OutputItem, ResponseInfo, StreamEvent};
use crate::error::convert_error;

/// Per-call translator state, keyed by the vendor's `output_index`.
#[derive(Debug, Default)]
pub(crate) struct ResponsesStream {
    items: HashMap<usize, usize>,
    /// Reasoning items whose next summary part starts after a blank line.
    part_ended: HashSet<usize>,
}

impl ResponsesStream {
    pub fn new() -> Self {
        Self::default()
    }

    fn item(&self, output_index: usize) -> Result<usize, LlmError> {
        self.items.get(&output_index).copied().ok_or_else(|| LlmError::Protocol {
            message: format!("event for unknown output item {output_index}"),
            raw: String::new(),
        })
    }

    fn on_item_added(&mut self, output_index: usize, item: OutputItem, builder: &mut MessageBuilder) {
        let index = match item {
            OutputItem::Reasoning { .. } => builder.begin_thinking(),
            OutputItem::Message { .. } => builder.begin_text(),
            OutputItem::FunctionCall {
                id, call_id, name, ..
            } => {
                let id = match id {
                    Some(item_id) => format!("{call_id}|{item_id}"),
                    None => call_id,
                };
                builder.begin_tool_call(id, name)
            }
            OutputItem::Unknown => {
                debug!(output_index, "ignoring unsupported output item");
                return;
            }
        };
        self.items.insert(output_index, index);
    }

    fn on_item_done(
        &mut self,
        output_index: usize,
        item: OutputItem,
        builder: &mut MessageBuilder,
    ) -> Result<(), LlmError> {
        self.part_ended.remove(&output_index);
        let Some(index) = self.items.remove(&output_index) else {
            return Ok(());
        };
        match &item {
            OutputItem::Reasoning { summary, .. } => {
                let streamed = builder
                    .message()
                    .content
                    .get(index)
                    .is_some_and(|b| matches!(b, llm_relay_core::ContentBlock::Thinking(t) if !t.thinking.is_empty()));
                if !streamed {
                    let text = summary.iter().map(|p| p.text.as_str()).collect::<Vec<_>>().join("\n\n");
                    if !text.is_empty() {
                        builder.thinking_delta(index, &text)?;
                    }
                }
                builder.set_signature(index, serde_json::to_string(&item)?);
                builder.end_thinking(index)
            }
            OutputItem::Message { id } => {
                builder.set_signature(index, id.clone());
                builder.end_text(index)
            }
            OutputItem::FunctionCall { arguments, .. } => {
                if !arguments.is_empty() {
                    builder.replace_tool_call_arguments(index, arguments)?;
                }
                builder.end_tool_call(index)
            }
            OutputItem::Unknown => Ok(()),
        }
    }
}

fn apply_response(builder: &mut MessageBuilder, response: &ResponseInfo) {
    if let Some(id) = &response.id {
        builder.set_response_id(id.clone());
    }
    if let Some(usage) = &response.usage {
        let cached = usage
            .input_tokens_details
            .as_ref()
            .map_or(0, |d| d.cached_tokens);
        builder.update_usage(|u| {
            u.input = usage.input_tokens.saturating_sub(cached);
            u.output = usage.output_tokens;
            u.cache_read = cached;
            u.cache_write = 0;
        });
    }
}

impl StreamTranslator for ResponsesStream {
    fn on_event(&mut self, event: &SseEvent, builder: &mut MessageBuilder) -> Result<(), LlmError> {
        let parsed: StreamEvent = serde_json::from_str(&event.data).map_err(|e| LlmError::Protocol {
            message: format!("invalid Responses stream event: {e}"),
            raw: event.data.clone(),
        })?;

        match parsed {
            StreamEvent::Created { response } => apply_response(builder, &response),
            StreamEvent::OutputItemAdded { output_index, item } => {
                self.on_item_added(output_index, item, builder);
            }
            StreamEvent::OutputItemDone { output_index, item } => {
                self.on_item_done(output_index, item, builder)?;
            }
            StreamEvent::ReasoningSummaryDelta {
                output_index,
                delta,
            } => {
                let index = self.item(output_index)?;
                if self.part_ended.remove(&output_index) {
                    builder.thinking_delta(index, &format!("\n\n{delta}"))?;
                } else {
                    builder.thinking_delta(index, &delta)?;
                }
            }
            StreamEvent::ReasoningSummaryPartDone { output_index } => {
                self.item(output_index)?;
                self.part_ended.insert(output_index);
            }
            StreamEvent::OutputTextDelta {
                output_index,
                delta,
            }
            | StreamEvent::RefusalDelta {
                output_index,
                delta,
            } => builder.text_delta(self.item(output_index)?, &delta)?,
            StreamEvent::FunctionCallArgumentsDelta {
                output_index,
                delta,
            } => builder.tool_call_delta(self.item(output_index)?, &delta)?,
            StreamEvent::FunctionCallArgumentsDone {
                output_index,
                arguments,
            } => builder.replace_tool_call_arguments(self.item(output_index)?, &arguments)?,
            StreamEvent::Completed { response } => {
                apply_response(builder, &response);
                builder.set_stop_reason(StopReason::Stop);
                builder.finish();
            }
            StreamEvent::Incomplete { response } => {
                apply_response(builder, &response);
                let reason = response
                    .incomplete_details
                    .as_ref()
                    .and_then(|d| d.reason.as_deref());
                if reason == Some("content_filter") {
                    return Err(LlmError::Vendor {
                        status: None,
                        code: Some("content_filter".into()),
                        message: "response was blocked by the content filter".into(),
                    });
                }
                builder.set_stop_reason(StopReason::Length);
                builder.finish();
            }
            StreamEvent::Failed { response } => {
                apply_response(builder, &response);
                return Err(response.error.map_or_else(
                    || LlmError::Vendor {
                        status: None,
                        code: None,
                        message: "response failed".into(),
                    },
                    crate::error::ErrorDetail::into_error,
                ));
            }
            StreamEvent::Error(detail) => return Err(detail.into_error()),
            StreamEvent::Unknown => {
                debug!(event = ?event.event, "ignoring unhandled stream event");
            }
        }
        Ok(())
    }

    fn on_end(&mut self, _builder: &mut MessageBuilder) -> Result<(), LlmError> {
        Err(LlmError::Protocol {
            message: "stream ended before response.completed".into(),
            raw: String::new(),
        })
    }

    fn vendor_error(status: StatusCode, body: &str) -> LlmError {
        convert_error(status, body)
    }
}
