//! Translation of chat-completions SSE chunks onto a [`MessageBuilder`].
//!
//! Chunks carry no block boundaries. A text or reasoning block stays open
//! while consecutive chunks add to it and closes when another kind of
//! content starts. Tool calls are keyed by their `index` and stay open
//! until the message finishes.

use std::collections::HashMap;

use http::StatusCode;
use llm_relay_core::driver::StreamTranslator;
use llm_relay_core::sse::SseEvent;
use llm_relay_core::{LlmError, MessageBuilder, StopReason};
use tracing::warn;

use super::types::{ResponseUsage, StreamChunk, StreamToolCall};
use crate::error::{ErrorResponse, convert_error};

/// Map `finish_reason` strings to [`StopReason`].
pub(crate) fn convert_stop_reason(reason: &str) -> StopReason {
    match reason {
        "stop" | "end" => StopReason::Stop,
        "length" => StopReason::Length,
        "tool_calls" | "function_call" => StopReason::ToolUse,
        "content_filter" => StopReason::Error,
        other => {
            warn!(finish_reason = other, "unexpected finish_reason");
            StopReason::Stop
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Current {
    Text(usize),
    Thinking(usize),
}

/// Per-call translator state.
#[derive(Debug, Default)]
pub(crate) struct CompletionsStream {
    current: Option<Current>,
    tools: HashMap<usize, usize>,
    finish_reason: Option<String>,
}

impl CompletionsStream {
    pub fn new() -> Self {
        Self::default()
    }

    fn close_current(&mut self, builder: &mut MessageBuilder) -> Result<(), LlmError> {
        match self.current.take() {
            Some(Current::Text(i) | Current::Thinking(i)) => builder.end_block(i),
            None => Ok(()),
        }
    }

    fn text(&mut self, builder: &mut MessageBuilder, delta: &str) -> Result<(), LlmError> {
        let index = match self.current {
            Some(Current::Text(i)) => i,
            _ => {
                self.close_current(builder)?;
                let i = builder.begin_text();
                self.current = Some(Current::Text(i));
                i
            }
        };
        builder.text_delta(index, delta)
    }

    fn thinking(&mut self, builder: &mut MessageBuilder, delta: &str) -> Result<(), LlmError> {
        let index = match self.current {
            Some(Current::Thinking(i)) => i,
            _ => {
                self.close_current(builder)?;
                let i = builder.begin_thinking();
                self.current = Some(Current::Thinking(i));
                i
            }
        };
        builder.thinking_delta(index, delta)
    }

    fn tool_call(&mut self, builder: &mut MessageBuilder, call: &StreamToolCall) -> Result<(), LlmError> {
        let name = call.function.as_ref().and_then(|f| f.name.as_deref());
        let index = match self.tools.get(&call.index) {
            Some(&i) => {
                if let Some(id) = call.id.as_deref().filter(|id| !id.is_empty()) {
                    builder.set_tool_call_id(i, id);
                }
                i
            }
            None => {
                self.close_current(builder)?;
                let id = call.id.clone().unwrap_or_else(|| format!("call_{}", call.index));
                let i = builder.begin_tool_call(id, name.unwrap_or_default());
                self.tools.insert(call.index, i);
                i
            }
        };
        if let Some(arguments) = call
            .function
            .as_ref()
            .and_then(|f| f.arguments.as_deref())
            .filter(|a| !a.is_empty())
        {
            builder.tool_call_delta(index, arguments)?;
        }
        Ok(())
    }

    /// Finishes normally, or fails when the server filtered the output.
    fn complete(&mut self, builder: &mut MessageBuilder) -> Result<(), LlmError> {
        if builder.message().stop_reason == StopReason::Error {
            let reason = self.finish_reason.take().unwrap_or_default();
            return Err(LlmError::Vendor {
                status: None,
                code: Some(reason.clone()),
                message: format!("model stopped with finish_reason '{reason}'"),
            });
        }
        builder.finish();
        Ok(())
    }
}

fn apply_usage(builder: &mut MessageBuilder, usage: &ResponseUsage) {
    let cached = usage
        .prompt_tokens_details
        .as_ref()
        .map_or(0, |d| d.cached_tokens);
    builder.update_usage(|u| {
        u.input = usage.prompt_tokens.saturating_sub(cached);
        u.output = usage.completion_tokens;
        u.cache_read = cached;
        u.cache_write = 0;
    });
}

impl StreamTranslator for CompletionsStream {
    fn on_event(&mut self, event: &SseEvent, builder: &mut MessageBuilder) -> Result<(), LlmError> {
        if event.is_done() {
            return self.complete(builder);
        }
        // Some servers report failures as a chunk with an `error` object.
        if let Ok(err) = serde_json::from_str::<ErrorResponse>(&event.data) {
            return Err(err.error.into_error());
        }
        let chunk: StreamChunk = serde_json::from_str(&event.data).map_err(|e| LlmError::Protocol {
            message: format!("invalid chat-completions chunk: {e}"),
            raw: event.data.clone(),
        })?;

        if builder.message().response_id.is_none() {
            if let Some(id) = &chunk.id {
                builder.set_response_id(id.clone());
            }
        }
        for choice in &chunk.choices {
            if let Some(reasoning) = choice.delta.reasoning_text() {
                self.thinking(builder, reasoning)?;
            }
            if let Some(content) = choice.delta.content.as_deref().filter(|c| !c.is_empty()) {
                self.text(builder, content)?;
            }
            for call in choice.delta.tool_calls.iter().flatten() {
                self.tool_call(builder, call)?;
            }
            if let Some(reason) = &choice.finish_reason {
                builder.set_stop_reason(convert_stop_reason(reason));
                self.finish_reason = Some(reason.clone());
            }
        }
        if let Some(usage) = &chunk.usage {
            apply_usage(builder, usage);
        }
        Ok(())
    }

    fn on_end(&mut self, builder: &mut MessageBuilder) -> Result<(), LlmError> {
        self.complete(builder)
    }

    fn vendor_error(status: StatusCode, body: &str) -> LlmError {
        convert_error(status, body)
    }
}

#[cfg(test)]
mod tests {
    use llm_relay_core::test_helpers::{assert_lawful, count_kind, sample_model, text_deltas};
    use llm_relay_core::{ApiKind, AssistantMessageEvent};
    use serde_json::{Value, json};

    use super::*;

    fn run(chunks: &[Value], done: bool) -> Vec<AssistantMessageEvent> {
        let model = sample_model(ApiKind::OpenAiCompletions, "http://unused");
        let mut builder = MessageBuilder::new(&model);
        builder.start();
        let mut translator = CompletionsStream::new();
        let mut events: Vec<SseEvent> = chunks
            .iter()
            .map(|c| SseEvent {
                event: None,
                data: c.to_string(),
                id: None,
            })
            .collect();
        if done {
            events.push(SseEvent {
                event: None,
                data: "[DONE]".into(),
                id: None,
            });
        }
        for event in &events {
            if let Err(e) = translator.on_event(event, &mut builder) {
                builder.fail(&e);
            }
            if builder.is_finished() {
                break;
            }
        }
        if !builder.is_finished() {
            if let Err(e) = translator.on_end(&mut builder) {
                builder.fail(&e);
            }
        }
        builder.drain()
    }

    fn delta(delta: Value) -> Value {
        json!({"id": "chatcmpl-1", "choices": [{"index": 0, "delta": delta, "finish_reason": null}]})
    }

    fn finish(reason: &str) -> Value {
        json!({"id": "chatcmpl-1", "choices": [{"index": 0, "delta": {}, "finish_reason": reason}]})
    }

    #[test]
    fn test_stop_reason_mapping() {
        assert_eq!(convert_stop_reason("stop"), StopReason::Stop);
        assert_eq!(convert_stop_reason("length"), StopReason::Length);
        assert_eq!(convert_stop_reason("tool_calls"), StopReason::ToolUse);
        assert_eq!(convert_stop_reason("content_filter"), StopReason::Error);
        assert_eq!(convert_stop_reason("weird"), StopReason::Stop);
    }

    #[test]
    fn test_reasoning_then_text_with_trailing_usage() {
        let events = run(
            &[
                delta(json!({"role": "assistant", "reasoning_content": "Let me count."})),
                delta(json!({"content": "1, 2"})),
                delta(json!({"content": ", 3"})),
                finish("stop"),
                json!({"id": "chatcmpl-1", "choices": [], "usage": {"prompt_tokens": 9, "completion_tokens": 7, "prompt_tokens_details": {"cached_tokens": 4}}}),
            ],
            true,
        );
        assert_lawful(&events);
        assert_eq!(count_kind(&events, "thinking_end"), 1);
        assert_eq!(text_deltas(&events), "1, 2, 3");
        let AssistantMessageEvent::Done { reason, message } = events.last().unwrap() else {
            panic!("expected done");
        };
        assert_eq!(*reason, StopReason::Stop);
        assert_eq!(message.response_id.as_deref(), Some("chatcmpl-1"));
        assert_eq!(message.usage.input, 5);
        assert_eq!(message.usage.cache_read, 4);
        assert_eq!(message.usage.output, 7);
        assert_eq!(message.usage.total_tokens, 16);
    }

    #[test]
    fn test_parallel_tool_calls() {
        let events = run(
            &[
                delta(json!({"tool_calls": [{"index": 0, "id": "call_a", "type": "function", "function": {"name": "a", "arguments": ""}}]})),
                delta(json!({"tool_calls": [{"index": 1, "id": "call_b", "type": "function", "function": {"name": "b", "arguments": "{\"y\":"}}]})),
                delta(json!({"tool_calls": [{"index": 0, "function": {"arguments": "{\"x\":1}"}}]})),
                delta(json!({"tool_calls": [{"index": 1, "function": {"arguments": "2}"}}]})),
                finish("tool_calls"),
            ],
            true,
        );
        assert_lawful(&events);
        let message = events.last().unwrap().partial();
        let calls = message.tool_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].arguments, json!({"x": 1}));
        assert_eq!(calls[1].arguments, json!({"y": 2}));
        assert_eq!(message.stop_reason, StopReason::ToolUse);
    }

    #[test]
    fn test_missing_done_still_finishes() {
        let events = run(&[delta(json!({"content": "hi"})), finish("stop")], false);
        assert_lawful(&events);
        assert_eq!(events.last().unwrap().kind(), "done");
    }

    #[test]
    fn test_content_filter_is_error() {
        let events = run(&[delta(json!({"content": "par"})), finish("content_filter")], true);
        assert_lawful(&events);
        assert_eq!(events.last().unwrap().kind(), "error");
    }

    #[test]
    fn test_error_chunk() {
        let events = run(&[json!({"error": {"message": "model not loaded", "code": 503}})], true);
        let AssistantMessageEvent::Error { error, .. } = events.last().unwrap() else {
            panic!("expected error");
        };
        assert!(error.error_message.as_deref().unwrap().contains("model not loaded"));
    }
}
