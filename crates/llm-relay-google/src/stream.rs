//! Translation of Gemini SSE chunks onto a [`MessageBuilder`].
//!
//! Gemini streams parts without block boundaries: consecutive text (or
//! thought) parts extend the open block, and a part of another kind
//! closes it. Function calls always arrive whole.

use http::StatusCode;
use llm_relay_core::driver::StreamTranslator;
use llm_relay_core::sse::SseEvent;
use llm_relay_core::{LlmError, MessageBuilder, StopReason};
use tracing::debug;

use crate::convert::convert_error;
use crate::types::{ErrorResponse, Part, StreamChunk, UsageMetadata};

/// Map `finishReason` values to [`StopReason`]. Safety and recitation
/// blocks, malformed calls, and unknown reasons are errors.
pub(crate) fn convert_stop_reason(reason: &str) -> StopReason {
    match reason {
        "STOP" => StopReason::Stop,
        "MAX_TOKENS" => StopReason::Length,
        _ => StopReason::Error,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Current {
    Text(usize),
    Thinking(usize),
}

/// Per-call translator state.
#[derive(Debug, Default)]
pub(crate) struct GoogleStream {
    current: Option<Current>,
    finish_reason: Option<String>,
    finish_message: Option<String>,
}

impl GoogleStream {
    pub fn new() -> Self {
        Self::default()
    }

    fn close_current(&mut self, builder: &mut MessageBuilder) -> Result<(), LlmError> {
        match self.current.take() {
            Some(Current::Text(i) | Current::Thinking(i)) => builder.end_block(i),
            None => Ok(()),
        }
    }

    fn on_part(&mut self, part: Part, builder: &mut MessageBuilder) -> Result<(), LlmError> {
        if let Some(call) = part.function_call {
            self.close_current(builder)?;
            let id = call
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
            let index = builder.begin_tool_call(id, call.name);
            if let Some(signature) = part.thought_signature {
                builder.set_signature(index, signature);
            }
            let arguments = if call.args.is_null() {
                "{}".to_owned()
            } else {
                call.args.to_string()
            };
            builder.tool_call_delta(index, &arguments)?;
            return builder.end_tool_call(index);
        }

        let Some(text) = part.text else {
            if part.inline_data.is_some() {
                debug!("ignoring inline data in model output");
            }
            // A bare signature part belongs to the block it follows.
            if let (Some(signature), Some(Current::Text(i) | Current::Thinking(i))) =
                (part.thought_signature, self.current)
            {
                builder.set_signature(i, signature);
            }
            return Ok(());
        };

        let index = if part.thought {
            match self.current {
                Some(Current::Thinking(i)) => i,
                _ => {
                    self.close_current(builder)?;
                    let i = builder.begin_thinking();
                    self.current = Some(Current::Thinking(i));
                    i
                }
            }
        } else {
            match self.current {
                Some(Current::Text(i)) => i,
                _ => {
                    self.close_current(builder)?;
                    let i = builder.begin_text();
                    self.current = Some(Current::Text(i));
                    i
                }
            }
        };
        if !text.is_empty() {
            if part.thought {
                builder.thinking_delta(index, &text)?;
            } else {
                builder.text_delta(index, &text)?;
            }
        }
        if let Some(signature) = part.thought_signature {
            builder.set_signature(index, signature);
        }
        Ok(())
    }

    /// Finishes normally, or fails when the model was stopped for a
    /// reason other than a natural end or the token limit.
    fn complete(&mut self, builder: &mut MessageBuilder) -> Result<(), LlmError> {
        if builder.message().stop_reason == StopReason::Error {
            let reason = self.finish_reason.take().unwrap_or_default();
            let message = self
                .finish_message
                .take()
                .unwrap_or_else(|| format!("model stopped with finishReason {reason}"));
            return Err(LlmError::Vendor {
                status: None,
                code: Some(reason),
                message,
            });
        }
        builder.finish();
        Ok(())
    }
}

fn apply_usage(builder: &mut MessageBuilder, usage: &UsageMetadata) {
    let cached = usage.cached_content_token_count;
    builder.update_usage(|u| {
        u.input = usage.prompt_token_count.saturating_sub(cached);
        u.output = usage.candidates_token_count + usage.thoughts_token_count;
        u.cache_read = cached;
        u.cache_write = 0;
    });
}

impl StreamTranslator for GoogleStream {
    fn on_event(&mut self, event: &SseEvent, builder: &mut MessageBuilder) -> Result<(), LlmError> {
        if let Ok(err) = serde_json::from_str::<ErrorResponse>(&event.data) {
            return Err(err.error.into_error(None));
        }
        let chunk: StreamChunk = serde_json::from_str(&event.data).map_err(|e| LlmError::Protocol {
            message: format!("invalid Gemini stream chunk: {e}"),
            raw: event.data.clone(),
        })?;

        if let Some(id) = chunk.response_id {
            if builder.message().response_id.is_none() {
                builder.set_response_id(id);
            }
        }
        if let Some(reason) = chunk.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(LlmError::Vendor {
                status: None,
                code: Some(reason.clone()),
                message: format!("prompt was blocked: {reason}"),
            });
        }
        if let Some(usage) = &chunk.usage_metadata {
            apply_usage(builder, usage);
        }
        // Only the first candidate is requested.
        if let Some(candidate) = chunk.candidates.into_iter().next() {
            for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
                self.on_part(part, builder)?;
            }
            if let Some(reason) = candidate.finish_reason {
                builder.set_stop_reason(convert_stop_reason(&reason));
                self.finish_reason = Some(reason);
                self.finish_message = candidate.finish_message;
            }
        }
        Ok(())
    }

    /// Gemini has no end-of-stream marker; the body simply ends.
    fn on_end(&mut self, builder: &mut MessageBuilder) -> Result<(), LlmError> {
        if self.finish_reason.is_none() {
            return Err(LlmError::Protocol {
                message: "stream ended without a finishReason".into(),
                raw: String::new(),
            });
        }
        self.complete(builder)
    }

    fn vendor_error(status: StatusCode, body: &str) -> LlmError {
        convert_error(status, body)
    }
}

#[cfg(test)]
mod tests {
    use llm_relay_core::test_helpers::{assert_lawful, count_kind, sample_model, text_deltas};
    use llm_relay_core::{ApiKind, AssistantMessageEvent, ContentBlock};
    use serde_json::{Value, json};

    use super::*;

    fn run(chunks: &[Value]) -> Vec<AssistantMessageEvent> {
        let model = sample_model(ApiKind::GoogleGenerativeAi, "http://unused");
        let mut builder = MessageBuilder::new(&model);
        builder.start();
        let mut translator = GoogleStream::new();
        for chunk in chunks {
            let event = SseEvent {
                event: None,
                data: chunk.to_string(),
                id: None,
            };
            if let Err(e) = translator.on_event(&event, &mut builder) {
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

    fn parts(parts: Value) -> Value {
        json!({"candidates": [{"content": {"role": "model", "parts": parts}}]})
    }

    #[test]
    fn test_stop_reason_mapping() {
        assert_eq!(convert_stop_reason("STOP"), StopReason::Stop);
        assert_eq!(convert_stop_reason("MAX_TOKENS"), StopReason::Length);
        assert_eq!(convert_stop_reason("SAFETY"), StopReason::Error);
        assert_eq!(convert_stop_reason("MALFORMED_FUNCTION_CALL"), StopReason::Error);
    }

    #[test]
    fn test_thought_then_text() {
        let events = run(&[
            parts(json!([{"text": "Counting up.", "thought": true}])),
            parts(json!([{"text": "1, 2"}])),
            json!({
                "candidates": [{"content": {"role": "model", "parts": [{"text": ", 3", "thoughtSignature": "c2ln"}]}, "finishReason": "STOP"}],
                "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 4, "thoughtsTokenCount": 2, "cachedContentTokenCount": 3},
                "responseId": "resp-g"
            }),
        ]);
        assert_lawful(&events);
        assert_eq!(count_kind(&events, "thinking_end"), 1);
        assert_eq!(text_deltas(&events), "1, 2, 3");
        let AssistantMessageEvent::Done { reason, message } = events.last().unwrap() else {
            panic!("expected done");
        };
        assert_eq!(*reason, StopReason::Stop);
        assert_eq!(message.response_id.as_deref(), Some("resp-g"));
        let ContentBlock::Text(text) = &message.content[1] else {
            panic!("expected text");
        };
        assert_eq!(text.signature.as_deref(), Some("c2ln"));
        assert_eq!(message.usage.input, 7);
        assert_eq!(message.usage.output, 6);
        assert_eq!(message.usage.cache_read, 3);
        assert_eq!(message.usage.total_tokens, 16);
    }

    #[test]
    fn test_function_call_is_tool_use_with_signature() {
        let events = run(&[json!({
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "Looking."},
                    {"functionCall": {"name": "lookup", "args": {"q": "x"}}, "thoughtSignature": "c2lnbmF0dXJl"}
                ]},
                "finishReason": "STOP"
            }]
        })]);
        assert_lawful(&events);
        let message = events.last().unwrap().partial();
        assert_eq!(message.stop_reason, StopReason::ToolUse);
        let calls = message.tool_calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].id.starts_with("call_"));
        assert_eq!(calls[0].arguments, json!({"q": "x"}));
        assert_eq!(calls[0].thought_signature.as_deref(), Some("c2lnbmF0dXJl"));
    }

    #[test]
    fn test_vendor_call_id_is_kept() {
        let events = run(&[json!({
            "candidates": [{
                "content": {"parts": [{"functionCall": {"id": "fc-1", "name": "f", "args": {}}}]},
                "finishReason": "STOP"
            }]
        })]);
        assert_eq!(events.last().unwrap().partial().tool_calls()[0].id, "fc-1");
    }

    #[test]
    fn test_max_tokens_is_length() {
        let events = run(&[json!({
            "candidates": [{"content": {"parts": [{"text": "1, 2"}]}, "finishReason": "MAX_TOKENS"}]
        })]);
        assert_lawful(&events);
        assert_eq!(events.last().unwrap().partial().stop_reason, StopReason::Length);
    }

    #[test]
    fn test_safety_stop_is_error() {
        let events = run(&[json!({
            "candidates": [{"content": {"parts": [{"text": "par"}]}, "finishReason": "SAFETY"}]
        })]);
        assert_lawful(&events);
        let AssistantMessageEvent::Error { error, .. } = events.last().unwrap() else {
            panic!("expected error");
        };
        assert!(error.error_message.as_deref().unwrap().contains("SAFETY"));
    }

    #[test]
    fn test_blocked_prompt_is_error() {
        let events = run(&[json!({"promptFeedback": {"blockReason": "PROHIBITED_CONTENT"}})]);
        assert_eq!(events.last().unwrap().kind(), "error");
    }

    #[test]
    fn test_truncated_stream_is_error() {
        let events = run(&[parts(json!([{"text": "1, "}]))]);
        assert_lawful(&events);
        assert_eq!(events.last().unwrap().kind(), "error");
    }

    #[test]
    fn test_in_stream_error_chunk() {
        let events = run(&[json!({"error": {"code": 503, "message": "The model is overloaded.", "status": "UNAVAILABLE"}})]);
        let message = events.last().unwrap().partial();
        assert_eq!(message.stop_reason, StopReason::Error);
        assert!(message.error_message.as_deref().unwrap().contains("overloaded"));
    }
}
