//! Conversion from `llm-relay-core` types to Gemini request types.

use std::collections::HashSet;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use http::StatusCode;
use llm_relay_core::attachments::sanitize_attachments;
use llm_relay_core::chat::{
    AssistantMessage, ContentBlock as CoreContent, Context, Message as CoreMessage,
    ToolResultMessage,
};
use llm_relay_core::driver::status_error;
use llm_relay_core::transform::transform_messages;
use llm_relay_core::{LlmError, Model, StreamOptions, sanitize_schema};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::GoogleConfig;
use crate::types::{
    Content, ErrorDetail, ErrorResponse, FunctionCall, FunctionDeclaration, FunctionResponse,
    GenerationConfig, Part, Request, ThinkingConfig, ToolDeclaration,
};

/// Whether `signature` looks like a thought signature Gemini issued:
/// non-empty base64 in any common alphabet.
pub(crate) fn is_valid_signature(signature: Option<&str>) -> bool {
    let Some(sig) = signature.map(str::trim).filter(|s| !s.is_empty()) else {
        return false;
    };
    [&STANDARD, &STANDARD_NO_PAD, &URL_SAFE, &URL_SAFE_NO_PAD]
        .iter()
        .any(|engine| engine.decode(sig).is_ok())
}

/// Build the request body for one streaming call.
pub(crate) fn build_request<'a>(
    model: &Model,
    context: &'a Context,
    options: &StreamOptions,
    config: &GoogleConfig,
) -> Request<'a> {
    let transformed = transform_messages(&context.messages, model);
    let sanitized = sanitize_attachments(&transformed, &config.image_limits);
    if let Some(note) = &sanitized.note {
        warn!(model = %model.id, "{note}");
    }

    let contents = convert_messages(&sanitized.messages);

    let system_instruction = context
        .system_prompt
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|prompt| Content {
            role: None,
            parts: vec![Part::text(prompt)],
        });

    let tools = if context.tools.is_empty() {
        Vec::new()
    } else {
        vec![ToolDeclaration {
            function_declarations: context
                .tools
                .iter()
                .map(|t| FunctionDeclaration {
                    name: &t.name,
                    description: &t.description,
                    parameters: sanitize_schema(&t.parameters),
                })
                .collect(),
        }]
    };

    let thinking_config = (options.thinking() && model.reasoning).then(|| ThinkingConfig {
        include_thoughts: config.include_thoughts,
        thinking_budget: options
            .thinking_budget_tokens
            .or(config.default_thinking_budget),
    });
    let generation_config = GenerationConfig {
        max_output_tokens: options.max_tokens,
        temperature: options.temperature,
        thinking_config,
    };
    let has_config = generation_config.max_output_tokens.is_some()
        || generation_config.temperature.is_some()
        || generation_config.thinking_config.is_some();

    Request {
        contents,
        system_instruction,
        tools,
        generation_config: has_config.then_some(generation_config),
    }
}

/// Converts the history, dropping unsigned tool calls and the results
/// that answer them. Consecutive tool results share one `user` turn.
fn convert_messages(messages: &[CoreMessage]) -> Vec<Content> {
    let mut dropped: HashSet<&str> = HashSet::new();
    let mut contents: Vec<Content> = Vec::with_capacity(messages.len());
    let mut previous_was_result = false;

    for message in messages {
        let mut is_result = false;
        let content = match message {
            CoreMessage::User(user) => Content {
                role: Some("user".into()),
                parts: user.content.iter().filter_map(convert_user_part).collect(),
            },
            CoreMessage::Assistant(assistant) => Content {
                role: Some("model".into()),
                parts: convert_assistant(assistant, &mut dropped),
            },
            CoreMessage::ToolResult(result) => {
                if dropped.contains(result.tool_call_id.as_str()) {
                    debug!(tool_call_id = %result.tool_call_id, "dropping result of unsigned tool call");
                    continue;
                }
                is_result = true;
                Content {
                    role: Some("user".into()),
                    parts: convert_tool_result(result),
                }
            }
        };

        if content.parts.is_empty() {
            continue;
        }
        match contents.last_mut() {
            Some(last) if is_result && previous_was_result => last.parts.extend(content.parts),
            _ => contents.push(content),
        }
        previous_was_result = is_result;
    }
    contents
}

fn convert_user_part(block: &CoreContent) -> Option<Part> {
    match block {
        CoreContent::Text(text) if text.text.trim().is_empty() => None,
        CoreContent::Text(text) => Some(Part::text(text.text.clone())),
        CoreContent::Image(image) => Some(Part::inline(&image.mime_type, &image.data)),
        CoreContent::Document(doc) => Some(Part::inline(&doc.mime_type, &doc.data)),
        CoreContent::Thinking(_) | CoreContent::ToolCall(_) => None,
    }
}

fn convert_assistant<'m>(assistant: &'m AssistantMessage, dropped: &mut HashSet<&'m str>) -> Vec<Part> {
    let mut parts = Vec::with_capacity(assistant.content.len());
    for block in &assistant.content {
        match block {
            CoreContent::Text(text) if text.text.is_empty() => {}
            CoreContent::Text(text) => parts.push(Part {
                text: Some(text.text.clone()),
                thought_signature: text
                    .signature
                    .clone()
                    .filter(|s| is_valid_signature(Some(s))),
                ..Default::default()
            }),
            CoreContent::Thinking(thinking) if thinking.redacted => {}
            CoreContent::Thinking(thinking) => {
                let signed = is_valid_signature(thinking.signature.as_deref());
                if thinking.thinking.is_empty() && !signed {
                    continue;
                }
                parts.push(Part {
                    text: Some(thinking.thinking.clone()),
                    thought: signed,
                    thought_signature: thinking.signature.clone().filter(|_| signed),
                    ..Default::default()
                });
            }
            CoreContent::ToolCall(call) => {
                if !is_valid_signature(call.thought_signature.as_deref()) {
                    debug!(tool_call_id = %call.id, tool = %call.name, "dropping unsigned tool call");
                    dropped.insert(&call.id);
                    continue;
                }
                parts.push(Part {
                    function_call: Some(FunctionCall {
                        id: None,
                        name: call.name.clone(),
                        args: call.arguments.clone(),
                    }),
                    thought_signature: call.thought_signature.clone(),
                    ..Default::default()
                });
            }
            CoreContent::Image(_) | CoreContent::Document(_) => {}
        }
    }
    parts
}

/// A `functionResponse` part, followed by any images the tool returned.
fn convert_tool_result(result: &ToolResultMessage) -> Vec<Part> {
    let text: Vec<&str> = result.content.iter().filter_map(CoreContent::as_text).collect();
    let text = text.join("\n");
    let response = if result.is_error {
        json!({"error": text})
    } else {
        json!({"output": text})
    };
    let mut parts = vec![Part {
        function_response: Some(FunctionResponse {
            id: None,
            name: result.tool_name.clone(),
            response,
        }),
        ..Default::default()
    }];
    parts.extend(result.content.iter().filter_map(|block| match block {
        CoreContent::Image(image) => Some(Part::inline(&image.mime_type, &image.data)),
        _ => None,
    }));
    parts
}

impl ErrorDetail {
    pub fn into_error(self, status: Option<StatusCode>) -> LlmError {
        match status {
            Some(status) => status_error(status, self.status, self.message),
            None => LlmError::Vendor {
                status: self.code.and_then(|c| StatusCode::from_u16(c).ok()),
                code: self.status,
                message: self.message,
            },
        }
    }
}

/// Decode an error body. Errors arrive either as an object or, on some
/// endpoints, a one-element array of objects. A struct also deserializes
/// from a sequence, so the array is unwrapped before decoding.
fn parse_error_body(body: &str) -> Option<ErrorResponse> {
    let value = match serde_json::from_str::<Value>(body).ok()? {
        Value::Array(items) => items.into_iter().next()?,
        other => other,
    };
    serde_json::from_value(value).ok()
}

/// Convert an HTTP status + optional error body into an [`LlmError`].
pub(crate) fn convert_error(status: StatusCode, body: &str) -> LlmError {
    match parse_error_body(body) {
        Some(resp) => resp.error.into_error(Some(status)),
        None => {
            let message = if body.trim().is_empty() {
                status.to_string()
            } else {
                body.to_owned()
            };
            status_error(status, None, message)
        }
    }
}
