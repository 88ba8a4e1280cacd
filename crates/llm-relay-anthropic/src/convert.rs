//! Conversion from `llm-relay-core` types to Anthropic request types, and
//! from Anthropic error bodies to [`LlmError`].

use http::StatusCode;
use llm_relay_core::attachments::sanitize_attachments;
use llm_relay_core::chat::{ContentBlock as CoreContent, Context, Message as CoreMessage};
use llm_relay_core::driver::status_error;
use llm_relay_core::transform::transform_messages;
use llm_relay_core::{CacheRetention, LlmError, Model, StreamOptions};
use tracing::warn;

use crate::config::AnthropicConfig;
use crate::types::{
    Base64Source, ContentBlock, ErrorResponse, Message, Request, SystemBlock, ThinkingConfig, Tool,
};

const MAX_TOOL_ID_LEN: usize = 64;

/// Output tokens kept free for the answer when a thinking budget is set.
const MIN_ANSWER_TOKENS: u32 = 1024;

// ── Request conversion ───────────────────────────────────────────────

/// Rewrites a tool-call id to `[A-Za-z0-9_-]{1,64}`. Applied to both the
/// call and its result so they keep matching.
pub(crate) fn normalize_tool_id(id: &str) -> String {
    let normalized: String = id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_TOOL_ID_LEN)
        .collect();
    if normalized.is_empty() {
        "tool".into()
    } else {
        normalized
    }
}

/// Build the request body for one streaming call.
pub(crate) fn build_request<'a>(
    model: &'a Model,
    context: &'a Context,
    options: &StreamOptions,
    config: &AnthropicConfig,
    retention: CacheRetention,
) -> Request<'a> {
    let transformed = transform_messages(&context.messages, model);
    let sanitized = sanitize_attachments(&transformed, &config.image_limits);
    if let Some(note) = &sanitized.note {
        warn!(model = %model.id, "{note}");
    }

    let marker = retention.cache_control();
    let mut messages = convert_messages(&sanitized.messages);
    if let Some(marker) = &marker {
        mark_latest_user_turn(&mut messages, marker.clone());
    }

    let system = context
        .system_prompt
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(|prompt| SystemBlock {
            block_type: "text",
            text: prompt.to_owned(),
            cache_control: marker,
        })
        .into_iter()
        .collect();

    let tools = context
        .tools
        .iter()
        .map(|t| Tool {
            name: &t.name,
            description: &t.description,
            input_schema: &t.parameters,
        })
        .collect();

    let mut max_tokens = options
        .max_tokens
        .unwrap_or_else(|| config.default_max_tokens.min(model.max_tokens));
    let thinking = (options.thinking() && model.reasoning).then(|| {
        let budget = options
            .thinking_budget_tokens
            .unwrap_or(config.default_thinking_budget);
        max_tokens = max_tokens.max(budget.saturating_add(MIN_ANSWER_TOKENS));
        ThinkingConfig {
            thinking_type: "enabled",
            budget_tokens: budget,
        }
    });

    Request {
        model: &model.id,
        messages,
        max_tokens,
        // Extended thinking only accepts the default temperature.
        temperature: if thinking.is_some() {
            None
        } else {
            options.temperature
        },
        system,
        stream: true,
        tools,
        thinking,
    }
}

/// Puts the cache breakpoint on the last cacheable block of the latest
/// user-authored turn.
fn mark_latest_user_turn(messages: &mut [Message], marker: llm_relay_core::cache::CacheControl) {
    let Some(latest) = messages.iter_mut().rev().find(|m| m.role == "user") else {
        return;
    };
    if let Some(block) = latest.content.last_mut() {
        block.set_cache_control(marker);
    }
}

/// Convert core messages to Anthropic messages.
///
/// Consecutive tool results are merged into one user turn, which the API
/// requires after an assistant turn with several tool calls. Messages
/// with nothing sendable are skipped.
fn convert_messages(messages: &[CoreMessage]) -> Vec<Message> {
    let mut out: Vec<Message> = Vec::with_capacity(messages.len());
    for message in messages {
        match message {
            CoreMessage::User(user) => {
                let content: Vec<ContentBlock> =
                    user.content.iter().filter_map(convert_user_block).collect();
                if !content.is_empty() {
                    out.push(Message {
                        role: "user",
                        content,
                    });
                }
            }
            CoreMessage::Assistant(assistant) => {
                let content: Vec<ContentBlock> = assistant
                    .content
                    .iter()
                    .filter_map(convert_assistant_block)
                    .collect();
                if !content.is_empty() {
                    out.push(Message {
                        role: "assistant",
                        content,
                    });
                }
            }
            CoreMessage::ToolResult(result) => {
                let block = ContentBlock::ToolResult {
                    tool_use_id: normalize_tool_id(&result.tool_call_id),
                    content: result.content.iter().filter_map(convert_user_block).collect(),
                    is_error: result.is_error,
                    cache_control: None,
                };
                match out.last_mut() {
                    Some(last)
                        if last.role == "user"
                            && last.content.iter().all(ContentBlock::is_tool_result) =>
                    {
                        last.content.push(block);
                    }
                    _ => out.push(Message {
                        role: "user",
                        content: vec![block],
                    }),
                }
            }
        }
    }
    out
}

fn convert_user_block(block: &CoreContent) -> Option<ContentBlock> {
    match block {
        CoreContent::Text(text) if text.text.trim().is_empty() => None,
        CoreContent::Text(text) => Some(ContentBlock::text(text.text.clone())),
        CoreContent::Image(image) => Some(ContentBlock::Image {
            source: Base64Source {
                source_type: "base64",
                media_type: image.mime_type.clone(),
                data: image.data.clone(),
            },
            cache_control: None,
        }),
        CoreContent::Document(doc) => Some(ContentBlock::Document {
            source: Base64Source {
                source_type: "base64",
                media_type: doc.mime_type.clone(),
                data: doc.data.clone(),
            },
            title: doc.title.clone(),
            cache_control: None,
        }),
        // Assistant-only blocks never appear in user turns.
        CoreContent::Thinking(_) | CoreContent::ToolCall(_) => None,
    }
}

fn convert_assistant_block(block: &CoreContent) -> Option<ContentBlock> {
    match block {
        CoreContent::Text(text) if text.text.trim().is_empty() => None,
        CoreContent::Text(text) => Some(ContentBlock::text(text.text.clone())),
        CoreContent::Thinking(thinking) if thinking.redacted => {
            thinking.signature.clone().map(|data| ContentBlock::RedactedThinking { data })
        }
        CoreContent::Thinking(thinking) if thinking.thinking.trim().is_empty() => None,
        CoreContent::Thinking(thinking) => match thinking.signature.as_deref() {
            Some(signature) if !signature.is_empty() => Some(ContentBlock::Thinking {
                thinking: thinking.thinking.clone(),
                signature: signature.to_owned(),
            }),
            // An unsigned trace (e.g. an interrupted stream) is rejected as
            // thinking, so it goes back as text.
            _ => Some(ContentBlock::text(thinking.thinking.clone())),
        },
        CoreContent::ToolCall(call) => Some(ContentBlock::ToolUse {
            id: normalize_tool_id(&call.id),
            name: call.name.clone(),
            input: call.arguments.clone(),
        }),
        CoreContent::Image(_) | CoreContent::Document(_) => None,
    }
}

// ── Error conversion ─────────────────────────────────────────────────

/// Convert an Anthropic error body into an [`LlmError`].
pub(crate) fn convert_error(status: StatusCode, body: &str) -> LlmError {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(resp) => vendor_error(Some(status), resp.error.error_type, resp.error.message),
        Err(_) => {
            let message = if body.trim().is_empty() {
                status.to_string()
            } else {
                body.to_owned()
            };
            status_error(status, None, message)
        }
    }
}

/// Classifies an error by Anthropic's `error.type`.
pub(crate) fn vendor_error(
    status: Option<StatusCode>,
    error_type: Option<String>,
    message: String,
) -> LlmError {
    match error_type.as_deref() {
        Some("authentication_error" | "permission_error") => LlmError::Auth(message),
        Some("invalid_request_error") => LlmError::InvalidRequest(message),
        _ => match status {
            Some(status) => status_error(status, error_type, message),
            None => LlmError::Vendor {
                status: None,
                code: error_type,
                message,
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use llm_relay_core::chat::{AssistantMessage, ThinkingContent, ToolCall};
    use llm_relay_core::{ApiKind, StopReason, Tool as CoreTool};
    use serde_json::{Value, json};

    use super::*;

    fn model() -> Model {
        Model {
            reasoning: true,
            ..Model::new(
                "claude-test",
                ApiKind::AnthropicMessages,
                "anthropic",
                "http://localhost",
            )
        }
    }

    fn build(context: &Context, options: &StreamOptions, retention: CacheRetention) -> Value {
        let model = model();
        let req = build_request(&model, context, options, &AnthropicConfig::default(), retention);
        serde_json::to_value(&req).unwrap()
    }

    fn assistant_with_call(id: &str) -> CoreMessage {
        let mut msg = AssistantMessage::empty(ApiKind::AnthropicMessages, "anthropic", "claude-test");
        msg.stop_reason = StopReason::ToolUse;
        msg.content.push(CoreContent::ToolCall(ToolCall {
            id: id.into(),
            name: "lookup".into(),
            arguments: json!({"q": 1}),
            thought_signature: None,
        }));
        msg.into()
    }

    #[test]
    fn test_normalize_tool_id() {
        assert_eq!(normalize_tool_id("call_1|fc_abc"), "call_1_fc_abc");
        assert_eq!(normalize_tool_id("toolu_01-ok"), "toolu_01-ok");
        assert_eq!(normalize_tool_id(&"x".repeat(100)).len(), 64);
        assert_eq!(normalize_tool_id(""), "tool");
    }

    #[test]
    fn test_short_retention_marks_system_and_latest_user() {
        let context = Context {
            system_prompt: Some("be brief".into()),
            messages: vec![CoreMessage::user("first"), CoreMessage::user("second")],
            tools: Vec::new(),
        };
        let json = build(&context, &StreamOptions::default(), CacheRetention::Short);
        assert_eq!(json["system"][0]["cache_control"], json!({"type": "ephemeral"}));
        assert!(json["messages"][0]["content"][0].get("cache_control").is_none());
        assert_eq!(
            json["messages"][1]["content"][0]["cache_control"],
            json!({"type": "ephemeral"})
        );
    }

    #[test]
    fn test_long_retention_adds_ttl() {
        let context = Context {
            system_prompt: Some("sys".into()),
            ..Context::from_prompt("hi")
        };
        let json = build(&context, &StreamOptions::default(), CacheRetention::Long);
        assert_eq!(json["system"][0]["cache_control"]["ttl"], "1h");
        assert_eq!(json["messages"][0]["content"][0]["cache_control"]["ttl"], "1h");
    }

    #[test]
    fn test_none_retention_has_no_markers() {
        let context = Context {
            system_prompt: Some("sys".into()),
            ..Context::from_prompt("hi")
        };
        let json = build(&context, &StreamOptions::default(), CacheRetention::None);
        assert!(!json.to_string().contains("cache_control"));
    }

    #[test]
    fn test_tool_results_merge_and_ids_normalize() {
        let mut assistant = AssistantMessage::empty(ApiKind::AnthropicMessages, "anthropic", "claude-test");
        for id in ["call|1", "call|2"] {
            assistant.content.push(CoreContent::ToolCall(ToolCall {
                id: id.into(),
                name: "lookup".into(),
                arguments: json!({}),
                thought_signature: None,
            }));
        }
        let context = Context {
            system_prompt: None,
            messages: vec![
                CoreMessage::user("go"),
                assistant.into(),
                CoreMessage::tool_result("call|1", "lookup", "a"),
                CoreMessage::tool_result("call|2", "lookup", "b"),
            ],
            tools: Vec::new(),
        };
        let json = build(&context, &StreamOptions::default(), CacheRetention::None);
        let messages = json["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["content"][0]["id"], "call_1");
        let results = messages[2]["content"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["tool_use_id"], "call_1");
        assert_eq!(results[1]["tool_use_id"], "call_2");
    }

    #[test]
    fn test_cache_marker_lands_on_tool_result_turn() {
        let context = Context {
            system_prompt: None,
            messages: vec![
                CoreMessage::user("go"),
                assistant_with_call("c1"),
                CoreMessage::tool_result("c1", "lookup", "done"),
            ],
            tools: Vec::new(),
        };
        let json = build(&context, &StreamOptions::default(), CacheRetention::Short);
        assert!(json["messages"][0]["content"][0].get("cache_control").is_none());
        assert_eq!(json["messages"][2]["content"][0]["type"], "tool_result");
        assert_eq!(
            json["messages"][2]["content"][0]["cache_control"]["type"],
            "ephemeral"
        );
    }

    #[test]
    fn test_thinking_budget_raises_max_tokens() {
        let options = StreamOptions {
            thinking_enabled: Some(true),
            thinking_budget_tokens: Some(8000),
            max_tokens: Some(2000),
            temperature: Some(0.2),
            ..Default::default()
        };
        let json = build(&Context::from_prompt("think"), &options, CacheRetention::None);
        assert_eq!(json["thinking"], json!({"type": "enabled", "budget_tokens": 8000}));
        assert_eq!(json["max_tokens"], 9024);
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_no_thinking_when_disabled() {
        let options = StreamOptions {
            temperature: Some(0.2),
            ..Default::default()
        };
        let json = build(&Context::from_prompt("hi"), &options, CacheRetention::None);
        assert!(json.get("thinking").is_none());
        assert_eq!(json["max_tokens"], 4096);
        assert!((json["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_same_model_thinking_round_trip() {
        let mut assistant = AssistantMessage::empty(ApiKind::AnthropicMessages, "anthropic", "claude-test");
        assistant.content.push(CoreContent::Thinking(ThinkingContent {
            thinking: "hmm".into(),
            signature: Some("sig".into()),
            redacted: false,
        }));
        assistant.content.push(CoreContent::Thinking(ThinkingContent {
            thinking: "[Reasoning redacted]".into(),
            signature: Some("opaque".into()),
            redacted: true,
        }));
        assistant.content.push(CoreContent::Thinking(ThinkingContent {
            thinking: "unsigned".into(),
            signature: None,
            redacted: false,
        }));
        assistant.content.push(CoreContent::text("answer"));
        let context = Context {
            system_prompt: None,
            messages: vec![CoreMessage::user("q"), assistant.into(), CoreMessage::user("more")],
            tools: Vec::new(),
        };
        let json = build(&context, &StreamOptions::default(), CacheRetention::None);
        let blocks = json["messages"][1]["content"].as_array().unwrap();
        assert_eq!(blocks[0], json!({"type": "thinking", "thinking": "hmm", "signature": "sig"}));
        assert_eq!(blocks[1], json!({"type": "redacted_thinking", "data": "opaque"}));
        assert_eq!(blocks[2], json!({"type": "text", "text": "unsigned"}));
        assert_eq!(blocks[3]["text"], "answer");
    }

    #[test]
    fn test_tools_and_documents() {
        let context = Context {
            system_prompt: None,
            messages: vec![CoreMessage::user_blocks(vec![
                CoreContent::Document(llm_relay_core::DocumentContent {
                    data: "JVBERi0=".into(),
                    mime_type: "application/pdf".into(),
                    title: Some("spec.pdf".into()),
                }),
                CoreContent::text("summarize"),
            ])],
            tools: vec![CoreTool {
                name: "search".into(),
                description: "Search the web".into(),
                parameters: json!({"type": "object"}),
            }],
        };
        let json = build(&context, &StreamOptions::default(), CacheRetention::None);
        assert_eq!(json["tools"][0]["input_schema"], json!({"type": "object"}));
        let doc = &json["messages"][0]["content"][0];
        assert_eq!(doc["type"], "document");
        assert_eq!(doc["source"]["media_type"], "application/pdf");
        assert_eq!(doc["title"], "spec.pdf");
    }

    #[test]
    fn test_convert_error_classification() {
        let auth = convert_error(
            StatusCode::UNAUTHORIZED,
            r#"{"type":"error","error":{"type":"authentication_error","message":"invalid x-api-key"}}"#,
        );
        assert_eq!(auth, LlmError::Auth("invalid x-api-key".into()));

        let overloaded = convert_error(
            StatusCode::from_u16(529).unwrap(),
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        );
        assert!(matches!(
            overloaded,
            LlmError::Vendor { code: Some(ref c), .. } if c == "overloaded_error"
        ));

        let plain = convert_error(StatusCode::BAD_GATEWAY, "upstream down");
        assert!(matches!(plain, LlmError::Vendor { code: None, ref message, .. } if message == "upstream down"));
    }
}
