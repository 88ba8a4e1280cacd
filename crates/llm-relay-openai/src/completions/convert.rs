//! Conversion from `llm-relay-core` types to chat-completions messages.

use llm_relay_core::attachments::sanitize_attachments;
use llm_relay_core::chat::{
    AssistantMessage, ContentBlock as CoreContent, Context, Message as CoreMessage,
};
use llm_relay_core::model::ThinkingFormat;
use llm_relay_core::transform::transform_messages;
use llm_relay_core::{LlmError, Model, OpenAiCompat, StreamOptions};
use serde_json::Value;
use tracing::warn;

use super::types::{
    ContentPart, FunctionCallRequest, FunctionDef, ImageUrl, Message, MessageContent, Request,
    StreamOptions as WireStreamOptions, Tool, ToolCallRequest,
};
use crate::config::OpenAiConfig;

/// Build the request body for one streaming call, including the
/// server-specific output-limit field.
pub(crate) fn build_payload(
    model: &Model,
    context: &Context,
    options: &StreamOptions,
    config: &OpenAiConfig,
) -> Result<Value, LlmError> {
    let compat = model.compat.clone().unwrap_or_default();
    let transformed = transform_messages(&context.messages, model);
    let sanitized = sanitize_attachments(&transformed, &config.image_limits);
    if let Some(note) = &sanitized.note {
        warn!(model = %model.id, "{note}");
    }

    let mut messages = Vec::with_capacity(sanitized.messages.len() + 1);
    if let Some(prompt) = context.system_prompt.as_deref().filter(|s| !s.is_empty()) {
        let role = if compat.supports_developer_role && model.reasoning {
            "developer"
        } else {
            "system"
        };
        messages.push(Message {
            role,
            content: Some(MessageContent::Text(prompt.to_owned())),
            tool_calls: Vec::new(),
            tool_call_id: None,
        });
    }
    for message in &sanitized.messages {
        match message {
            CoreMessage::User(user) => {
                if let Some(content) = convert_user_content(&user.content) {
                    messages.push(Message {
                        role: "user",
                        content: Some(content),
                        tool_calls: Vec::new(),
                        tool_call_id: None,
                    });
                }
            }
            CoreMessage::Assistant(assistant) => {
                if let Some(message) = convert_assistant(assistant) {
                    messages.push(message);
                }
            }
            CoreMessage::ToolResult(result) => {
                let text: Vec<&str> = result.content.iter().filter_map(CoreContent::as_text).collect();
                messages.push(Message {
                    role: "tool",
                    content: Some(MessageContent::Text(text.join("\n"))),
                    tool_calls: Vec::new(),
                    tool_call_id: Some(result.tool_call_id.clone()),
                });
                let images: Vec<&CoreContent> = result
                    .content
                    .iter()
                    .filter(|b| matches!(b, CoreContent::Image(_)))
                    .collect();
                if !images.is_empty() {
                    let mut parts = vec![ContentPart::Text {
                        text: format!("Attached image(s) from tool result {}:", result.tool_name),
                    }];
                    parts.extend(images.into_iter().filter_map(convert_part));
                    messages.push(Message {
                        role: "user",
                        content: Some(MessageContent::Parts(parts)),
                        tool_calls: Vec::new(),
                        tool_call_id: None,
                    });
                }
            }
        }
    }

    let tools = context
        .tools
        .iter()
        .map(|t| Tool {
            tool_type: "function",
            function: FunctionDef {
                name: &t.name,
                description: &t.description,
                parameters: &t.parameters,
            },
        })
        .collect();

    let reasoning_effort = (options.thinking()
        && model.reasoning
        && compat.thinking_format == ThinkingFormat::ReasoningEffort)
        .then(|| config.effort(options.thinking_budget_tokens));

    let request = Request {
        model: &model.id,
        messages,
        stream: true,
        stream_options: compat
            .supports_usage_in_streaming
            .then_some(WireStreamOptions {
                include_usage: true,
            }),
        temperature: options.temperature,
        tools,
        reasoning_effort,
    };
    let mut payload = serde_json::to_value(&request)?;
    if let Some(max_tokens) = options.max_tokens {
        insert_max_tokens(&mut payload, &compat, max_tokens);
    }
    Ok(payload)
}

fn insert_max_tokens(payload: &mut Value, compat: &OpenAiCompat, max_tokens: u32) {
    if let Value::Object(map) = payload {
        map.insert(compat.max_tokens_field.clone(), Value::from(max_tokens));
    }
}

fn convert_part(block: &CoreContent) -> Option<ContentPart> {
    match block {
        CoreContent::Text(text) if text.text.trim().is_empty() => None,
        CoreContent::Text(text) => Some(ContentPart::Text {
            text: text.text.clone(),
        }),
        CoreContent::Image(image) => Some(ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: format!("data:{};base64,{}", image.mime_type, image.data),
            },
        }),
        // Chat completions has no portable document input.
        CoreContent::Document(doc) => Some(ContentPart::Text {
            text: format!(
                "(document omitted: {})",
                doc.title.as_deref().unwrap_or(&doc.mime_type)
            ),
        }),
        CoreContent::Thinking(_) | CoreContent::ToolCall(_) => None,
    }
}

/// Plain string content when the turn is text only, parts otherwise.
fn convert_user_content(blocks: &[CoreContent]) -> Option<MessageContent> {
    let parts: Vec<ContentPart> = blocks.iter().filter_map(convert_part).collect();
    if parts.is_empty() {
        return None;
    }
    if parts.iter().all(|p| matches!(p, ContentPart::Text { .. })) {
        let text: Vec<String> = parts
            .into_iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text),
                ContentPart::ImageUrl { .. } => None,
            })
            .collect();
        return Some(MessageContent::Text(text.join("\n")));
    }
    Some(MessageContent::Parts(parts))
}

/// Text blocks are joined; reasoning is not replayed.
fn convert_assistant(assistant: &AssistantMessage) -> Option<Message> {
    let text: Vec<&str> = assistant
        .content
        .iter()
        .filter_map(CoreContent::as_text)
        .filter(|t| !t.is_empty())
        .collect();
    let tool_calls: Vec<ToolCallRequest> = assistant
        .tool_calls()
        .into_iter()
        .map(|call| ToolCallRequest {
            id: call.id.clone(),
            call_type: "function",
            function: FunctionCallRequest {
                name: call.name.clone(),
                arguments: call.arguments.to_string(),
            },
        })
        .collect();
    if text.is_empty() && tool_calls.is_empty() {
        return None;
    }
    Some(Message {
        role: "assistant",
        content: (!text.is_empty()).then(|| MessageContent::Text(text.join(""))),
        tool_calls,
        tool_call_id: None,
    })
}

#[cfg(test)]
mod tests {
    use llm_relay_core::chat::{ThinkingContent, ToolCall};
    use llm_relay_core::{ApiKind, InputKind};
    use serde_json::json;

    use super::*;

    fn local_model(compat: Option<OpenAiCompat>) -> Model {
        Model {
            reasoning: true,
            input: vec![InputKind::Text, InputKind::Image],
            compat,
            ..Model::new("qwen3", ApiKind::OpenAiCompletions, "ollama", "http://localhost:11434/v1")
        }
    }

    fn ollama_compat() -> OpenAiCompat {
        OpenAiCompat {
            supports_usage_in_streaming: false,
            supports_developer_role: false,
            max_tokens_field: "max_tokens".into(),
            thinking_format: ThinkingFormat::None,
        }
    }

    #[test]
    fn test_default_compat_payload() {
        let options = StreamOptions {
            max_tokens: Some(256),
            thinking_enabled: Some(true),
            ..Default::default()
        };
        let context = Context {
            system_prompt: Some("sys".into()),
            ..Context::from_prompt("hi")
        };
        let json = build_payload(&local_model(None), &context, &options, &OpenAiConfig::default()).unwrap();
        assert_eq!(json["messages"][0]["role"], "developer");
        assert_eq!(json["messages"][1], json!({"role": "user", "content": "hi"}));
        assert_eq!(json["max_completion_tokens"], 256);
        assert!(json.get("max_tokens").is_none());
        assert_eq!(json["stream_options"]["include_usage"], true);
        assert_eq!(json["reasoning_effort"], "medium");
        // No cache directive on chat completions.
        assert!(!json.to_string().contains("cache"));
    }

    #[test]
    fn test_local_server_compat_payload() {
        let options = StreamOptions {
            max_tokens: Some(256),
            thinking_enabled: Some(true),
            ..Default::default()
        };
        let context = Context {
            system_prompt: Some("sys".into()),
            ..Context::from_prompt("hi")
        };
        let json = build_payload(
            &local_model(Some(ollama_compat())),
            &context,
            &options,
            &OpenAiConfig::default(),
        )
        .unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["max_tokens"], 256);
        assert!(json.get("max_completion_tokens").is_none());
        assert!(json.get("stream_options").is_none());
        assert!(json.get("reasoning_effort").is_none());
    }

    #[test]
    fn test_images_and_documents_as_parts() {
        let context = Context {
            system_prompt: None,
            messages: vec![CoreMessage::user_blocks(vec![
                CoreContent::text("what is this?"),
                CoreContent::image("AAAA", "image/png"),
                CoreContent::Document(llm_relay_core::DocumentContent {
                    data: "JVBERi0=".into(),
                    mime_type: "application/pdf".into(),
                    title: Some("report.pdf".into()),
                }),
            ])],
            tools: Vec::new(),
        };
        let json = build_payload(&local_model(None), &context, &StreamOptions::default(), &OpenAiConfig::default()).unwrap();
        let parts = json["messages"][0]["content"].as_array().unwrap();
        assert_eq!(parts[1]["image_url"]["url"], "data:image/png;base64,AAAA");
        assert_eq!(parts[2]["text"], "(document omitted: report.pdf)");
    }

    #[test]
    fn test_tool_round_trip_messages() {
        let model = local_model(None);
        let mut assistant = AssistantMessage::empty(model.api, model.provider.clone(), model.id.clone());
        assistant.content = vec![
            CoreContent::Thinking(ThinkingContent {
                thinking: "plan".into(),
                signature: None,
                redacted: false,
            }),
            CoreContent::ToolCall(ToolCall {
                id: "call_1".into(),
                name: "lookup".into(),
                arguments: json!({"q": 1}),
                thought_signature: None,
            }),
        ];
        let context = Context {
            system_prompt: None,
            messages: vec![
                CoreMessage::user("go"),
                assistant.into(),
                CoreMessage::tool_result("call_1", "lookup", "42"),
            ],
            tools: vec![llm_relay_core::Tool {
                name: "lookup".into(),
                description: "Look up".into(),
                parameters: json!({"type": "object"}),
            }],
        };
        let json = build_payload(&model, &context, &StreamOptions::default(), &OpenAiConfig::default()).unwrap();
        let messages = json["messages"].as_array().unwrap();
        assert_eq!(messages[1]["content"], Value::Null);
        assert_eq!(messages[1]["tool_calls"][0]["function"]["arguments"], "{\"q\":1}");
        assert_eq!(messages[2], json!({"role": "tool", "content": "42", "tool_call_id": "call_1"}));
        assert_eq!(json["tools"][0]["function"]["name"], "lookup");
    }
}
