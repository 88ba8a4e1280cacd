//! Conversion from `llm-relay-core` types to Responses API input items.

use llm_relay_core::attachments::sanitize_attachments;
use llm_relay_core::chat::{
    AssistantMessage, ContentBlock as CoreContent, Context, Message as CoreMessage,
    ToolResultMessage,
};
use llm_relay_core::{CacheRetention, LlmError, Model, StreamOptions};
use llm_relay_core::transform::transform_messages;
use serde_json::Value;
use tracing::{debug, warn};

use super::types::{
    FunctionCall, FunctionCallOutput, InputContent, InputMessage, OutputMessage, OutputText,
    Reasoning, Request, Tool,
};
use crate::config::OpenAiConfig;

/// Splits a canonical tool-call id into `(call_id, item_id)`.
pub(crate) fn split_tool_id(id: &str) -> (&str, Option<&str>) {
    match id.split_once('|') {
        Some((call_id, item_id)) if !item_id.is_empty() => (call_id, Some(item_id)),
        Some((call_id, _)) => (call_id, None),
        None => (id, None),
    }
}

fn data_url(mime_type: &str, data: &str) -> String {
    format!("data:{mime_type};base64,{data}")
}

/// Build the request body for one streaming call.
pub(crate) fn build_request<'a>(
    model: &'a Model,
    context: &'a Context,
    options: &StreamOptions,
    config: &'a OpenAiConfig,
    retention: CacheRetention,
) -> Result<Request<'a>, LlmError> {
    let transformed = transform_messages(&context.messages, model);
    let sanitized = sanitize_attachments(&transformed, &config.image_limits);
    if let Some(note) = &sanitized.note {
        warn!(model = %model.id, "{note}");
    }

    let mut input = Vec::with_capacity(sanitized.messages.len() + 1);
    if let Some(prompt) = context.system_prompt.as_deref().filter(|s| !s.is_empty()) {
        let role = if model.reasoning { "developer" } else { "system" };
        input.push(serde_json::to_value(InputMessage {
            item_type: "message",
            role,
            content: vec![InputContent::InputText {
                text: prompt.to_owned(),
            }],
        })?);
    }
    for message in &sanitized.messages {
        match message {
            CoreMessage::User(user) => {
                let content = convert_user_content(&user.content);
                if !content.is_empty() {
                    input.push(user_item(content)?);
                }
            }
            CoreMessage::Assistant(assistant) => convert_assistant(assistant, model, &mut input)?,
            CoreMessage::ToolResult(result) => convert_tool_result(result, &mut input)?,
        }
    }

    let tools = context
        .tools
        .iter()
        .map(|t| Tool {
            tool_type: "function",
            name: &t.name,
            description: &t.description,
            parameters: &t.parameters,
            strict: false,
        })
        .collect();

    let thinking = model.reasoning && options.thinking();
    let reasoning = thinking.then(|| Reasoning {
        effort: config.effort(options.thinking_budget_tokens),
        summary: &config.reasoning_summary,
    });
    let cache = retention.prompt_cache_fields(options.session_id.as_deref());

    Ok(Request {
        model: &model.id,
        input,
        stream: true,
        store: false,
        max_output_tokens: options.max_tokens,
        temperature: if model.reasoning { None } else { options.temperature },
        tools,
        reasoning,
        include: if thinking {
            vec!["reasoning.encrypted_content"]
        } else {
            Vec::new()
        },
        prompt_cache_key: cache.key,
        prompt_cache_retention: cache.retention,
    })
}

fn user_item(content: Vec<InputContent>) -> Result<Value, LlmError> {
    Ok(serde_json::to_value(InputMessage {
        item_type: "message",
        role: "user",
        content,
    })?)
}

fn convert_user_content(blocks: &[CoreContent]) -> Vec<InputContent> {
    blocks
        .iter()
        .filter_map(|block| match block {
            CoreContent::Text(text) if text.text.trim().is_empty() => None,
            CoreContent::Text(text) => Some(InputContent::InputText {
                text: text.text.clone(),
            }),
            CoreContent::Image(image) => Some(InputContent::InputImage {
                detail: "auto",
                image_url: data_url(&image.mime_type, &image.data),
            }),
            CoreContent::Document(doc) => Some(InputContent::InputFile {
                filename: doc.title.clone().unwrap_or_else(|| "document.pdf".into()),
                file_data: data_url(&doc.mime_type, &doc.data),
            }),
            CoreContent::Thinking(_) | CoreContent::ToolCall(_) => None,
        })
        .collect()
}

/// Replays an assistant turn as output items. Reasoning comes back from
/// the serialized item in the thinking signature; item ids are only sent
/// for turns produced by this same model.
fn convert_assistant(
    assistant: &AssistantMessage,
    model: &Model,
    input: &mut Vec<Value>,
) -> Result<(), LlmError> {
    let same_model = assistant.api == model.api
        && assistant.provider == model.provider
        && assistant.model == model.id;
    for block in &assistant.content {
        match block {
            CoreContent::Thinking(thinking) => {
                let Some(signature) = thinking.signature.as_deref() else {
                    continue;
                };
                match serde_json::from_str::<Value>(signature) {
                    Ok(item) if item.get("type").and_then(Value::as_str) == Some("reasoning") => {
                        input.push(item);
                    }
                    _ => debug!("dropping reasoning block with unusable signature"),
                }
            }
            CoreContent::Text(text) if text.text.is_empty() => {}
            CoreContent::Text(text) => {
                let id = text
                    .signature
                    .clone()
                    .filter(|id| same_model && id.starts_with("msg_"));
                input.push(serde_json::to_value(OutputMessage {
                    item_type: "message",
                    role: "assistant",
                    id,
                    status: "completed",
                    content: vec![OutputText {
                        part_type: "output_text",
                        text: text.text.clone(),
                        annotations: Vec::new(),
                    }],
                })?);
            }
            CoreContent::ToolCall(call) => {
                let (call_id, item_id) = split_tool_id(&call.id);
                input.push(serde_json::to_value(FunctionCall {
                    item_type: "function_call",
                    id: item_id.filter(|_| same_model).map(str::to_owned),
                    call_id: call_id.to_owned(),
                    name: call.name.clone(),
                    arguments: call.arguments.to_string(),
                })?);
            }
            CoreContent::Image(_) | CoreContent::Document(_) => {}
        }
    }
    Ok(())
}

/// A function output carries text only; images in a tool result follow
/// as a separate user message.
fn convert_tool_result(result: &ToolResultMessage, input: &mut Vec<Value>) -> Result<(), LlmError> {
    let text: Vec<&str> = result.content.iter().filter_map(CoreContent::as_text).collect();
    let images: Vec<InputContent> = result
        .content
        .iter()
        .filter(|b| matches!(b, CoreContent::Image(_)))
        .flat_map(|b| convert_user_content(std::slice::from_ref(b)))
        .collect();
    let output = if text.is_empty() && !images.is_empty() {
        "(see attached image)".to_owned()
    } else {
        text.join("\n")
    };
    let (call_id, _) = split_tool_id(&result.tool_call_id);
    input.push(serde_json::to_value(FunctionCallOutput {
        item_type: "function_call_output",
        call_id: call_id.to_owned(),
        output,
    })?);
    if !images.is_empty() {
        let mut content = vec![InputContent::InputText {
            text: format!("Attached image(s) from tool result {}:", result.tool_name),
        }];
        content.extend(images);
        input.push(user_item(content)?);
    }
    Ok(())
}
