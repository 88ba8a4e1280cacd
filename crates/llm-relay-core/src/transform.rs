//! History normalization applied by every adapter before payload building.
//!
//! A history may mix turns from several vendors, contain failed turns, or
//! carry images the target model cannot read. [`transform_messages`]
//! returns a copy the target vendor will accept.

use tracing::debug;

use crate::chat::{
    AssistantMessage, ContentBlock, Message, StopReason, TextContent, ToolResultMessage, now_millis,
};
use crate::model::Model;

/// Text sent in place of an image to a model without image input.
pub const IMAGE_PLACEHOLDER: &str = "(image omitted: model does not support images)";

/// Text of the error result synthesized for an unanswered tool call.
pub const MISSING_TOOL_RESULT: &str = "No result provided";

fn same_model(msg: &AssistantMessage, model: &Model) -> bool {
    msg.api == model.api && msg.provider == model.provider && msg.model == model.id
}

fn convert_assistant(msg: &AssistantMessage, model: &Model) -> AssistantMessage {
    if same_model(msg, model) {
        return msg.clone();
    }
    let content = msg
        .content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Thinking(thinking) if thinking.redacted => None,
            ContentBlock::Thinking(thinking) if thinking.thinking.trim().is_empty() => None,
            ContentBlock::Thinking(thinking) => Some(ContentBlock::text(thinking.thinking.clone())),
            ContentBlock::Text(text) => Some(ContentBlock::Text(TextContent {
                text: text.text.clone(),
                signature: None,
            })),
            ContentBlock::ToolCall(call) => {
                let mut call = call.clone();
                call.thought_signature = None;
                Some(ContentBlock::ToolCall(call))
            }
            other => Some(other.clone()),
        })
        .collect();
    AssistantMessage {
        content,
        ..msg.clone()
    }
}

fn strip_images(content: &[ContentBlock]) -> Vec<ContentBlock> {
    let mut out: Vec<ContentBlock> = Vec::with_capacity(content.len());
    for block in content {
        match block {
            ContentBlock::Image(_) => {
                let previous_is_placeholder = out
                    .last()
                    .and_then(ContentBlock::as_text)
                    .is_some_and(|t| t == IMAGE_PLACEHOLDER);
                if !previous_is_placeholder {
                    out.push(ContentBlock::text(IMAGE_PLACEHOLDER));
                }
            }
            other => out.push(other.clone()),
        }
    }
    out
}

fn missing_results(pending: &mut Vec<(String, String)>, out: &mut Vec<Message>) {
    for (id, name) in pending.drain(..) {
        debug!(tool_call_id = %id, tool = %name, "synthesizing result for unanswered tool call");
        out.push(Message::ToolResult(ToolResultMessage {
            tool_call_id: id,
            tool_name: name,
            content: vec![ContentBlock::text(MISSING_TOOL_RESULT)],
            is_error: true,
            timestamp: now_millis(),
        }));
    }
}

/// Normalizes `messages` for `model`:
///
/// - assistant turns that ended in `error` or `aborted` are dropped;
/// - thinking from another model becomes plain text (empty or redacted
///   thinking is dropped) and foreign signatures are cleared;
/// - images become a text placeholder when the model lacks image input;
/// - a tool call left unanswered when the next user or assistant turn
///   begins gets a synthetic error result.
pub fn transform_messages(messages: &[Message], model: &Model) -> Vec<Message> {
    let images = model.accepts_images();
    let mut out = Vec::with_capacity(messages.len());
    let mut pending: Vec<(String, String)> = Vec::new();

    for message in messages {
        match message {
            Message::Assistant(msg) => {
                if matches!(msg.stop_reason, StopReason::Error | StopReason::Aborted) {
                    continue;
                }
                missing_results(&mut pending, &mut out);
                let converted = convert_assistant(msg, model);
                pending = converted
                    .tool_calls()
                    .into_iter()
                    .map(|call| (call.id.clone(), call.name.clone()))
                    .collect();
                out.push(Message::Assistant(converted));
            }
            Message::ToolResult(result) => {
                pending.retain(|(id, _)| *id != result.tool_call_id);
                let mut result = result.clone();
                if !images {
                    result.content = strip_images(&result.content);
                }
                out.push(Message::ToolResult(result));
            }
            Message::User(user) => {
                missing_results(&mut pending, &mut out);
                let mut user = user.clone();
                if !images {
                    user.content = strip_images(&user.content);
                }
                out.push(Message::User(user));
            }
        }
    }
    out
}
