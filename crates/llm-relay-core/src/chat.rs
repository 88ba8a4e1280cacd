//! Conversation vocabulary: messages, content blocks, tools, and the
//! [`Context`] handed to every adapter.
//!
//! The serialized form is stable (camelCase fields, `role`/`type` tags)
//! so a session layer can persist histories and replay them against any
//! vendor.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::ApiKind;
use crate::usage::Usage;

/// Milliseconds since the Unix epoch, as stamped on messages.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Why the assistant stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    /// Natural end of turn.
    #[default]
    Stop,
    /// The output-token limit was reached.
    Length,
    /// The turn ended with one or more tool calls.
    ToolUse,
    /// The call failed; see [`AssistantMessage::error_message`].
    Error,
    /// The caller cancelled the call.
    Aborted,
}

/// Plain text.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextContent {
    /// The text.
    pub text: String,
    /// Opaque vendor token attached to the text (Responses message id,
    /// Gemini thought signature).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// Model reasoning output.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingContent {
    /// Reasoning text (summary text for vendors that only expose summaries).
    pub thinking: String,
    /// Opaque token proving the reasoning came from the vendor: Anthropic
    /// signature, serialized Responses reasoning item, Gemini thought
    /// signature. For redacted blocks this holds the encrypted payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Whether the vendor redacted the reasoning text.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub redacted: bool,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    /// Vendor-assigned call id, echoed back by the tool result.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Parsed arguments (an empty object when parsing failed).
    pub arguments: Value,
    /// Opaque per-call token required by some vendors on replay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
}

/// An inline image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageContent {
    /// Base64-encoded bytes.
    pub data: String,
    /// MIME type, e.g. `image/png`.
    pub mime_type: String,
}

/// An inline document (typically a PDF).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentContent {
    /// Base64-encoded bytes.
    pub data: String,
    /// MIME type, e.g. `application/pdf`.
    pub mime_type: String,
    /// Optional title / filename.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// One unit of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentBlock {
    /// Plain text.
    Text(TextContent),
    /// Model reasoning.
    Thinking(ThinkingContent),
    /// A tool invocation.
    ToolCall(ToolCall),
    /// An inline image.
    Image(ImageContent),
    /// An inline document.
    Document(DocumentContent),
}

impl ContentBlock {
    /// Text block shorthand.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(TextContent {
            text: text.into(),
            signature: None,
        })
    }

    /// Image block shorthand.
    pub fn image(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::Image(ImageContent {
            data: data.into(),
            mime_type: mime_type.into(),
        })
    }

    /// Returns the text if this is a text block.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(&t.text),
            _ => None,
        }
    }
}

/// A message authored by the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMessage {
    /// Text, image, and document blocks.
    pub content: Vec<ContentBlock>,
    /// Creation time in epoch milliseconds.
    pub timestamp: i64,
}

/// The outcome of a tool call, sent back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultMessage {
    /// The [`ToolCall::id`] this answers.
    pub tool_call_id: String,
    /// The tool's name.
    pub tool_name: String,
    /// Text and image blocks.
    pub content: Vec<ContentBlock>,
    /// Whether the tool failed.
    #[serde(default)]
    pub is_error: bool,
    /// Creation time in epoch milliseconds.
    pub timestamp: i64,
}

/// A message produced by a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantMessage {
    /// Text, thinking, and tool-call blocks in emission order.
    pub content: Vec<ContentBlock>,
    /// Wire protocol that produced the message.
    pub api: ApiKind,
    /// Provider label of the producing model.
    pub provider: String,
    /// Producing model id.
    pub model: String,
    /// Vendor response id, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
    /// Token counts and cost.
    pub usage: Usage,
    /// Why generation stopped.
    pub stop_reason: StopReason,
    /// Populated when `stop_reason` is `Error` or `Aborted`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Creation time in epoch milliseconds.
    pub timestamp: i64,
}

impl AssistantMessage {
    /// An empty message stamped for the given producer.
    pub fn empty(api: ApiKind, provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            content: Vec::new(),
            api,
            provider: provider.into(),
            model: model.into(),
            response_id: None,
            usage: Usage::default(),
            stop_reason: StopReason::Stop,
            error_message: None,
            timestamp: now_millis(),
        }
    }

    /// Concatenation of all text blocks, or `None` if there are none.
    pub fn text(&self) -> Option<String> {
        let mut texts = self.content.iter().filter_map(ContentBlock::as_text).peekable();
        texts.peek()?;
        Some(texts.collect())
    }

    /// All tool calls, in order.
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }
}

/// A conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "camelCase")]
pub enum Message {
    /// User turn.
    User(UserMessage),
    /// Model turn.
    Assistant(AssistantMessage),
    /// Tool outcome.
    ToolResult(ToolResultMessage),
}

impl Message {
    /// A user message with a single text block.
    pub fn user(text: impl Into<String>) -> Self {
        Self::User(UserMessage {
            content: vec![ContentBlock::text(text)],
            timestamp: now_millis(),
        })
    }

    /// A user message with arbitrary blocks.
    pub fn user_blocks(content: Vec<ContentBlock>) -> Self {
        Self::User(UserMessage {
            content,
            timestamp: now_millis(),
        })
    }

    /// A successful tool result with a single text block.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::ToolResult(ToolResultMessage {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            content: vec![ContentBlock::text(text)],
            is_error: false,
            timestamp: now_millis(),
        })
    }

    /// A failed tool result with a single text block.
    pub fn tool_error(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self::ToolResult(ToolResultMessage {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            content: vec![ContentBlock::text(text)],
            is_error: true,
            timestamp: now_millis(),
        })
    }

    /// The message's content blocks.
    pub fn content(&self) -> &[ContentBlock] {
        match self {
            Self::User(m) => &m.content,
            Self::Assistant(m) => &m.content,
            Self::ToolResult(m) => &m.content,
        }
    }

    /// Mutable access to the message's content blocks.
    pub fn content_mut(&mut self) -> &mut Vec<ContentBlock> {
        match self {
            Self::User(m) => &mut m.content,
            Self::Assistant(m) => &mut m.content,
            Self::ToolResult(m) => &mut m.content,
        }
    }
}

impl From<AssistantMessage> for Message {
    fn from(msg: AssistantMessage) -> Self {
        Self::Assistant(msg)
    }
}

/// A tool the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Unique tool name.
    pub name: String,
    /// What the tool does, shown to the model.
    pub description: String,
    /// JSON Schema for the arguments object.
    pub parameters: Value,
}

/// Everything the model sees for one call.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    /// System prompt, sent through each vendor's dedicated channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Conversation history, oldest first.
    pub messages: Vec<Message>,
    /// Tools the model may call.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
}

impl Context {
    /// A context with a single user message.
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(prompt)],
            ..Self::default()
        }
    }
}
