//! Anthropic Messages API request and stream types.
//!
//! These are internal wire types, not exposed publicly. They map to the
//! JSON schemas at <https://docs.anthropic.com/en/api/messages> and
//! <https://docs.anthropic.com/en/api/messages-streaming>.

use llm_relay_core::cache::CacheControl;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Request types ──────────────────────────────────────────────────

/// Top-level request body for `POST /v1/messages`.
#[derive(Debug, Serialize)]
pub(crate) struct Request<'a> {
    pub model: &'a str,
    pub messages: Vec<Message>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub system: Vec<SystemBlock>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,
}

/// One system prompt block.
#[derive(Debug, Serialize)]
pub(crate) struct SystemBlock {
    #[serde(rename = "type")]
    pub block_type: &'static str,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,
}

/// Extended thinking configuration.
#[derive(Debug, Serialize)]
pub(crate) struct ThinkingConfig {
    #[serde(rename = "type")]
    pub thinking_type: &'static str,
    pub budget_tokens: u32,
}

/// A message in the conversation.
#[derive(Debug, Serialize)]
pub(crate) struct Message {
    pub role: &'static str,
    pub content: Vec<ContentBlock>,
}

/// Content block within a request message.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub(crate) enum ContentBlock {
    #[serde(rename = "text")]
    Text {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    #[serde(rename = "image")]
    Image {
        source: Base64Source,
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    #[serde(rename = "document")]
    Document {
        source: Base64Source,
        #[serde(skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
    #[serde(rename = "thinking")]
    Thinking { thinking: String, signature: String },
    #[serde(rename = "redacted_thinking")]
    RedactedThinking { data: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: Vec<ContentBlock>,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<CacheControl>,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            cache_control: None,
        }
    }

    /// Marks the block as a cache breakpoint. Thinking and tool-use blocks
    /// cannot carry one and are left alone.
    pub fn set_cache_control(&mut self, marker: CacheControl) -> bool {
        match self {
            Self::Text { cache_control, .. }
            | Self::Image { cache_control, .. }
            | Self::Document { cache_control, .. }
            | Self::ToolResult { cache_control, .. } => {
                *cache_control = Some(marker);
                true
            }
            Self::Thinking { .. } | Self::RedactedThinking { .. } | Self::ToolUse { .. } => false,
        }
    }

    pub fn is_tool_result(&self) -> bool {
        matches!(self, Self::ToolResult { .. })
    }
}

/// Base64 source for an image or document block.
#[derive(Debug, Serialize)]
pub(crate) struct Base64Source {
    #[serde(rename = "type")]
    pub source_type: &'static str,
    pub media_type: String,
    pub data: String,
}

/// Tool definition sent to the API.
#[derive(Debug, Serialize)]
pub(crate) struct Tool<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub input_schema: &'a Value,
}

// ── Error types ────────────────────────────────────────────────────

/// Error response body, also the payload of the in-stream `error` event.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: ErrorDetail,
}

/// Error detail within an error response.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorDetail {
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    pub message: String,
}

// ── Streaming types ────────────────────────────────────────────────

/// A single SSE event from the streaming API.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum StreamEvent {
    MessageStart {
        message: StreamMessage,
    },
    ContentBlockStart {
        index: usize,
        content_block: StreamBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageDelta {
        delta: MessageDelta,
        usage: Option<StreamUsage>,
    },
    MessageStop,
    Ping,
    Error {
        error: ErrorDetail,
    },
    #[serde(other)]
    Unknown,
}

/// Message metadata from `message_start`.
#[derive(Debug, Deserialize)]
pub(crate) struct StreamMessage {
    pub id: Option<String>,
    pub usage: Option<StreamUsage>,
}

/// The block announced by `content_block_start`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum StreamBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
        #[serde(default)]
        signature: Option<String>,
    },
    RedactedThinking {
        data: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Unknown,
}

/// Delta payload of `content_block_delta`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum BlockDelta {
    TextDelta { text: String },
    ThinkingDelta { thinking: String },
    SignatureDelta { signature: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Unknown,
}

/// `delta` of `message_delta`.
#[derive(Debug, Deserialize)]
pub(crate) struct MessageDelta {
    pub stop_reason: Option<String>,
}

/// Token counts. `message_start` carries the input side, `message_delta`
/// the cumulative output count.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct StreamUsage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub cache_read_input_tokens: Option<u64>,
    pub cache_creation_input_tokens: Option<u64>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_request_serialization_minimal() {
        let req = Request {
            model: "claude-haiku-4-5",
            messages: vec![Message {
                role: "user",
                content: vec![ContentBlock::text("Hello")],
            }],
            max_tokens: 1024,
            temperature: None,
            system: Vec::new(),
            stream: true,
            tools: Vec::new(),
            thinking: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "claude-haiku-4-5");
        assert_eq!(json["stream"], true);
        assert_eq!(json["messages"][0]["content"][0]["type"], "text");
        assert!(json["messages"][0]["content"][0].get("cache_control").is_none());
        assert!(json.get("system").is_none());
        assert!(json.get("tools").is_none());
        assert!(json.get("temperature").is_none());
    }

    #[test]
    fn test_tool_result_serialization() {
        let block = ContentBlock::ToolResult {
            tool_use_id: "toolu_01".into(),
            content: vec![ContentBlock::text("sunny")],
            is_error: false,
            cache_control: None,
        };
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["type"], "tool_result");
        assert_eq!(json["content"][0]["text"], "sunny");
        assert!(json.get("is_error").is_none());
    }

    #[test]
    fn test_cache_control_only_on_cacheable_blocks() {
        let marker = CacheControl {
            kind: "ephemeral".into(),
            ttl: Some("1h".into()),
        };
        let mut text = ContentBlock::text("hi");
        assert!(text.set_cache_control(marker.clone()));
        let json = serde_json::to_value(&text).unwrap();
        assert_eq!(json["cache_control"], json!({"type": "ephemeral", "ttl": "1h"}));

        let mut tool_use = ContentBlock::ToolUse {
            id: "a".into(),
            name: "b".into(),
            input: json!({}),
        };
        assert!(!tool_use.set_cache_control(marker));
    }

    #[test]
    fn test_stream_event_deserialization() {
        let event: StreamEvent = serde_json::from_value(json!({
            "type": "content_block_delta",
            "index": 1,
            "delta": {"type": "input_json_delta", "partial_json": "{\"a\""}
        }))
        .unwrap();
        assert!(matches!(
            event,
            StreamEvent::ContentBlockDelta {
                index: 1,
                delta: BlockDelta::InputJsonDelta { .. }
            }
        ));

        let event: StreamEvent =
            serde_json::from_value(json!({"type": "something_new", "x": 1})).unwrap();
        assert!(matches!(event, StreamEvent::Unknown));
    }

    #[test]
    fn test_unknown_block_and_delta_types() {
        let block: StreamBlock =
            serde_json::from_value(json!({"type": "server_tool_use", "id": "x"})).unwrap();
        assert!(matches!(block, StreamBlock::Unknown));
        let delta: BlockDelta =
            serde_json::from_value(json!({"type": "citations_delta", "citation": {}})).unwrap();
        assert!(matches!(delta, BlockDelta::Unknown));
    }

    #[test]
    fn test_error_response_deserialization() {
        let err: ErrorResponse = serde_json::from_value(json!({
            "type": "error",
            "error": {"type": "overloaded_error", "message": "Overloaded"}
        }))
        .unwrap();
        assert_eq!(err.error.error_type.as_deref(), Some("overloaded_error"));
        assert_eq!(err.error.message, "Overloaded");
    }
}
