//! `OpenAI` Responses API request and stream types.
//!
//! Wire types only; they mirror <https://platform.openai.com/docs/api-reference/responses>.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorDetail;

// ── Request types ──────────────────────────────────────────────────

/// Top-level request body for `POST /responses`.
#[derive(Debug, Serialize)]
pub(crate) struct Request<'a> {
    pub model: &'a str,
    pub input: Vec<Value>,
    pub stream: bool,
    pub store: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<Reasoning<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_cache_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_cache_retention: Option<&'static str>,
}

/// Reasoning controls.
#[derive(Debug, Serialize)]
pub(crate) struct Reasoning<'a> {
    pub effort: &'a str,
    pub summary: &'a str,
}

/// Function tool definition.
#[derive(Debug, Serialize)]
pub(crate) struct Tool<'a> {
    #[serde(rename = "type")]
    pub tool_type: &'static str,
    pub name: &'a str,
    pub description: &'a str,
    pub parameters: &'a Value,
    pub strict: bool,
}

/// A message input item.
#[derive(Debug, Serialize)]
pub(crate) struct InputMessage {
    #[serde(rename = "type")]
    pub item_type: &'static str,
    pub role: &'static str,
    pub content: Vec<InputContent>,
}

/// A content part of an input message.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum InputContent {
    InputText {
        text: String,
    },
    InputImage {
        detail: &'static str,
        image_url: String,
    },
    InputFile {
        filename: String,
        file_data: String,
    },
}

/// A prior assistant message replayed as input.
#[derive(Debug, Serialize)]
pub(crate) struct OutputMessage {
    #[serde(rename = "type")]
    pub item_type: &'static str,
    pub role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub status: &'static str,
    pub content: Vec<OutputText>,
}

/// Text part of a replayed assistant message.
#[derive(Debug, Serialize)]
pub(crate) struct OutputText {
    #[serde(rename = "type")]
    pub part_type: &'static str,
    pub text: String,
    pub annotations: Vec<Value>,
}

/// A prior function call replayed as input.
#[derive(Debug, Serialize)]
pub(crate) struct FunctionCall {
    #[serde(rename = "type")]
    pub item_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub call_id: String,
    pub name: String,
    pub arguments: String,
}

/// The result of a function call.
#[derive(Debug, Serialize)]
pub(crate) struct FunctionCallOutput {
    #[serde(rename = "type")]
    pub item_type: &'static str,
    pub call_id: String,
    pub output: String,
}

// ── Streaming types ────────────────────────────────────────────────

/// One output item, as announced by `response.output_item.added` and
/// completed by `response.output_item.done`.
///
/// Reasoning items round-trip: the completed item is serialized into the
/// thinking block's signature and replayed verbatim on the next turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum OutputItem {
    Reasoning {
        id: String,
        #[serde(default)]
        summary: Vec<SummaryPart>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        encrypted_content: Option<String>,
    },
    Message {
        id: String,
    },
    FunctionCall {
        #[serde(default)]
        id: Option<String>,
        call_id: String,
        name: String,
        #[serde(default)]
        arguments: String,
    },
    #[serde(other)]
    Unknown,
}

/// One summary part of a reasoning item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SummaryPart {
    #[serde(rename = "type")]
    pub part_type: String,
    pub text: String,
}

/// A single SSE event from the streaming API.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub(crate) enum StreamEvent {
    #[serde(rename = "response.created")]
    Created { response: ResponseInfo },
    #[serde(rename = "response.output_item.added")]
    OutputItemAdded { output_index: usize, item: OutputItem },
    #[serde(rename = "response.output_item.done")]
    OutputItemDone { output_index: usize, item: OutputItem },
    #[serde(rename = "response.reasoning_summary_text.delta")]
    ReasoningSummaryDelta { output_index: usize, delta: String },
    #[serde(rename = "response.reasoning_summary_part.done")]
    ReasoningSummaryPartDone { output_index: usize },
    #[serde(rename = "response.output_text.delta")]
    OutputTextDelta { output_index: usize, delta: String },
    #[serde(rename = "response.refusal.delta")]
    RefusalDelta { output_index: usize, delta: String },
    #[serde(rename = "response.function_call_arguments.delta")]
    FunctionCallArgumentsDelta { output_index: usize, delta: String },
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone { output_index: usize, arguments: String },
    #[serde(rename = "response.completed")]
    Completed { response: ResponseInfo },
    #[serde(rename = "response.incomplete")]
    Incomplete { response: ResponseInfo },
    #[serde(rename = "response.failed")]
    Failed { response: ResponseInfo },
    #[serde(rename = "error")]
    Error(ErrorDetail),
    #[serde(other)]
    Unknown,
}

/// The `response` object carried by lifecycle events.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ResponseInfo {
    pub id: Option<String>,
    pub usage: Option<ResponseUsage>,
    pub error: Option<ErrorDetail>,
    pub incomplete_details: Option<IncompleteDetails>,
}

/// Why a response is incomplete.
#[derive(Debug, Deserialize)]
pub(crate) struct IncompleteDetails {
    pub reason: Option<String>,
}

/// Token usage of a finished response.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ResponseUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub input_tokens_details: Option<InputTokensDetails>,
}

/// Cached share of the input.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct InputTokensDetails {
    #[serde(default)]
    pub cached_tokens: u64,
}
