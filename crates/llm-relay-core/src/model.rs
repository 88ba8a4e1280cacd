//! Model descriptors.
//!
//! A [`Model`] tells the facade which wire protocol to speak
//! ([`ApiKind`]), where to send the request, what the model accepts,
//! and how to price its usage. Descriptors are plain data: build them
//! by hand, or fetch a built-in one from the
//! [`ModelRegistry`](crate::registry::ModelRegistry).

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The wire protocol a model speaks. This is the facade's dispatch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApiKind {
    /// Anthropic Messages API (`POST /v1/messages`).
    AnthropicMessages,
    /// OpenAI Responses API (`POST /responses`).
    #[serde(rename = "openai-responses")]
    OpenAiResponses,
    /// OpenAI-compatible Chat Completions (`POST /chat/completions`),
    /// spoken by most local model servers and proxies.
    #[serde(rename = "openai-completions")]
    OpenAiCompletions,
    /// Google Generative Language API (Gemini, API-key auth).
    GoogleGenerativeAi,
    /// Google Vertex AI (Gemini, bearer-token auth).
    GoogleVertex,
}

impl ApiKind {
    /// The stable string form, as used in serialized messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AnthropicMessages => "anthropic-messages",
            Self::OpenAiResponses => "openai-responses",
            Self::OpenAiCompletions => "openai-completions",
            Self::GoogleGenerativeAi => "google-generative-ai",
            Self::GoogleVertex => "google-vertex",
        }
    }
}

impl fmt::Display for ApiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A kind of input a model accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    /// Plain text (always accepted).
    Text,
    /// Inline images.
    Image,
}

/// Prices in USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelCost {
    /// Uncached prompt tokens.
    pub input: f64,
    /// Generated tokens (including reasoning).
    pub output: f64,
    /// Prompt tokens served from cache.
    pub cache_read: f64,
    /// Prompt tokens written into the cache.
    pub cache_write: f64,
}

/// How an OpenAI-compatible server spells its reasoning controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThinkingFormat {
    /// `reasoning_effort: "low" | "medium" | "high"`.
    #[default]
    ReasoningEffort,
    /// The server has no reasoning control; thinking options are ignored.
    None,
}

/// Quirks of OpenAI-compatible chat-completions servers.
///
/// Defaults describe `api.openai.com`; local servers usually want
/// `max_tokens_field: "max_tokens"` and `supports_developer_role: false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpenAiCompat {
    /// Whether `stream_options.include_usage` is understood.
    pub supports_usage_in_streaming: bool,
    /// Whether the `developer` role replaces `system` for reasoning models.
    pub supports_developer_role: bool,
    /// Name of the output-limit field (`max_completion_tokens` or `max_tokens`).
    pub max_tokens_field: String,
    /// How reasoning is requested.
    pub thinking_format: ThinkingFormat,
}

impl Default for OpenAiCompat {
    fn default() -> Self {
        Self {
            supports_usage_in_streaming: true,
            supports_developer_role: true,
            max_tokens_field: "max_completion_tokens".into(),
            thinking_format: ThinkingFormat::ReasoningEffort,
        }
    }
}

/// Everything the relay needs to know about one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// Vendor model identifier, sent on the wire.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Wire protocol.
    pub api: ApiKind,
    /// Provider label (e.g. `"anthropic"`, `"openai"`, `"google"`, `"ollama"`).
    pub provider: String,
    /// Endpoint root; the adapter appends its own path.
    pub base_url: String,
    /// Whether the model supports extended reasoning.
    pub reasoning: bool,
    /// Accepted input kinds.
    pub input: Vec<InputKind>,
    /// Prices used to fill in [`Usage::cost`](crate::usage::Usage::cost).
    pub cost: ModelCost,
    /// Context window, in tokens.
    pub context_window: u64,
    /// Maximum output tokens.
    pub max_tokens: u32,
    /// Static headers sent with every request for this model.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    /// Chat-completions quirks; only read by the completions adapter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compat: Option<OpenAiCompat>,
}

impl Model {
    /// Minimal descriptor with text-only input and zero cost. Useful for
    /// local servers and tests; adjust fields with struct update syntax.
    pub fn new(
        id: impl Into<String>,
        api: ApiKind,
        provider: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            api,
            provider: provider.into(),
            base_url: base_url.into(),
            reasoning: false,
            input: vec![InputKind::Text],
            cost: ModelCost::default(),
            context_window: 128_000,
            max_tokens: 8192,
            headers: HashMap::new(),
            compat: None,
        }
    }

    /// Whether the model accepts inline images.
    pub fn accepts_images(&self) -> bool {
        self.input.contains(&InputKind::Image)
    }
}
