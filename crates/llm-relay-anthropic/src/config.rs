//! Anthropic adapter configuration.

use llm_relay_core::{ImageLimits, ManyImageLimit};

/// Configuration for the Anthropic adapter.
///
/// Credentials are not part of the config; they come from the per-call
/// [`StreamOptions`](llm_relay_core::StreamOptions) or the captured
/// environment. Use struct update syntax with [`Default`]:
///
/// ```rust
/// use llm_relay_anthropic::AnthropicConfig;
///
/// let config = AnthropicConfig {
///     beta: vec!["interleaved-thinking-2025-05-14".into()],
///     ..Default::default()
/// };
/// assert_eq!(config.api_version, "2023-06-01");
/// ```
#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    /// `anthropic-version` header.
    pub api_version: String,
    /// Values joined into the `anthropic-beta` header. Empty sends none.
    pub beta: Vec<String>,
    /// Output cap when the call does not set one (bounded by the model).
    pub default_max_tokens: u32,
    /// Reasoning budget when thinking is on and the call gives none.
    pub default_thinking_budget: u32,
    /// Image limits applied before every request.
    pub image_limits: ImageLimits,
    /// Pre-configured HTTP client for connection pooling. When `None`, a
    /// new client is created.
    pub client: Option<reqwest::Client>,
}

impl Default for AnthropicConfig {
    fn default() -> Self {
        Self {
            api_version: "2023-06-01".into(),
            beta: Vec::new(),
            default_max_tokens: 4096,
            default_thinking_budget: 4096,
            image_limits: ImageLimits {
                max_bytes: Some(5 * 1024 * 1024),
                max_dimension: Some(8000),
                many_image_limit: Some(ManyImageLimit {
                    threshold: 20,
                    max_dimension: 2000,
                }),
                max_images: Some(100),
                provider_label: "Anthropic".into(),
            },
            client: None,
        }
    }
}
