//! Google adapter configuration.

use llm_relay_core::ImageLimits;

/// Configuration for the Gemini / Vertex AI adapter.
///
/// ```rust
/// use llm_relay_google::GoogleConfig;
///
/// let config = GoogleConfig {
///     default_thinking_budget: Some(2048),
///     ..Default::default()
/// };
/// assert!(config.include_thoughts);
/// ```
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    /// Reasoning budget when thinking is on and the call gives none.
    /// `None` lets the model choose.
    pub default_thinking_budget: Option<u32>,
    /// Ask for thought summaries when thinking is on.
    pub include_thoughts: bool,
    /// Image limits applied before every request.
    pub image_limits: ImageLimits,
    /// Pre-configured HTTP client for connection pooling. When `None`, a
    /// new client is created.
    pub client: Option<reqwest::Client>,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            default_thinking_budget: None,
            include_thoughts: true,
            image_limits: ImageLimits {
                max_bytes: Some(20 * 1024 * 1024),
                max_images: Some(3000),
                provider_label: "Google".into(),
                ..Default::default()
            },
            client: None,
        }
    }
}
