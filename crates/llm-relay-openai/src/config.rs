//! `OpenAI` adapter configuration, shared by the Responses and
//! chat-completions adapters.

use llm_relay_core::ImageLimits;

/// Configuration for the `OpenAI` adapters.
///
/// Use struct update syntax with [`Default`] for ergonomic construction:
///
/// ```rust
/// use llm_relay_openai::OpenAiConfig;
///
/// let config = OpenAiConfig {
///     organization: Some("org-123".into()),
///     ..Default::default()
/// };
/// assert_eq!(config.reasoning_effort, "medium");
/// ```
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Optional `OpenAI-Organization` header.
    pub organization: Option<String>,
    /// Optional `OpenAI-Project` header.
    pub project: Option<String>,
    /// Reasoning effort when thinking is on and the call gives no budget.
    pub reasoning_effort: String,
    /// Reasoning summary mode for the Responses API (`"auto"`,
    /// `"concise"`, `"detailed"`).
    pub reasoning_summary: String,
    /// Image limits applied before every request.
    pub image_limits: ImageLimits,
    /// Pre-configured HTTP client for connection pooling. When `None`, a
    /// new client is created.
    pub client: Option<reqwest::Client>,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            organization: None,
            project: None,
            reasoning_effort: "medium".into(),
            reasoning_summary: "auto".into(),
            image_limits: ImageLimits {
                max_bytes: Some(20 * 1024 * 1024),
                max_images: Some(500),
                provider_label: "OpenAI".into(),
                ..Default::default()
            },
            client: None,
        }
    }
}

impl OpenAiConfig {
    /// The effort for a call: derived from an explicit token budget when
    /// there is one, otherwise the configured default.
    pub(crate) fn effort(&self, budget: Option<u32>) -> &str {
        match budget {
            Some(0..=2048) => "low",
            Some(2049..=16_384) => "medium",
            Some(_) => "high",
            None => &self.reasoning_effort,
        }
    }

    /// Applies the organization and project headers.
    pub(crate) fn apply_headers(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(org) = &self.organization {
            request = request.header("OpenAI-Organization", org);
        }
        if let Some(project) = &self.project {
            request = request.header("OpenAI-Project", project);
        }
        request
    }
}
