//! The Anthropic Messages adapter.

use http::header::{ACCEPT, CONTENT_TYPE, HeaderValue};
use llm_relay_core::driver::drive;
use llm_relay_core::{
    AssistantMessageEventStream, Context, EnvDefaults, LlmError, Model, StreamOptions,
};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::AnthropicConfig;
use crate::convert;
use crate::stream::AnthropicStream;

/// Streams completions from the Anthropic Messages API.
///
/// # Example
///
/// ```rust,no_run
/// use futures::StreamExt;
/// use llm_relay_anthropic::{AnthropicConfig, AnthropicProvider};
/// use llm_relay_core::{Context, EnvDefaults, ModelRegistry, StreamOptions};
///
/// # async fn example() {
/// let provider = AnthropicProvider::new(AnthropicConfig::default());
/// let model = ModelRegistry::global()
///     .get("anthropic", "claude-haiku-4-5")
///     .expect("built-in model");
/// let mut events = provider.stream(
///     &model,
///     &Context::from_prompt("Hello!"),
///     &StreamOptions::default(),
///     &EnvDefaults::capture(),
/// );
/// while let Some(event) = events.next().await {
///     println!("{}", event.kind());
/// }
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    config: AnthropicConfig,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new Anthropic adapter from configuration.
    ///
    /// If `config.client` is `Some`, that client is reused for connection
    /// pooling.
    pub fn new(config: AnthropicConfig) -> Self {
        let client = config.client.clone().unwrap_or_default();
        Self { config, client }
    }

    /// The adapter's configuration.
    pub fn config(&self) -> &AnthropicConfig {
        &self.config
    }

    /// Build the full URL for the messages endpoint.
    fn messages_url(model: &Model) -> String {
        let base = model.base_url.trim_end_matches('/');
        format!("{base}/messages")
    }

    /// The JSON body this adapter would send for a call.
    pub fn payload(
        &self,
        model: &Model,
        context: &Context,
        options: &StreamOptions,
        env: &EnvDefaults,
    ) -> Result<Value, LlmError> {
        let request = convert::build_request(
            model,
            context,
            options,
            &self.config,
            env.retention(options),
        );
        Ok(serde_json::to_value(&request)?)
    }

    /// Starts a streaming call. The returned stream always ends with
    /// exactly one `done` or `error` event.
    #[instrument(skip_all, fields(model = %model.id))]
    pub fn stream(
        &self,
        model: &Model,
        context: &Context,
        options: &StreamOptions,
        env: &EnvDefaults,
    ) -> AssistantMessageEventStream {
        let payload = self.payload(model, context, options, env);
        let client = options.client.clone().unwrap_or_else(|| self.client.clone());
        let url = Self::messages_url(model);
        let fallback = env.credential_for(model.api).map(str::to_owned);
        let api_version = self.config.api_version.clone();
        let beta = self.config.beta.join(",");
        let call_options = options.clone();
        let call_model = model.clone();

        let prepare = async move {
            let payload = payload?;
            let api_key = call_options
                .require_credential(&call_model, fallback.as_deref())
                .await?;
            let api_key = HeaderValue::from_str(&api_key)
                .map_err(|_| LlmError::Auth("API key contains invalid header characters".into()))?;
            call_options.inspect_payload(&payload);
            debug!(%url, messages = payload["messages"].as_array().map_or(0, Vec::len), "sending request");

            let mut request = client
                .post(&url)
                .header("x-api-key", api_key)
                .header("anthropic-version", api_version)
                .header(CONTENT_TYPE, "application/json")
                .header(ACCEPT, "text/event-stream")
                .json(&payload);
            if !beta.is_empty() {
                request = request.header("anthropic-beta", beta);
            }
            Ok::<_, LlmError>(call_options.apply_headers(request, &call_model))
        };

        drive(
            model,
            options.cancel.clone(),
            options.timeout,
            prepare,
            AnthropicStream::new(),
        )
    }
}

impl Default for AnthropicProvider {
    fn default() -> Self {
        Self::new(AnthropicConfig::default())
    }
}
