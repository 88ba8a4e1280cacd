//! The chat-completions adapter for `OpenAI`-compatible servers.

mod convert;
mod stream;
mod types;

use http::header::{ACCEPT, AUTHORIZATION, HeaderValue};
use llm_relay_core::driver::drive;
use llm_relay_core::{
    AssistantMessageEventStream, Context, EnvDefaults, LlmError, Model, StreamOptions,
};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::OpenAiConfig;
use stream::CompletionsStream;

/// Streams completions from `POST {base_url}/chat/completions`.
///
/// Server differences (the output-limit field name, developer-role and
/// usage-in-stream support, reasoning effort) come from the model's
/// [`OpenAiCompat`](llm_relay_core::OpenAiCompat). Local servers often
/// need no credential, so the `Authorization` header is only sent when
/// one resolves.
#[derive(Debug, Clone)]
pub struct OpenAiCompletionsProvider {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiCompletionsProvider {
    /// Create a new chat-completions adapter from configuration.
    pub fn new(config: OpenAiConfig) -> Self {
        let client = config.client.clone().unwrap_or_default();
        Self { config, client }
    }

    /// The adapter's configuration.
    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    /// The JSON body this adapter would send for a call. Chat completions
    /// has no cache directive, so `env` only matters for credentials.
    pub fn payload(
        &self,
        model: &Model,
        context: &Context,
        options: &StreamOptions,
        _env: &EnvDefaults,
    ) -> Result<Value, LlmError> {
        convert::build_payload(model, context, options, &self.config)
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
        let url = format!("{}/chat/completions", model.base_url.trim_end_matches('/'));
        let fallback = env.credential_for(model.api).map(str::to_owned);
        let config = self.config.clone();
        let call_options = options.clone();
        let call_model = model.clone();

        let prepare = async move {
            let payload = payload?;
            let api_key = call_options
                .credential(&call_model, fallback.as_deref())
                .await?;
            call_options.inspect_payload(&payload);
            debug!(
                %url,
                messages = payload["messages"].as_array().map_or(0, Vec::len),
                authenticated = api_key.is_some(),
                "sending request"
            );

            let mut request = client
                .post(&url)
                .header(ACCEPT, "text/event-stream")
                .json(&payload);
            if let Some(api_key) = api_key {
                let bearer = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|_| {
                    LlmError::Auth("API key contains invalid header characters".into())
                })?;
                request = request.header(AUTHORIZATION, bearer);
            }
            let request = config.apply_headers(request);
            Ok::<_, LlmError>(call_options.apply_headers(request, &call_model))
        };

        drive(
            model,
            options.cancel.clone(),
            options.timeout,
            prepare,
            CompletionsStream::new(),
        )
    }
}

impl Default for OpenAiCompletionsProvider {
    fn default() -> Self {
        Self::new(OpenAiConfig::default())
    }
}
