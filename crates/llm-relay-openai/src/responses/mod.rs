//! The `OpenAI` Responses API adapter.

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
use stream::ResponsesStream;

/// Streams completions from `POST {base_url}/responses`.
///
/// Reasoning items are requested with encrypted content and kept in the
/// thinking block's signature, so a conversation can be replayed with
/// `store: false`. Tool-call ids have the form `call_id|item_id`.
#[derive(Debug, Clone)]
pub struct OpenAiResponsesProvider {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiResponsesProvider {
    /// Create a new Responses adapter from configuration.
    pub fn new(config: OpenAiConfig) -> Self {
        let client = config.client.clone().unwrap_or_default();
        Self { config, client }
    }

    /// The adapter's configuration.
    pub fn config(&self) -> &OpenAiConfig {
        &self.config
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
        )?;
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
        let url = format!("{}/responses", model.base_url.trim_end_matches('/'));
        let fallback = env.credential_for(model.api).map(str::to_owned);
        let config = self.config.clone();
        let call_options = options.clone();
        let call_model = model.clone();

        let prepare = async move {
            let payload = payload?;
            let api_key = call_options
                .require_credential(&call_model, fallback.as_deref())
                .await?;
            let bearer = HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|_| LlmError::Auth("API key contains invalid header characters".into()))?;
            call_options.inspect_payload(&payload);
            debug!(%url, items = payload["input"].as_array().map_or(0, Vec::len), "sending request");

            let request = client
                .post(&url)
                .header(AUTHORIZATION, bearer)
                .header(ACCEPT, "text/event-stream")
                .json(&payload);
            let request = config.apply_headers(request);
            Ok::<_, LlmError>(call_options.apply_headers(request, &call_model))
        };

        drive(
            model,
            options.cancel.clone(),
            options.timeout,
            prepare,
            ResponsesStream::new(),
        )
    }
}

impl Default for OpenAiResponsesProvider {
    fn default() -> Self {
        Self::new(OpenAiConfig::default())
    }
}
