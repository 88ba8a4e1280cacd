//! `GoogleProvider` implementation.

use http::header::{ACCEPT, AUTHORIZATION, HeaderName, HeaderValue};
use llm_relay_core::driver::drive;
use llm_relay_core::{
    ApiKind, AssistantMessageEventStream, Context, EnvDefaults, LlmError, Model, StreamOptions,
};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::GoogleConfig;
use crate::convert;
use crate::stream::GoogleStream;

const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-goog-api-key");

/// Gemini adapter for both the Generative Language API and Vertex AI.
///
/// The model's [`ApiKind`] picks the credential style: an API key in
/// `x-goog-api-key` for [`ApiKind::GoogleGenerativeAi`], an OAuth bearer
/// token for [`ApiKind::GoogleVertex`]. For Vertex the model's
/// `base_url` is the publisher root, e.g.
/// `https://us-central1-aiplatform.googleapis.com/v1/projects/{project}/locations/us-central1/publishers/google`.
#[derive(Debug, Clone)]
pub struct GoogleProvider {
    config: GoogleConfig,
    client: reqwest::Client,
}

impl GoogleProvider {
    /// Create a new Google adapter from configuration.
    pub fn new(config: GoogleConfig) -> Self {
        let client = config.client.clone().unwrap_or_default();
        Self { config, client }
    }

    /// The adapter's configuration.
    pub fn config(&self) -> &GoogleConfig {
        &self.config
    }

    /// The JSON body this adapter would send for a call. Gemini requests
    /// carry no cache directive.
    pub fn payload(
        &self,
        model: &Model,
        context: &Context,
        options: &StreamOptions,
        _env: &EnvDefaults,
    ) -> Result<Value, LlmError> {
        let request = convert::build_request(model, context, options, &self.config);
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
        let url = stream_url(model);
        let fallback = env.credential_for(model.api).map(str::to_owned);
        let call_options = options.clone();
        let call_model = model.clone();

        let prepare = async move {
            let payload = payload?;
            let credential = call_options
                .require_credential(&call_model, fallback.as_deref())
                .await?;
            let (name, value) = match call_model.api {
                ApiKind::GoogleVertex => (AUTHORIZATION, format!("Bearer {credential}")),
                _ => (API_KEY_HEADER, credential),
            };
            let value = HeaderValue::from_str(&value)
                .map_err(|_| LlmError::Auth("API key contains invalid header characters".into()))?;
            call_options.inspect_payload(&payload);
            debug!(%url, contents = payload["contents"].as_array().map_or(0, Vec::len), "sending request");

            let request = client
                .post(&url)
                .header(name, value)
                .header(ACCEPT, "text/event-stream")
                .json(&payload);
            Ok::<_, LlmError>(call_options.apply_headers(request, &call_model))
        };

        drive(
            model,
            options.cancel.clone(),
            options.timeout,
            prepare,
            GoogleStream::new(),
        )
    }
}

impl Default for GoogleProvider {
    fn default() -> Self {
        Self::new(GoogleConfig::default())
    }
}

fn stream_url(model: &Model) -> String {
    format!(
        "{}/models/{}:streamGenerateContent?alt=sse",
        model.base_url.trim_end_matches('/'),
        model.id
    )
}

#[cfg(test)]
mod tests {
    use llm_relay_core::test_helpers::{count_to_three, sample_model};
    use llm_relay_core::CacheRetention;

    use super::*;

    #[test]
    fn test_stream_url() {
        let model = sample_model(
            ApiKind::GoogleGenerativeAi,
            "https://generativelanguage.googleapis.com/v1beta/",
        );
        assert_eq!(
            stream_url(&model),
            "https://generativelanguage.googleapis.com/v1beta/models/test-model:streamGenerateContent?alt=sse"
        );
    }

    #[test]
    fn test_payload_has_no_cache_directive() {
        let provider = GoogleProvider::default();
        let model = sample_model(ApiKind::GoogleGenerativeAi, "http://x");
        let env = EnvDefaults {
            cache_retention: CacheRetention::Long,
            ..Default::default()
        };
        let json = provider
            .payload(&model, &count_to_three(), &StreamOptions::default(), &env)
            .unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "Count to 3");
        assert!(!json.to_string().contains("cache"));
    }
}
