//! The [`Relay`] dispatcher and the default-relay shortcuts.

use std::sync::{Arc, OnceLock};

use futures::StreamExt;
use llm_relay_anthropic::{AnthropicConfig, AnthropicProvider};
use llm_relay_core::{
    ApiKind, AssistantMessage, AssistantMessageEvent, AssistantMessageEventStream,
    CacheRetention, Context, EnvDefaults, LlmError, Model, StopReason, StreamOptions,
};
use llm_relay_google::{GoogleConfig, GoogleProvider};
use llm_relay_openai::{OpenAiCompletionsProvider, OpenAiConfig, OpenAiResponsesProvider};
use serde_json::Value;
use tracing::{debug, instrument};

/// Configuration for a [`Relay`].
///
/// ```rust
/// use llm_relay::{CacheRetention, RelayConfig};
///
/// let config = RelayConfig {
///     cache_retention: Some(CacheRetention::None),
///     ..Default::default()
/// };
/// assert!(config.client.is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct RelayConfig {
    /// Anthropic adapter settings.
    pub anthropic: AnthropicConfig,
    /// Settings shared by the Responses and chat-completions adapters.
    pub openai: OpenAiConfig,
    /// Gemini / Vertex adapter settings.
    pub google: GoogleConfig,
    /// Client shared by every adapter whose own config sets none.
    pub client: Option<reqwest::Client>,
    /// Cache-retention default used instead of `LLM_RELAY_CACHE_RETENTION`.
    pub cache_retention: Option<CacheRetention>,
}

/// Routes calls to the adapter for each model's [`ApiKind`].
///
/// A relay holds no per-call state; one instance can serve any number of
/// concurrent calls.
#[derive(Debug, Clone)]
pub struct Relay {
    anthropic: AnthropicProvider,
    responses: OpenAiResponsesProvider,
    completions: OpenAiCompletionsProvider,
    google: GoogleProvider,
    cache_retention: Option<CacheRetention>,
}

impl Default for Relay {
    fn default() -> Self {
        Self::new(RelayConfig::default())
    }
}

impl Relay {
    /// Builds every adapter from `config`.
    pub fn new(config: RelayConfig) -> Self {
        let RelayConfig {
            mut anthropic,
            mut openai,
            mut google,
            client,
            cache_retention,
        } = config;
        if let Some(client) = client {
            anthropic.client.get_or_insert_with(|| client.clone());
            openai.client.get_or_insert_with(|| client.clone());
            google.client.get_or_insert(client);
        }
        Self {
            anthropic: AnthropicProvider::new(anthropic),
            responses: OpenAiResponsesProvider::new(openai.clone()),
            completions: OpenAiCompletionsProvider::new(openai),
            google: GoogleProvider::new(google),
            cache_retention,
        }
    }

    /// The relay behind the module-level [`stream`] and [`complete`].
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<Relay> = OnceLock::new();
        GLOBAL.get_or_init(Relay::default)
    }

    /// Reads the environment for one call.
    fn env(&self) -> EnvDefaults {
        let mut env = EnvDefaults::capture();
        if let Some(retention) = self.cache_retention {
            env.cache_retention = retention;
        }
        env
    }

    /// Starts a streaming call. The first event is `start`; the last is
    /// exactly one `done` or `error`. Failures never surface any other
    /// way.
    pub fn stream(
        &self,
        model: &Model,
        context: &Context,
        options: &StreamOptions,
    ) -> AssistantMessageEventStream {
        self.stream_with_env(model, context, options, &self.env())
    }

    /// [`stream`](Self::stream) with explicitly supplied environment
    /// defaults instead of the process environment.
    #[instrument(skip_all, fields(api = model.api.as_str(), model = %model.id))]
    pub fn stream_with_env(
        &self,
        model: &Model,
        context: &Context,
        options: &StreamOptions,
        env: &EnvDefaults,
    ) -> AssistantMessageEventStream {
        debug!(messages = context.messages.len(), tools = context.tools.len(), "dispatching");
        match model.api {
            ApiKind::AnthropicMessages => self.anthropic.stream(model, context, options, env),
            ApiKind::OpenAiResponses => self.responses.stream(model, context, options, env),
            ApiKind::OpenAiCompletions => self.completions.stream(model, context, options, env),
            ApiKind::GoogleGenerativeAi | ApiKind::GoogleVertex => {
                self.google.stream(model, context, options, env)
            }
        }
    }

    /// Runs a call to completion and returns the final message.
    ///
    /// This drains the same stream [`stream`](Self::stream) returns, so
    /// both modes agree. Failures come back as a message whose
    /// `stop_reason` is `Error` or `Aborted` with `error_message` set.
    pub async fn complete(
        &self,
        model: &Model,
        context: &Context,
        options: &StreamOptions,
    ) -> AssistantMessage {
        drain(model, self.stream(model, context, options)).await
    }

    /// The JSON body the selected adapter would send, without sending it.
    pub fn payload(
        &self,
        model: &Model,
        context: &Context,
        options: &StreamOptions,
    ) -> Result<Value, LlmError> {
        let env = self.env();
        match model.api {
            ApiKind::AnthropicMessages => self.anthropic.payload(model, context, options, &env),
            ApiKind::OpenAiResponses => self.responses.payload(model, context, options, &env),
            ApiKind::OpenAiCompletions => self.completions.payload(model, context, options, &env),
            ApiKind::GoogleGenerativeAi | ApiKind::GoogleVertex => {
                self.google.payload(model, context, options, &env)
            }
        }
    }
}

/// Pulls events until the terminal one and returns its message.
pub(crate) async fn drain(model: &Model, mut stream: AssistantMessageEventStream) -> AssistantMessage {
    while let Some(event) = stream.next().await {
        match event {
            AssistantMessageEvent::Done { message, .. } => return Arc::unwrap_or_clone(message),
            AssistantMessageEvent::Error { error, .. } => return Arc::unwrap_or_clone(error),
            _ => {}
        }
    }
    let mut message = AssistantMessage::empty(model.api, model.provider.clone(), model.id.clone());
    message.stop_reason = StopReason::Error;
    message.error_message = Some("stream ended without a terminal event".into());
    message
}

/// Streams a call through the default [`Relay`].
pub fn stream(model: &Model, context: &Context, options: &StreamOptions) -> AssistantMessageEventStream {
    Relay::global().stream(model, context, options)
}

/// Runs a call to completion through the default [`Relay`].
pub async fn complete(model: &Model, context: &Context, options: &StreamOptions) -> AssistantMessage {
    Relay::global().complete(model, context, options).await
}
