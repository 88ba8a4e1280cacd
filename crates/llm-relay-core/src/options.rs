//! Per-call options and the environment snapshot taken at the call
//! boundary.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::cache::CacheRetention;
use crate::error::LlmError;
use crate::model::{ApiKind, Model};

/// Supplies a credential (API key or bearer token) for a call.
///
/// Implement this to plug in OAuth refresh or a secrets store. The
/// returned future runs inside the event stream, so a slow refresh never
/// blocks the caller and is cancelled with the call.
///
/// ```rust
/// use std::future::Future;
/// use std::pin::Pin;
/// use llm_relay_core::{CredentialResolver, LlmError, Model};
///
/// struct FromVault;
///
/// impl CredentialResolver for FromVault {
///     fn resolve<'a>(
///         &'a self,
///         _model: &'a Model,
///     ) -> Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + 'a>> {
///         Box::pin(async { Ok("token-from-vault".to_owned()) })
///     }
/// }
/// ```
pub trait CredentialResolver: Send + Sync {
    /// Returns the credential to send for `model`.
    fn resolve<'a>(
        &'a self,
        model: &'a Model,
    ) -> Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + 'a>>;
}

/// A resolver that always returns the same credential.
#[derive(Clone)]
pub struct StaticCredential(String);

impl StaticCredential {
    /// Wraps a fixed credential.
    pub fn new(credential: impl Into<String>) -> Self {
        Self(credential.into())
    }
}

impl fmt::Debug for StaticCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticCredential([REDACTED])")
    }
}

impl CredentialResolver for StaticCredential {
    fn resolve<'a>(
        &'a self,
        _model: &'a Model,
    ) -> Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + 'a>> {
        Box::pin(async move { Ok(self.0.clone()) })
    }
}

/// Observes the exact JSON body before it is sent. Testing and debugging
/// only; it cannot change the request.
pub type PayloadHook = Arc<dyn Fn(&Value) + Send + Sync>;

/// Options for one call.
///
/// Construct with struct update syntax:
///
/// ```rust
/// use llm_relay_core::{CacheRetention, StreamOptions};
///
/// let options = StreamOptions {
///     cache_retention: Some(CacheRetention::Long),
///     session_id: Some("session-42".into()),
///     ..Default::default()
/// };
/// assert!(options.thinking_enabled.is_none());
/// ```
#[derive(Clone, Default)]
pub struct StreamOptions {
    /// Explicit cache tier; `None` uses the environment default.
    pub cache_retention: Option<CacheRetention>,
    /// Request model reasoning.
    pub thinking_enabled: Option<bool>,
    /// Reasoning budget in tokens.
    pub thinking_budget_tokens: Option<u32>,
    /// Output-token cap; defaults to the model's or adapter's limit.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Credential used verbatim; wins over `credentials` and the environment.
    pub api_key: Option<String>,
    /// Credential hook consulted when `api_key` is unset.
    pub credentials: Option<Arc<dyn CredentialResolver>>,
    /// Caller's session identifier, used as a cache key where supported.
    pub session_id: Option<String>,
    /// Payload-inspection hook.
    pub on_payload: Option<PayloadHook>,
    /// Abort signal; cancelling ends the stream with an `error` event.
    pub cancel: Option<CancellationToken>,
    /// Transport timeout for the whole request.
    pub timeout: Option<Duration>,
    /// Extra request headers, applied after the model's static headers.
    pub headers: HashMap<String, String>,
    /// Shared HTTP client; when `None` the adapter's client is used.
    pub client: Option<reqwest::Client>,
}

impl fmt::Debug for StreamOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamOptions")
            .field("cache_retention", &self.cache_retention)
            .field("thinking_enabled", &self.thinking_enabled)
            .field("thinking_budget_tokens", &self.thinking_budget_tokens)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("credentials", &self.credentials.as_ref().map(|_| "..."))
            .field("session_id", &self.session_id)
            .field("on_payload", &self.on_payload.as_ref().map(|_| "..."))
            .field("cancel", &self.cancel)
            .field("timeout", &self.timeout)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("client", &self.client.as_ref().map(|_| "..."))
            .finish()
    }
}

impl StreamOptions {
    /// Whether reasoning was requested.
    pub fn thinking(&self) -> bool {
        self.thinking_enabled.unwrap_or(false)
    }

    /// Passes `payload` to the inspection hook, if any.
    pub fn inspect_payload(&self, payload: &Value) {
        if let Some(hook) = &self.on_payload {
            hook(payload);
        }
    }

    /// Resolves the credential: explicit key, then the resolver hook,
    /// then `fallback` (captured from the environment). `Ok(None)` means
    /// none is available.
    pub async fn credential(
        &self,
        model: &Model,
        fallback: Option<&str>,
    ) -> Result<Option<String>, LlmError> {
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) {
            return Ok(Some(key.to_owned()));
        }
        if let Some(resolver) = &self.credentials {
            return resolver.resolve(model).await.map(Some);
        }
        Ok(fallback.filter(|k| !k.is_empty()).map(str::to_owned))
    }

    /// Like [`credential`](Self::credential) but fails with
    /// [`LlmError::Auth`] when nothing is available.
    pub async fn require_credential(
        &self,
        model: &Model,
        fallback: Option<&str>,
    ) -> Result<String, LlmError> {
        self.credential(model, fallback).await?.ok_or_else(|| {
            LlmError::Auth(format!(
                "no credential for provider '{}' (model {})",
                model.provider, model.id
            ))
        })
    }

    /// Applies the model's static headers, then the per-call headers.
    pub fn apply_headers(
        &self,
        mut request: reqwest::RequestBuilder,
        model: &Model,
    ) -> reqwest::RequestBuilder {
        for (name, value) in model.headers.iter().chain(&self.headers) {
            request = request.header(name.as_str(), value.as_str());
        }
        request
    }
}

/// Process-wide defaults read from the environment once per call, at the
/// facade boundary, and threaded down as a value.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct EnvDefaults {
    /// From `LLM_RELAY_CACHE_RETENTION`.
    pub cache_retention: CacheRetention,
    /// From `ANTHROPIC_API_KEY`.
    pub anthropic_api_key: Option<String>,
    /// From `OPENAI_API_KEY`.
    pub openai_api_key: Option<String>,
    /// From `GEMINI_API_KEY`.
    pub gemini_api_key: Option<String>,
    /// From `GOOGLE_CLOUD_ACCESS_TOKEN`.
    pub google_access_token: Option<String>,
}

impl fmt::Debug for EnvDefaults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("EnvDefaults")
            .field("cache_retention", &self.cache_retention)
            .field("anthropic_api_key", &redact(&self.anthropic_api_key))
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("gemini_api_key", &redact(&self.gemini_api_key))
            .field("google_access_token", &redact(&self.google_access_token))
            .finish()
    }
}

impl EnvDefaults {
    /// Reads every variable now.
    pub fn capture() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self {
            cache_retention: CacheRetention::from_env(),
            anthropic_api_key: var("ANTHROPIC_API_KEY"),
            openai_api_key: var("OPENAI_API_KEY"),
            gemini_api_key: var("GEMINI_API_KEY"),
            google_access_token: var("GOOGLE_CLOUD_ACCESS_TOKEN"),
        }
    }

    /// The fallback credential for an api kind.
    pub fn credential_for(&self, api: ApiKind) -> Option<&str> {
        match api {
            ApiKind::AnthropicMessages => self.anthropic_api_key.as_deref(),
            ApiKind::OpenAiResponses | ApiKind::OpenAiCompletions => self.openai_api_key.as_deref(),
            ApiKind::GoogleGenerativeAi => self.gemini_api_key.as_deref(),
            ApiKind::GoogleVertex => self.google_access_token.as_deref(),
        }
    }

    /// The retention tier for a call given its explicit choice.
    pub fn retention(&self, options: &StreamOptions) -> CacheRetention {
        CacheRetention::resolve(options.cache_retention, self.cache_retention)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn model() -> Model {
        Model::new("m", ApiKind::AnthropicMessages, "anthropic", "http://x")
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let options = StreamOptions {
            api_key: Some("sk-secret".into()),
            ..Default::default()
        };
        let out = format!("{options:?}");
        assert!(!out.contains("sk-secret"));
        assert!(out.contains("[REDACTED]"));

        let env = EnvDefaults {
            openai_api_key: Some("sk-env".into()),
            ..Default::default()
        };
        assert!(!format!("{env:?}").contains("sk-env"));
    }

    #[tokio::test]
    async fn test_credential_precedence() {
        let m = model();
        let explicit = StreamOptions {
            api_key: Some("explicit".into()),
            credentials: Some(Arc::new(StaticCredential::new("hook"))),
            ..Default::default()
        };
        assert_eq!(
            explicit.credential(&m, Some("env")).await.unwrap().as_deref(),
            Some("explicit")
        );

        let hooked = StreamOptions {
            credentials: Some(Arc::new(StaticCredential::new("hook"))),
            ..Default::default()
        };
        assert_eq!(
            hooked.credential(&m, Some("env")).await.unwrap().as_deref(),
            Some("hook")
        );

        let plain = StreamOptions::default();
        assert_eq!(
            plain.credential(&m, Some("env")).await.unwrap().as_deref(),
            Some("env")
        );
        assert_eq!(plain.credential(&m, None).await.unwrap(), None);
        assert!(matches!(
            plain.require_credential(&m, None).await,
            Err(LlmError::Auth(_))
        ));
    }

    #[test]
    fn test_payload_hook_observes() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let options = StreamOptions {
            on_payload: Some(Arc::new(move |v: &Value| {
                sink.lock().unwrap().push(v.clone());
            })),
            ..Default::default()
        };
        options.inspect_payload(&serde_json::json!({"model": "m"}));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_env_retention_resolution() {
        let env = EnvDefaults {
            cache_retention: CacheRetention::Long,
            ..Default::default()
        };
        assert_eq!(env.retention(&StreamOptions::default()), CacheRetention::Long);
        let explicit = StreamOptions {
            cache_retention: Some(CacheRetention::None),
            ..Default::default()
        };
        assert_eq!(env.retention(&explicit), CacheRetention::None);
    }

    #[test]
    fn test_credential_for_api() {
        let env = EnvDefaults {
            gemini_api_key: Some("g".into()),
            google_access_token: Some("t".into()),
            ..Default::default()
        };
        assert_eq!(env.credential_for(ApiKind::GoogleGenerativeAi), Some("g"));
        assert_eq!(env.credential_for(ApiKind::GoogleVertex), Some("t"));
        assert_eq!(env.credential_for(ApiKind::OpenAiCompletions), None);
    }
}
