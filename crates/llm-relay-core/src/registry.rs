//! A catalog of model descriptors.
//!
//! The registry maps `(provider, model id)` to a [`Model`]. The global
//! instance starts with a built-in set for each hosted vendor; embedders
//! add local servers or Vertex deployments at runtime.
//!
//! ```rust
//! use llm_relay_core::{ApiKind, Model, ModelRegistry};
//!
//! let registry = ModelRegistry::global();
//! let sonnet = registry.get("anthropic", "claude-sonnet-4-5").expect("built in");
//! assert_eq!(sonnet.api, ApiKind::AnthropicMessages);
//!
//! registry.register(Model::new(
//!     "llama3.2",
//!     ApiKind::OpenAiCompletions,
//!     "ollama",
//!     "http://localhost:11434/v1",
//! ));
//! assert!(registry.get("ollama", "llama3.2").is_some());
//! ```

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use crate::model::{ApiKind, InputKind, Model, ModelCost};

const ANTHROPIC_BASE: &str = "https://api.anthropic.com/v1";
const OPENAI_BASE: &str = "https://api.openai.com/v1";
const GOOGLE_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Thread-safe model catalog.
pub struct ModelRegistry {
    models: RwLock<HashMap<(String, String), Model>>,
}

impl std::fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let models = self.models.read().expect("model registry lock poisoned");
        let keys: Vec<_> = models.keys().collect();
        f.debug_struct("ModelRegistry").field("models", &keys).finish()
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn key(provider: &str, id: &str) -> (String, String) {
    (provider.to_lowercase(), id.to_owned())
}

#[allow(clippy::too_many_arguments)]
fn builtin(
    id: &str,
    name: &str,
    api: ApiKind,
    provider: &str,
    base_url: &str,
    reasoning: bool,
    cost: [f64; 4],
    context_window: u64,
    max_tokens: u32,
) -> Model {
    Model {
        name: name.into(),
        reasoning,
        input: vec![InputKind::Text, InputKind::Image],
        cost: ModelCost {
            input: cost[0],
            output: cost[1],
            cache_read: cost[2],
            cache_write: cost[3],
        },
        context_window,
        max_tokens,
        ..Model::new(id, api, provider, base_url)
    }
}

fn builtins() -> Vec<Model> {
    use ApiKind::{AnthropicMessages, GoogleGenerativeAi, OpenAiResponses};
    vec![
        builtin("claude-sonnet-4-5", "Claude Sonnet 4.5", AnthropicMessages, "anthropic", ANTHROPIC_BASE, true, [3.0, 15.0, 0.3, 3.75], 200_000, 64_000),
        builtin("claude-opus-4-1", "Claude Opus 4.1", AnthropicMessages, "anthropic", ANTHROPIC_BASE, true, [15.0, 75.0, 1.5, 18.75], 200_000, 32_000),
        builtin("claude-haiku-4-5", "Claude Haiku 4.5", AnthropicMessages, "anthropic", ANTHROPIC_BASE, true, [1.0, 5.0, 0.1, 1.25], 200_000, 64_000),
        builtin("gpt-5", "GPT-5", OpenAiResponses, "openai", OPENAI_BASE, true, [1.25, 10.0, 0.125, 0.0], 400_000, 128_000),
        builtin("gpt-5-mini", "GPT-5 mini", OpenAiResponses, "openai", OPENAI_BASE, true, [0.25, 2.0, 0.025, 0.0], 400_000, 128_000),
        builtin("gpt-4.1", "GPT-4.1", OpenAiResponses, "openai", OPENAI_BASE, false, [2.0, 8.0, 0.5, 0.0], 1_047_576, 32_768),
        builtin("gemini-2.5-pro", "Gemini 2.5 Pro", GoogleGenerativeAi, "google", GOOGLE_BASE, true, [1.25, 10.0, 0.31, 0.0], 1_048_576, 65_536),
        builtin("gemini-2.5-flash", "Gemini 2.5 Flash", GoogleGenerativeAi, "google", GOOGLE_BASE, true, [0.3, 2.5, 0.075, 0.0], 1_048_576, 65_536),
    ]
}

impl ModelRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            models: RwLock::new(HashMap::new()),
        }
    }

    /// A registry pre-populated with the built-in models.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for model in builtins() {
            registry.register(model);
        }
        registry
    }

    /// The process-wide registry, initialized with the built-ins.
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<ModelRegistry> = OnceLock::new();
        GLOBAL.get_or_init(ModelRegistry::with_builtins)
    }

    /// Adds or replaces a model, keyed by `(provider, id)`.
    pub fn register(&self, model: Model) -> &Self {
        let mut models = self.models.write().expect("model registry lock poisoned");
        models.insert(key(&model.provider, &model.id), model);
        self
    }

    /// Removes a model. Returns `true` if it was present.
    pub fn unregister(&self, provider: &str, id: &str) -> bool {
        let mut models = self.models.write().expect("model registry lock poisoned");
        models.remove(&key(provider, id)).is_some()
    }

    /// Looks up a model. Provider names are case-insensitive.
    pub fn get(&self, provider: &str, id: &str) -> Option<Model> {
        let models = self.models.read().expect("model registry lock poisoned");
        models.get(&key(provider, id)).cloned()
    }

    /// All models for a provider, sorted by id.
    pub fn models(&self, provider: &str) -> Vec<Model> {
        let provider = provider.to_lowercase();
        let models = self.models.read().expect("model registry lock poisoned");
        let mut out: Vec<Model> = models
            .iter()
            .filter(|((p, _), _)| *p == provider)
            .map(|(_, m)| m.clone())
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Registered provider names, sorted and deduplicated.
    pub fn providers(&self) -> Vec<String> {
        let models = self.models.read().expect("model registry lock poisoned");
        let mut out: Vec<String> = models.keys().map(|(p, _)| p.clone()).collect();
        out.sort();
        out.dedup();
        out
    }
}
