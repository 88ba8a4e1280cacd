//! `OpenAI` adapters for `llm-relay`.
//!
//! Two adapters share this crate's configuration and error parsing:
//!
//! - [`OpenAiResponsesProvider`] speaks the Responses API
//!   (`POST /responses`). It replays encrypted reasoning across turns and
//!   forwards prompt-cache keys and retention.
//! - [`OpenAiCompletionsProvider`] speaks chat completions
//!   (`POST /chat/completions`), the dialect most local and hosted
//!   compatible servers (Ollama, vLLM, LM Studio, OpenRouter) implement.
//!   Per-server quirks come from [`OpenAiCompat`](llm_relay_core::OpenAiCompat).
//!
//! # Quick start
//!
//! ```rust,no_run
//! use llm_relay_core::{ApiKind, Context, EnvDefaults, Model, OpenAiCompat, StreamOptions};
//! use llm_relay_openai::{OpenAiCompletionsProvider, OpenAiConfig};
//!
//! let provider = OpenAiCompletionsProvider::new(OpenAiConfig::default());
//! let model = Model {
//!     compat: Some(OpenAiCompat {
//!         max_tokens_field: "max_tokens".into(),
//!         ..Default::default()
//!     }),
//!     ..Model::new("llama3.2", ApiKind::OpenAiCompletions, "ollama", "http://localhost:11434/v1")
//! };
//! let stream = provider.stream(
//!     &model,
//!     &Context::from_prompt("Hello!"),
//!     &StreamOptions::default(),
//!     &EnvDefaults::capture(),
//! );
//! # drop(stream);
//! ```

#![warn(missing_docs)]

mod completions;
mod config;
mod error;
mod responses;

pub use completions::OpenAiCompletionsProvider;
pub use config::OpenAiConfig;
pub use responses::OpenAiResponsesProvider;
