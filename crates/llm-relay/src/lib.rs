//! # llm-relay
//!
//! One streaming interface to several LLM vendors. Callers describe a
//! conversation once, as a vendor-neutral [`Context`], and get back a
//! normalized stream of [`AssistantMessageEvent`]s no matter which wire
//! protocol the [`Model`] speaks.
//!
//! # Adapter crates
//!
//! | Crate | [`ApiKind`] | Vendors |
//! |-------|-------------|---------|
//! | `llm-relay-anthropic` | `AnthropicMessages` | Claude |
//! | `llm-relay-openai` | `OpenAiResponses`, `OpenAiCompletions` | `OpenAI`, Ollama, vLLM, LM Studio, OpenRouter |
//! | `llm-relay-google` | `GoogleGenerativeAi`, `GoogleVertex` | Gemini |
//!
//! # Architecture
//!
//! ```text
//!                ┌──────────────────────────────┐
//!                │          llm-relay           │  ← you are here
//!                │  (Relay, stream, complete)   │
//!                └──────────────┬───────────────┘
//!          ┌────────────────────┼────────────────────┐
//!          ▼                    ▼                    ▼
//!  ┌───────────────┐    ┌───────────────┐    ┌───────────────┐
//!  │    anthropic  │    │     openai    │    │     google    │
//!  └───────┬───────┘    └───────┬───────┘    └───────┬───────┘
//!          └────────────────────┼────────────────────┘
//!                               ▼
//!                ┌──────────────────────────────┐
//!                │        llm-relay-core        │
//!                └──────────────────────────────┘
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use llm_relay::{AssistantMessageEvent, Context, ModelRegistry, StreamOptions};
//!
//! # async fn example() {
//! let model = ModelRegistry::global()
//!     .get("anthropic", "claude-haiku-4-5")
//!     .expect("built-in model");
//! let context = Context::from_prompt("Count to 3");
//!
//! // Stream mode.
//! let mut events = llm_relay::stream(&model, &context, &StreamOptions::default());
//! while let Some(event) = events.next().await {
//!     if let AssistantMessageEvent::TextDelta { delta, .. } = &event {
//!         print!("{delta}");
//!     }
//! }
//!
//! // Awaited mode.
//! let message = llm_relay::complete(&model, &context, &StreamOptions::default()).await;
//! println!("{:?}: {:?}", message.stop_reason, message.text());
//! # }
//! ```
//!
//! # Environment
//!
//! Read once per call: `LLM_RELAY_CACHE_RETENTION` (`none`, `short`,
//! `long`) sets the default cache tier; `ANTHROPIC_API_KEY`,
//! `OPENAI_API_KEY`, `GEMINI_API_KEY`, and `GOOGLE_CLOUD_ACCESS_TOKEN`
//! are fallback credentials when a call sets neither
//! [`StreamOptions::api_key`] nor [`StreamOptions::credentials`].

#![warn(missing_docs)]

mod relay;

pub use relay::{Relay, RelayConfig, complete, stream};

// ── Re-exports ─────────────────────────────────────────────────────
//
// The vocabulary every caller needs. Adapter crates and the rest of
// core stay reachable through their own paths:
//
//   llm_relay_core::*           sanitizers, transform, driver, registry
//   llm_relay::anthropic::*     AnthropicProvider, AnthropicConfig
//   llm_relay::openai::*        Responses and chat-completions adapters
//   llm_relay::google::*        GoogleProvider, GoogleConfig

pub use llm_relay_anthropic as anthropic;
pub use llm_relay_google as google;
pub use llm_relay_openai as openai;

pub use llm_relay_core::{
    ApiKind, AssistantMessage, AssistantMessageEvent, AssistantMessageEventStream, CacheRetention,
    ContentBlock, Context, CredentialResolver, EnvDefaults, LlmError, Message, Model,
    ModelRegistry, StaticCredential, StopReason, StreamOptions, Tool, ToolCall, Usage,
};
