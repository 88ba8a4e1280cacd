//! Anthropic Messages adapter for `llm-relay`.
//!
//! This crate turns a canonical [`Context`](llm_relay_core::Context) into
//! a streaming `POST {base_url}/messages` call and translates the SSE
//! reply into [`AssistantMessageEvent`](llm_relay_core::AssistantMessageEvent)s.
//! It supports text, extended thinking (including redacted thinking and
//! signatures), tool use, images, PDF documents, and prompt caching via
//! `cache_control` breakpoints.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use llm_relay_anthropic::{AnthropicConfig, AnthropicProvider};
//! use llm_relay_core::{Context, EnvDefaults, Model, ApiKind, StreamOptions};
//!
//! let provider = AnthropicProvider::new(AnthropicConfig::default());
//! let model = Model::new(
//!     "claude-haiku-4-5",
//!     ApiKind::AnthropicMessages,
//!     "anthropic",
//!     "https://api.anthropic.com/v1",
//! );
//! let stream = provider.stream(
//!     &model,
//!     &Context::from_prompt("Hello!"),
//!     &StreamOptions::default(),
//!     &EnvDefaults::capture(),
//! );
//! # drop(stream);
//! ```

#![warn(missing_docs)]

mod config;
mod convert;
mod provider;
mod stream;
mod types;

pub use config::AnthropicConfig;
pub use provider::AnthropicProvider;
