//! Google Gemini adapter for `llm-relay`.
//!
//! One [`GoogleProvider`] serves both the Generative Language API
//! (`ApiKind::GoogleGenerativeAi`, API-key auth) and Vertex AI
//! (`ApiKind::GoogleVertex`, bearer-token auth). Requests go to
//! `{base_url}/models/{id}:streamGenerateContent?alt=sse`.
//!
//! Before sending, tool schemas are rewritten into Google's schema
//! dialect, and assistant tool calls that carry no valid thought
//! signature are removed from the history together with their results.
//! Signed calls are replayed with their signature unchanged.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use llm_relay_core::{ApiKind, Context, EnvDefaults, Model, StreamOptions};
//! use llm_relay_google::{GoogleConfig, GoogleProvider};
//!
//! let provider = GoogleProvider::new(GoogleConfig::default());
//! let model = Model::new(
//!     "gemini-2.5-flash",
//!     ApiKind::GoogleGenerativeAi,
//!     "google",
//!     "https://generativelanguage.googleapis.com/v1beta",
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

pub use config::GoogleConfig;
pub use provider::GoogleProvider;
