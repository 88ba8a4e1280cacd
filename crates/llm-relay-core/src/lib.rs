//! # llm-relay-core
//!
//! The vendor-neutral vocabulary and machinery every `llm-relay` adapter
//! shares: messages and content blocks, the streaming event contract,
//! the partial-message builder, and the payload-shaping passes (schema
//! sanitizer, cache-retention resolver, attachment sanitizer, history
//! transform). It contains no vendor wire formats; those live in the
//! adapter crates.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────────────┐ ┌────────────────┐ ┌────────────────┐
//!  │ relay-anthropic  │ │  relay-openai  │ │  relay-google  │
//!  └────────┬─────────┘ └───────┬────────┘ └───────┬────────┘
//!           └──────────┬────────┴──────────┬───────┘
//!                      ▼                   ▼
//!            ┌───────────────────────────────────────┐
//!            │            llm-relay-core             │  ← you are here
//!            │ (events, builder, sanitizers, driver) │
//!            └───────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`chat`] | Messages, content blocks, tools, and the call [`Context`] |
//! | [`model`] | Model descriptors and the [`ApiKind`] dispatch key |
//! | [`stream`] | [`AssistantMessageEvent`] and the event-stream alias |
//! | [`partial`] | [`MessageBuilder`], the per-call state machine |
//! | [`accumulate`] | Tool-call argument accumulation |
//! | [`schema`] | JSON-Schema rewriting for the Google dialect |
//! | [`cache`] | Cache-retention policy and vendor directives |
//! | [`attachments`] | Image filtering against vendor limits |
//! | [`transform`] | Cross-vendor history normalization |
//! | [`sse`] | Incremental SSE decoding |
//! | [`driver`] | The shared streaming driver |
//! | [`options`] | Per-call [`StreamOptions`] and [`EnvDefaults`] |
//! | [`registry`] | The [`ModelRegistry`] catalog |
//! | [`error`] | Unified [`LlmError`] |
//! | [`usage`] | Token counts and cost |

#![warn(missing_docs)]

pub mod accumulate;
pub mod attachments;
pub mod cache;
pub mod chat;
pub mod driver;
pub mod error;
pub mod model;
pub mod options;
pub mod partial;
pub mod registry;
pub mod schema;
pub mod sse;
pub mod stream;
pub mod transform;
pub mod usage;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_helpers;

pub use accumulate::{ArgumentAccumulator, ArgumentParseError};
pub use attachments::{ImageLimits, ManyImageLimit, sanitize_attachments};
pub use cache::CacheRetention;
pub use chat::{
    AssistantMessage, ContentBlock, Context, DocumentContent, ImageContent, Message, StopReason,
    TextContent, ThinkingContent, Tool, ToolCall, ToolResultMessage, UserMessage,
};
pub use error::LlmError;
pub use model::{ApiKind, InputKind, Model, ModelCost, OpenAiCompat};
pub use options::{CredentialResolver, EnvDefaults, StaticCredential, StreamOptions};
pub use partial::MessageBuilder;
pub use registry::ModelRegistry;
pub use schema::sanitize_schema;
pub use stream::{AssistantMessageEvent, AssistantMessageEventStream};
pub use usage::{Cost, Usage};
