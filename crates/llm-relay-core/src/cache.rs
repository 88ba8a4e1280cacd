//! Prompt-cache retention policy.
//!
//! Callers choose a [`CacheRetention`] per call or leave it unset, in
//! which case the process-wide default applies. That default comes from
//! the `LLM_RELAY_CACHE_RETENTION` environment variable, read once at the
//! facade boundary via [`CacheRetention::from_env`] and passed down as a
//! plain value. Adapters turn the resolved policy into vendor directives
//! with the helpers here; nothing is ever inferred from the base URL, so
//! proxies and vendor endpoints behave identically.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Environment variable holding the default retention tier.
pub const CACHE_RETENTION_ENV: &str = "LLM_RELAY_CACHE_RETENTION";

/// How long the vendor should keep the prompt prefix cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheRetention {
    /// No cache directives at all.
    None,
    /// The vendor's default short-lived cache.
    #[default]
    #[serde(alias = "default")]
    Short,
    /// Extended retention (Anthropic 1h TTL, OpenAI 24h).
    Long,
}

impl CacheRetention {
    /// Reads the process-wide default from the environment.
    ///
    /// `long` (any case) selects [`Long`](Self::Long); anything else,
    /// including an unset variable, selects [`Short`](Self::Short).
    pub fn from_env() -> Self {
        Self::from_env_value(std::env::var(CACHE_RETENTION_ENV).ok().as_deref())
    }

    /// Interprets a raw environment value.
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("long") => Self::Long,
            _ => Self::Short,
        }
    }

    /// The explicit per-call choice wins over the captured default.
    pub fn resolve(explicit: Option<Self>, default: Self) -> Self {
        explicit.unwrap_or(default)
    }

    /// Anthropic-style block annotation, or `None` when caching is off.
    pub fn cache_control(self) -> Option<CacheControl> {
        match self {
            Self::None => None,
            Self::Short => Some(CacheControl {
                kind: "ephemeral".into(),
                ttl: None,
            }),
            Self::Long => Some(CacheControl {
                kind: "ephemeral".into(),
                ttl: Some("1h".into()),
            }),
        }
    }

    /// OpenAI-style request fields.
    ///
    /// The key is the caller's session id; the retention field is only
    /// set for [`Long`](Self::Long). Both are omitted for
    /// [`None`](Self::None).
    pub fn prompt_cache_fields(self, session_id: Option<&str>) -> PromptCacheFields {
        match self {
            Self::None => PromptCacheFields::default(),
            Self::Short => PromptCacheFields {
                key: session_id.map(str::to_owned),
                retention: None,
            },
            Self::Long => PromptCacheFields {
                key: session_id.map(str::to_owned),
                retention: Some("24h"),
            },
        }
    }
}

impl fmt::Display for CacheRetention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Short => "short",
            Self::Long => "long",
        })
    }
}

/// Error returned when parsing an unknown retention name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown cache retention '{0}' (expected none, short, default, or long)")]
pub struct ParseCacheRetentionError(String);

impl FromStr for CacheRetention {
    type Err = ParseCacheRetentionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "short" | "default" => Ok(Self::Short),
            "long" => Ok(Self::Long),
            _ => Err(ParseCacheRetentionError(s.to_owned())),
        }
    }
}

/// A `cache_control` annotation on an Anthropic content block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheControl {
    /// Always `"ephemeral"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Extended lifetime, e.g. `"1h"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
}

/// `prompt_cache_key` / `prompt_cache_retention` for OpenAI requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptCacheFields {
    /// Routing key for the cache.
    pub key: Option<String>,
    /// Retention duration.
    pub retention: Option<&'static str>,
}
