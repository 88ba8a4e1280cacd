//! Token usage and cost tracking.
//!
//! Every assistant message carries a [`Usage`] record with four token
//! counters and their total. [`Cost`] tracks money in **microdollars**
//! (1 USD = 1,000,000 microdollars) so costs aggregate without
//! floating-point drift. Because model prices are quoted in USD per
//! million tokens, `tokens × price` is already a microdollar amount.
//!
//! # Invariants
//!
//! - `Usage::total_tokens == input + output + cache_read + cache_write`
//!   after [`Usage::settle`]; deserialization recomputes it.
//! - `Cost::total == input + output + cache_read + cache_write`; the
//!   fields are private and deserialization recomputes the total.

use std::fmt;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

use crate::model::ModelCost;

/// Token counts for one assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    /// Uncached prompt tokens.
    pub input: u64,
    /// Generated tokens, reasoning included.
    pub output: u64,
    /// Prompt tokens served from the vendor's cache.
    pub cache_read: u64,
    /// Prompt tokens written into the vendor's cache.
    pub cache_write: u64,
    /// Sum of the four counters. Kept current by [`settle`](Self::settle).
    pub total_tokens: u64,
    /// Derived cost.
    pub cost: Cost,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageRaw {
    #[serde(default)]
    input: u64,
    #[serde(default)]
    output: u64,
    #[serde(default)]
    cache_read: u64,
    #[serde(default)]
    cache_write: u64,
    #[serde(default)]
    cost: Cost,
}

impl<'de> Deserialize<'de> for Usage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = UsageRaw::deserialize(deserializer)?;
        let mut usage = Self {
            input: raw.input,
            output: raw.output,
            cache_read: raw.cache_read,
            cache_write: raw.cache_write,
            total_tokens: 0,
            cost: raw.cost,
        };
        usage.total_tokens = usage.sum();
        Ok(usage)
    }
}

impl Usage {
    /// Builds a settled usage record with zero cost.
    pub fn new(input: u64, output: u64, cache_read: u64, cache_write: u64) -> Self {
        let mut usage = Self {
            input,
            output,
            cache_read,
            cache_write,
            ..Self::default()
        };
        usage.total_tokens = usage.sum();
        usage
    }

    fn sum(&self) -> u64 {
        self.input
            .saturating_add(self.output)
            .saturating_add(self.cache_read)
            .saturating_add(self.cache_write)
    }

    /// Recomputes `total_tokens` and `cost` from the counters.
    ///
    /// Adapters call this whenever they update a counter, so the
    /// invariant holds on every emitted snapshot.
    pub fn settle(&mut self, prices: &ModelCost) {
        self.total_tokens = self.sum();
        self.cost = Cost::from_prices(self, prices);
    }
}

impl Add for Usage {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += &rhs;
        self
    }
}

impl AddAssign<&Usage> for Usage {
    /// Adds another record field-by-field with saturating arithmetic.
    fn add_assign(&mut self, rhs: &Self) {
        self.input = self.input.saturating_add(rhs.input);
        self.output = self.output.saturating_add(rhs.output);
        self.cache_read = self.cache_read.saturating_add(rhs.cache_read);
        self.cache_write = self.cache_write.saturating_add(rhs.cache_write);
        self.total_tokens = self.sum();
        self.cost = self.cost.clone() + rhs.cost.clone();
    }
}

/// Monetary cost in microdollars.
///
/// ```rust
/// use llm_relay_core::usage::Cost;
///
/// let cost = Cost::new(300_000, 150_000, 0, 0).expect("no overflow");
/// assert_eq!(cost.total_microdollars(), 450_000);
/// assert!((cost.total_usd() - 0.45).abs() < f64::EPSILON);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cost {
    input: u64,
    output: u64,
    cache_read: u64,
    cache_write: u64,
    total: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CostRaw {
    #[serde(default)]
    input: u64,
    #[serde(default)]
    output: u64,
    #[serde(default)]
    cache_read: u64,
    #[serde(default)]
    cache_write: u64,
}

impl<'de> Deserialize<'de> for Cost {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = CostRaw::deserialize(deserializer)?;
        Self::new(raw.input, raw.output, raw.cache_read, raw.cache_write)
            .ok_or_else(|| serde::de::Error::custom("cost overflow: components exceed u64"))
    }
}

impl Cost {
    /// Creates a cost, returning `None` if the total would overflow.
    pub fn new(input: u64, output: u64, cache_read: u64, cache_write: u64) -> Option<Self> {
        let total = input
            .checked_add(output)?
            .checked_add(cache_read)?
            .checked_add(cache_write)?;
        Some(Self {
            input,
            output,
            cache_read,
            cache_write,
            total,
        })
    }

    /// Prices a usage record. Rounds each component to the nearest
    /// microdollar and saturates instead of overflowing.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_prices(usage: &Usage, prices: &ModelCost) -> Self {
        let price = |tokens: u64, per_million: f64| -> u64 {
            let value = (tokens as f64 * per_million).round();
            if value.is_finite() && value > 0.0 {
                value.min(u64::MAX as f64) as u64
            } else {
                0
            }
        };
        let input = price(usage.input, prices.input);
        let output = price(usage.output, prices.output);
        let cache_read = price(usage.cache_read, prices.cache_read);
        let cache_write = price(usage.cache_write, prices.cache_write);
        Self {
            input,
            output,
            cache_read,
            cache_write,
            total: input
                .saturating_add(output)
                .saturating_add(cache_read)
                .saturating_add(cache_write),
        }
    }

    /// Cost of uncached prompt tokens.
    pub fn input_microdollars(&self) -> u64 {
        self.input
    }

    /// Cost of generated tokens.
    pub fn output_microdollars(&self) -> u64 {
        self.output
    }

    /// Cost of cache reads.
    pub fn cache_read_microdollars(&self) -> u64 {
        self.cache_read
    }

    /// Cost of cache writes.
    pub fn cache_write_microdollars(&self) -> u64 {
        self.cache_write
    }

    /// Total in microdollars.
    pub fn total_microdollars(&self) -> u64 {
        self.total
    }

    /// Total in US dollars, for display.
    #[allow(clippy::cast_precision_loss)]
    pub fn total_usd(&self) -> f64 {
        self.total as f64 / 1_000_000.0
    }
}

impl fmt::Display for Cost {
    /// Formats as USD with four decimals, e.g. `$0.0123`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.4}", self.total_usd())
    }
}

impl Add for Cost {
    type Output = Self;

    /// Saturating component-wise addition.
    fn add(self, rhs: Self) -> Self {
        let input = self.input.saturating_add(rhs.input);
        let output = self.output.saturating_add(rhs.output);
        let cache_read = self.cache_read.saturating_add(rhs.cache_read);
        let cache_write = self.cache_write.saturating_add(rhs.cache_write);
        Self {
            input,
            output,
            cache_read,
            cache_write,
            total: input
                .saturating_add(output)
                .saturating_add(cache_read)
                .saturating_add(cache_write),
        }
    }
}
