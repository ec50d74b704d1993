//! Data models for subscribers, quote samples and price-change events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::threshold::GLOBAL_DEFAULT_THRESHOLD;

/// Identifier issued by the chat transport.
pub type SubscriberId = i64;

/// Everything the store knows about a single subscriber.
///
/// Field names on disk follow the layout the bot has always written, so older
/// subscription files keep loading. Unknown keys are ignored on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriberRecord {
    /// Advisory display name, not unique
    #[serde(rename = "username", default)]
    pub display_name: String,
    /// Tracked assets in insertion order
    #[serde(rename = "coins", default)]
    pub assets: Vec<String>,
    /// Default percentage threshold for assets without an override
    #[serde(rename = "threshold", default = "default_threshold")]
    pub default_threshold: f64,
    /// Per-asset override thresholds
    #[serde(rename = "coin_thresholds", default)]
    pub overrides: BTreeMap<String, f64>,
    /// Last price observed for each asset
    #[serde(rename = "last_prices", default)]
    pub last_prices: BTreeMap<String, f64>,
}

fn default_threshold() -> f64 {
    GLOBAL_DEFAULT_THRESHOLD
}

impl SubscriberRecord {
    /// Create an empty record with the default threshold.
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            assets: Vec::new(),
            default_threshold: GLOBAL_DEFAULT_THRESHOLD,
            overrides: BTreeMap::new(),
            last_prices: BTreeMap::new(),
        }
    }

    /// Check whether the asset is tracked.
    pub fn tracks(&self, asset: &str) -> bool {
        self.assets.iter().any(|a| a == asset)
    }

    /// Drop override and last-price keys for assets that are not tracked.
    ///
    /// Returns the number of orphaned keys removed.
    pub fn repair(&mut self) -> usize {
        let mut seen = std::collections::HashSet::new();
        self.assets = std::mem::take(&mut self.assets)
            .into_iter()
            .map(|a| normalize_asset(&a))
            .filter(|a| !a.is_empty() && seen.insert(a.clone()))
            .collect();

        let before = self.overrides.len() + self.last_prices.len();
        let assets = &self.assets;
        self.overrides.retain(|k, _| assets.contains(k));
        self.last_prices.retain(|k, _| assets.contains(k));
        before - (self.overrides.len() + self.last_prices.len())
    }
}

/// Direction of a price move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// Direction of the move from `last` to `current`.
    pub fn between(last: f64, current: f64) -> Self {
        if current > last {
            Direction::Up
        } else {
            Direction::Down
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// A price move that crossed a subscriber's threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub subscriber: SubscriberId,
    pub asset: String,
    /// Baseline the move was measured from
    pub last: f64,
    /// Newly observed price
    pub current: f64,
    /// Absolute percentage change
    pub pct_change: f64,
    pub direction: Direction,
    pub observed_at: DateTime<Utc>,
}

/// Normalize an asset identifier: trimmed and lowercase.
pub fn normalize_asset(raw: &str) -> String {
    raw.trim().to_lowercase()
}
