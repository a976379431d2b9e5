//! Shared types for the RISKPULSE engine.
//!
//! These types form the data model published to consumers. Field names
//! on the wire follow the upstream feed (`moralisLink`, `1mChange`, ...)
//! so a snapshot can be handed to a frontend without remapping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Risk records
// ---------------------------------------------------------------------------

/// One token entry from the risk feed, keyed by `symbol`.
///
/// Built from the feed by `transform::parse_risks`; only serialized here.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskRecord {
    pub symbol: String,
    pub risk: Option<f64>,
    pub icon: Option<String>,
    pub price: Option<f64>,
    /// 0 when the feed omits it or sends `null`.
    pub volume: f64,
    #[serde(rename = "moralisLink")]
    pub moralis_link: Option<String>,
    /// Never absent once committed; an omitted list becomes empty.
    pub warnings: Vec<String>,
    #[serde(rename = "1mChange")]
    pub change_1m: Option<f64>,
    #[serde(rename = "2wChange")]
    pub change_2w: Option<f64>,
    #[serde(rename = "3mChange")]
    pub change_3m: Option<f64>,
    #[serde(rename = "bubbleSize")]
    pub bubble_size: Option<f64>,
}

impl RiskRecord {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Helper to build a test record with the fields the filter cares about.
    #[cfg(test)]
    pub fn sample(symbol: &str, volume: f64, warnings: &[&str]) -> Self {
        RiskRecord {
            symbol: symbol.to_string(),
            risk: Some(1.0),
            icon: None,
            price: Some(1.0),
            volume,
            moralis_link: None,
            warnings: warnings.iter().map(|w| w.to_string()).collect(),
            change_1m: None,
            change_2w: None,
            change_3m: None,
            bubble_size: None,
        }
    }
}

impl fmt::Display for RiskRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (vol: {:.0}", self.symbol, self.volume)?;
        if let Some(risk) = self.risk {
            write!(f, " | risk: {risk:.1}")?;
        }
        write!(f, " | warnings: {})", self.warnings.len())
    }
}

// ---------------------------------------------------------------------------
// Signal records
// ---------------------------------------------------------------------------

/// A buy/sell signal from the signal feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub symbol: String,
    pub description: String,
    /// Epoch-like value; `None` sorts as 0.
    #[serde(default)]
    pub timestamp: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub risks: Vec<String>,
    /// Any other properties the feed sends, passed through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SignalRecord {
    pub fn sort_key(&self) -> f64 {
        self.timestamp.unwrap_or(0.0)
    }
}

// ---------------------------------------------------------------------------
// Filter settings
// ---------------------------------------------------------------------------

/// User-toggleable exclusion rules. All off by default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterSettings {
    pub skip_potential_traps: bool,
    pub avoid_overhyped_tokens: bool,
    pub market_cap_filter: bool,
}

impl FilterSettings {
    pub fn any_active(&self) -> bool {
        self.skip_potential_traps || self.avoid_overhyped_tokens || self.market_cap_filter
    }

    /// Overlay `patch` on top of these settings. Unset toggles keep their value.
    pub fn merge(&self, patch: &FilterPatch) -> Self {
        FilterSettings {
            skip_potential_traps: patch.skip_potential_traps.unwrap_or(self.skip_potential_traps),
            avoid_overhyped_tokens: patch
                .avoid_overhyped_tokens
                .unwrap_or(self.avoid_overhyped_tokens),
            market_cap_filter: patch.market_cap_filter.unwrap_or(self.market_cap_filter),
        }
    }
}

/// A partial update to [`FilterSettings`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_potential_traps: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avoid_overhyped_tokens: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap_filter: Option<bool>,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Everything a consumer can read from the engine at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSnapshot {
    /// Risk records, descending by volume.
    pub data: Vec<RiskRecord>,
    /// Signals, descending by timestamp.
    pub signals: Vec<SignalRecord>,
    /// `data` with the active filters applied. Never mutated on its own.
    pub filtered_data: Vec<RiskRecord>,
    pub loading: bool,
    pub error: Option<String>,
    pub filters: FilterSettings,
    /// Time of the last successful commit.
    pub last_updated: Option<DateTime<Utc>>,
    /// Completed cycles, successful or not.
    pub cycles: u64,
}

impl SyncSnapshot {
    /// The state before the first cycle completes.
    pub fn initial() -> Self {
        SyncSnapshot {
            data: Vec::new(),
            signals: Vec::new(),
            filtered_data: Vec::new(),
            loading: true,
            error: None,
            filters: FilterSettings::default(),
            last_updated: None,
            cycles: 0,
        }
    }
}

impl Default for SyncSnapshot {
    fn default() -> Self {
        Self::initial()
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Which upstream payload a parse failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    Risks,
    Signals,
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Risks => write!(f, "risks"),
            Payload::Signals => write!(f, "signals"),
        }
    }
}

/// A single failed request attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error! status: {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors surfaced by the sync engine.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("network error fetching {url} after {attempts} attempt(s): {source}")]
    Network {
        url: String,
        attempts: u32,
        #[source]
        source: FetchError,
    },

    #[error("failed to parse {payload} payload: {source}")]
    Parse {
        payload: Payload,
        #[source]
        source: serde_json::Error,
    },

    #[error("sync engine state accessed outside its active scope")]
    Scope,
}

impl SyncError {
    pub fn is_scope(&self) -> bool {
        matches!(self, SyncError::Scope)
    }
}

// ---------------------------------------------------------------------------
// Serde helpers
// ---------------------------------------------------------------------------

/// Treat an explicit `null` the same as a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
