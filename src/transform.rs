//! Payload sanitizer and transformer.
//!
//! The risk feed emits bare `NaN` literals in numeric fields, which no JSON
//! parser accepts. Its text is repaired first, then both payloads are
//! deserialized into typed records and sorted for publication:
//! risks by volume, signals by timestamp, both descending.

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use crate::types::{null_as_default, Payload, RiskRecord, SignalRecord, SyncError};

/// Literal the risk feed uses for missing numbers.
const NAN_TOKEN: &str = "NaN";
const NULL_TOKEN: &str = "null";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Attributes of one entry in the risk object. The symbol is the map key,
/// so it is supplied separately when building the `RiskRecord`.
#[derive(Debug, Deserialize)]
struct RiskAttributes {
    #[serde(default)]
    risk: Option<f64>,
    #[serde(default)]
    icon: Option<String>,
    #[serde(default)]
    price: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    volume: f64,
    #[serde(default, rename = "moralisLink")]
    moralis_link: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    warnings: Vec<String>,
    #[serde(default, rename = "1mChange")]
    change_1m: Option<f64>,
    #[serde(default, rename = "2wChange")]
    change_2w: Option<f64>,
    #[serde(default, rename = "3mChange")]
    change_3m: Option<f64>,
    #[serde(default, rename = "bubbleSize")]
    bubble_size: Option<f64>,
}

impl RiskAttributes {
    fn into_record(self, symbol: String) -> RiskRecord {
        RiskRecord {
            symbol,
            risk: self.risk,
            icon: self.icon,
            price: self.price,
            volume: self.volume,
            moralis_link: self.moralis_link,
            warnings: self.warnings,
            change_1m: self.change_1m,
            change_2w: self.change_2w,
            change_3m: self.change_3m,
            bubble_size: self.bubble_size,
        }
    }
}

/// Risk object entries in document order.
///
/// A repeated symbol keeps its first position and takes the later value,
/// so the committed set never holds two records for one symbol.
struct RiskEntries(Vec<(String, RiskAttributes)>);

impl<'de> Deserialize<'de> for RiskEntries {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = RiskEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an object keyed by token symbol")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries: Vec<(String, RiskAttributes)> =
                    Vec::with_capacity(map.size_hint().unwrap_or(0));
                let mut index: HashMap<String, usize> = HashMap::new();

                while let Some((symbol, attrs)) = map.next_entry::<String, RiskAttributes>()? {
                    match index.get(&symbol) {
                        Some(&i) => entries[i].1 = attrs,
                        None => {
                            index.insert(symbol.clone(), entries.len());
                            entries.push((symbol, attrs));
                        }
                    }
                }

                Ok(RiskEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

// ---------------------------------------------------------------------------
// Sanitize / parse
// ---------------------------------------------------------------------------

/// Rewrite every `NaN` token in `text` to `null`.
///
/// Applying it twice gives the same text as applying it once.
pub fn sanitize(text: &str) -> String {
    text.replace(NAN_TOKEN, NULL_TOKEN)
}

/// Sanitize and parse the risk feed, returning records sorted by volume.
pub fn parse_risks(text: &str) -> Result<Vec<RiskRecord>, SyncError> {
    let sanitized = sanitize(text);
    let RiskEntries(entries) = serde_json::from_str(&sanitized).map_err(|source| {
        SyncError::Parse {
            payload: Payload::Risks,
            source,
        }
    })?;

    let mut records: Vec<RiskRecord> = entries
        .into_iter()
        .map(|(symbol, attrs)| attrs.into_record(symbol))
        .collect();
    sort_by_volume(&mut records);

    Ok(records)
}

/// Parse the signal feed, returning signals newest first.
pub fn parse_signals(text: &str) -> Result<Vec<SignalRecord>, SyncError> {
    let mut signals: Vec<SignalRecord> =
        serde_json::from_str(text).map_err(|source| SyncError::Parse {
            payload: Payload::Signals,
            source,
        })?;
    sort_by_timestamp(&mut signals);

    Ok(signals)
}

/// Turn the two raw bodies of one cycle into publishable records.
///
/// Either both payloads parse or the whole call fails; there is no
/// partially normalized result.
pub fn normalize(
    risks_text: &str,
    signals_text: &str,
) -> Result<(Vec<RiskRecord>, Vec<SignalRecord>), SyncError> {
    let risks = parse_risks(risks_text)?;
    let signals = parse_signals(signals_text)?;

    debug!(risks = risks.len(), signals = signals.len(), "Payloads normalized");

    Ok((risks, signals))
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

/// Stable sort, highest volume first.
pub fn sort_by_volume(records: &mut [RiskRecord]) {
    records.sort_by(|a, b| b.volume.partial_cmp(&a.volume).unwrap_or(Ordering::Equal));
}

/// Stable sort, most recent first. Missing timestamps sort as 0.
pub fn sort_by_timestamp(signals: &mut [SignalRecord]) {
    signals.sort_by(|a, b| {
        b.sort_key()
            .partial_cmp(&a.sort_key())
            .unwrap_or(Ordering::Equal)
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn symbols(records: &[RiskRecord]) -> Vec<&str> {
        records.iter().map(|r| r.symbol.as_str()).collect()
    }

    // -- sanitize --

    #[test]
    fn test_sanitize_replaces_nan() {
        assert_eq!(
            sanitize(r#"{"price": NaN, "risk": NaN}"#),
            r#"{"price": null, "risk": null}"#
        );
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let inputs = [
            r#"{"A": {"price": NaN}}"#,
            r#"{"A": {"price": 1.5}}"#,
            "NaNNaN",
            "",
        ];
        for input in inputs {
            let once = sanitize(input);
            assert_eq!(sanitize(&once), once);
        }
    }

    #[test]
    fn test_sanitize_leaves_clean_text_alone() {
        let text = r#"{"BTC": {"volume": 10}}"#;
        assert_eq!(sanitize(text), text);
    }

    // -- risks --

    #[test]
    fn test_parse_risks_nan_price_becomes_none() {
        let text = r#"{"BTC": {"risk": 3, "price": NaN, "volume": 10, "warnings": []}}"#;
        let records = assert_ok!(parse_risks(text));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].symbol, "BTC");
        assert_eq!(records[0].price, None);
        assert_eq!(records[0].risk, Some(3.0));
    }

    #[test]
    fn test_parse_risks_defaults() {
        let text = r#"{"DOGE": {"risk": 5}, "SHIB": {"risk": 6, "volume": null, "warnings": null}}"#;
        let records = parse_risks(text).unwrap();
        for record in &records {
            assert_eq!(record.volume, 0.0);
            assert!(record.warnings.is_empty());
        }
    }

    #[test]
    fn test_parse_risks_all_fields() {
        let text = r#"{
            "PEPE": {
                "risk": 42.5,
                "icon": "https://cdn.example/pepe.png",
                "price": 0.0000012,
                "volume": 12345.6,
                "moralisLink": "https://moralis.example/pepe",
                "warnings": ["cycle spent 85% above 80"],
                "1mChange": -12.5,
                "2wChange": 3.0,
                "3mChange": 150.0,
                "bubbleSize": 0.7
            }
        }"#;
        let records = parse_risks(text).unwrap();
        let pepe = &records[0];
        assert_eq!(pepe.icon.as_deref(), Some("https://cdn.example/pepe.png"));
        assert_eq!(pepe.moralis_link.as_deref(), Some("https://moralis.example/pepe"));
        assert_eq!(pepe.change_1m, Some(-12.5));
        assert_eq!(pepe.change_2w, Some(3.0));
        assert_eq!(pepe.change_3m, Some(150.0));
        assert_eq!(pepe.bubble_size, Some(0.7));
        assert_eq!(pepe.warnings.len(), 1);
    }

    #[test]
    fn test_parse_risks_sorted_by_volume_desc() {
        let text = r#"{
            "LOW": {"volume": 1},
            "HIGH": {"volume": 1000},
            "NONE": {},
            "MID": {"volume": 50}
        }"#;
        let records = parse_risks(text).unwrap();
        assert_eq!(symbols(&records), vec!["HIGH", "MID", "LOW", "NONE"]);
        assert!(records.windows(2).all(|w| w[0].volume >= w[1].volume));
    }

    #[test]
    fn test_parse_risks_ties_keep_document_order() {
        let text = r#"{"ZED": {"volume": 5}, "ALPHA": {"volume": 5}, "MID": {"volume": 5}}"#;
        let records = parse_risks(text).unwrap();
        assert_eq!(symbols(&records), vec!["ZED", "ALPHA", "MID"]);
    }

    #[test]
    fn test_parse_risks_duplicate_symbol_last_value_wins() {
        let text = r#"{"BTC": {"volume": 1}, "ETH": {"volume": 2}, "BTC": {"volume": 3}}"#;
        let records = parse_risks(text).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(symbols(&records), vec!["BTC", "ETH"]);
        assert_eq!(records[0].volume, 3.0);
    }

    #[test]
    fn test_parse_risks_rejects_array_root() {
        let err = parse_risks(r#"[{"symbol": "BTC"}]"#).unwrap_err();
        assert!(matches!(err, SyncError::Parse { payload: Payload::Risks, .. }));
    }

    #[test]
    fn test_parse_risks_rejects_bad_shape() {
        let err = parse_risks(r#"{"BTC": {"volume": "lots"}}"#).unwrap_err();
        assert!(matches!(err, SyncError::Parse { .. }));

        let err = parse_risks(r#"{"BTC": {"warnings": [1, 2]}}"#).unwrap_err();
        assert!(matches!(err, SyncError::Parse { .. }));
    }

    #[test]
    fn test_parse_risks_rejects_garbage() {
        let err = parse_risks("<html>502 Bad Gateway</html>").unwrap_err();
        assert!(err.to_string().contains("risks"));
    }

    #[test]
    fn test_parse_risks_empty_object() {
        assert!(parse_risks("{}").unwrap().is_empty());
    }

    // -- signals --

    #[test]
    fn test_parse_signals_sorted_newest_first() {
        let text = r#"[
            {"symbol": "A", "description": "old", "timestamp": 100, "risks": []},
            {"symbol": "B", "description": "none", "risks": []},
            {"symbol": "C", "description": "new", "timestamp": 300, "risks": ["x"]},
            {"symbol": "D", "description": "mid", "timestamp": 200, "risks": []}
        ]"#;
        let signals = parse_signals(text).unwrap();
        let order: Vec<_> = signals.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(order, vec!["C", "D", "A", "B"]);
    }

    #[test]
    fn test_parse_signals_ties_keep_payload_order() {
        // A missing timestamp counts as 0 and ties with an explicit 0.
        let text = r#"[
            {"symbol": "A", "description": "none", "risks": []},
            {"symbol": "B", "description": "zero", "timestamp": 0, "risks": []},
            {"symbol": "C", "description": "new", "timestamp": 5, "risks": []},
            {"symbol": "D", "description": "none", "risks": []},
            {"symbol": "E", "description": "new too", "timestamp": 5, "risks": []}
        ]"#;
        let signals = parse_signals(text).unwrap();
        let order: Vec<_> = signals.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(order, vec!["C", "E", "A", "B", "D"]);
    }

    #[test]
    fn test_parse_signals_rejects_object_root() {
        let err = parse_signals(r#"{"symbol": "A"}"#).unwrap_err();
        assert!(matches!(err, SyncError::Parse { payload: Payload::Signals, .. }));
    }

    #[test]
    fn test_parse_signals_not_sanitized() {
        let text = r#"[{"symbol": "A", "description": "d", "timestamp": NaN}]"#;
        assert_err!(parse_signals(text));
    }

    // -- normalize --

    #[test]
    fn test_normalize_both_payloads() {
        let (risks, signals) = normalize(
            r#"{"BTC": {"volume": 100}, "ETH": {"volume": 50}}"#,
            r#"[{"symbol": "BTC", "description": "up", "timestamp": 1, "risks": []}]"#,
        )
        .unwrap();
        assert_eq!(risks.len(), 2);
        assert_eq!(signals.len(), 1);
    }

    #[test]
    fn test_normalize_fails_whole_on_signal_error() {
        let result = normalize(r#"{"BTC": {"volume": 100}}"#, "not json");
        assert!(matches!(
            result,
            Err(SyncError::Parse { payload: Payload::Signals, .. })
        ));
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let risks = r#"{"A": {"volume": 2}, "B": {"volume": 2}, "C": {"volume": 9}}"#;
        let signals = r#"[{"symbol": "A", "description": "x"}, {"symbol": "B", "description": "y"}]"#;
        let first = normalize(risks, signals).unwrap();
        let second = normalize(risks, signals).unwrap();
        assert_eq!(first, second);
    }
}
