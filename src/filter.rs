//! Warning-based record filter.
//!
//! Each toggle in [`FilterSettings`] excludes records carrying a warning
//! that matches its phrase (case-insensitive substring). Records without
//! warnings always pass.

use crate::types::{FilterSettings, RiskRecord};

/// `skip_potential_traps`: the token's cycle is heading down.
const FALLING_CYCLE: &str = "cycle is falling";
/// `avoid_overhyped_tokens`: both phrases must appear in one warning.
const SPENT_CYCLE: &str = "cycle spent";
const ABOVE_80: &str = "above 80";
/// `market_cap_filter`: the token has failed a cycle before.
const FAILED_CYCLE: &str = "cycle has previously failed";

fn is_potential_trap(warning: &str) -> bool {
    warning.contains(FALLING_CYCLE)
}

fn is_overhyped(warning: &str) -> bool {
    warning.contains(SPENT_CYCLE) && warning.contains(ABOVE_80)
}

fn has_failed_before(warning: &str) -> bool {
    warning.contains(FAILED_CYCLE)
}

/// Whether `record` survives every active toggle in `settings`.
pub fn passes(record: &RiskRecord, settings: &FilterSettings) -> bool {
    if !record.has_warnings() {
        return true;
    }

    let lowered: Vec<String> = record.warnings.iter().map(|w| w.to_lowercase()).collect();
    let any = |pred: fn(&str) -> bool| lowered.iter().any(|w| pred(w));

    if settings.skip_potential_traps && any(is_potential_trap) {
        return false;
    }
    if settings.avoid_overhyped_tokens && any(is_overhyped) {
        return false;
    }
    if settings.market_cap_filter && any(has_failed_before) {
        return false;
    }

    true
}

/// Derive the filtered view of `records` under `settings`.
///
/// Pure: the output is a subsequence of `records` in the same order.
/// With no toggle active the input is returned as is.
pub fn derive_filtered(records: &[RiskRecord], settings: &FilterSettings) -> Vec<RiskRecord> {
    if !settings.any_active() {
        return records.to_vec();
    }

    records
        .iter()
        .filter(|r| passes(r, settings))
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
