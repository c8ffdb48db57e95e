//! Raw vault record normalization.
//!
//! Every logical field is resolved by first-match-wins over an ordered list of
//! candidate keys. A candidate that is null or does not parse as a number is
//! treated as missing and the next candidate is tried.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

pub type VaultRecord = Map<String, Value>;

pub const NAME_KEYS: [&str; 2] = ["vaultName", "name"];
pub const APR_KEYS: [&str; 7] = [
    "apr",
    "apy",
    "apr30d",
    "aprTrailing",
    "annualizedReturn",
    "currentApr",
    "roiTrailing",
];
pub const TVL_KEYS: [&str; 3] = ["tvl", "totalDeposits", "tvlUsd"];
pub const CREATED_AT_KEYS: [&str; 5] = [
    "createTimeMillis",
    "createdTs",
    "createdTime",
    "startTimestamp",
    "createdAt",
];

pub const UNKNOWN_NAME: &str = "Unknown";
const LEADER_SUFFIX_CHARS: usize = 6;
const MILLIS_THRESHOLD: f64 = 1e12;
const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedVaultRow {
    pub name: String,
    pub leader: Option<String>,
    pub vault_address: Option<String>,
    pub apr_percent: f64,
    pub tvl_usd: f64,
    pub age_days: Option<f64>,
    pub is_closed: bool,
    pub raw: VaultRecord,
}

pub fn normalize_vaults(raw: &[Value], now_ms: i64) -> Vec<NormalizedVaultRow> {
    raw.iter()
        .enumerate()
        .filter_map(|(idx, value)| match value.as_object() {
            Some(record) => Some(normalize_record(record, now_ms)),
            None => {
                warn!(
                    component = "normalize",
                    event = "normalize.record.skipped",
                    index = idx,
                    kind = json_kind(value)
                );
                None
            }
        })
        .collect()
}

pub fn normalize_record(record: &VaultRecord, now_ms: i64) -> NormalizedVaultRow {
    let leader = lookup(record, "leader")
        .and_then(Value::as_str)
        .map(str::to_string);

    NormalizedVaultRow {
        name: display_name(record, leader.as_deref()),
        vault_address: lookup(record, "vaultAddress")
            .and_then(Value::as_str)
            .map(str::to_string),
        apr_percent: apr_percent(record),
        tvl_usd: tvl_usd(record),
        age_days: age_days(record, now_ms),
        is_closed: lookup(record, "isClosed")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        leader,
        raw: record.clone(),
    }
}

/// Looks the key up on the record itself, then on a nested `summary` object
/// as served by the bulk snapshot.
pub fn lookup<'a>(record: &'a VaultRecord, key: &str) -> Option<&'a Value> {
    match record.get(key) {
        Some(Value::Null) | None => record
            .get("summary")
            .and_then(Value::as_object)
            .and_then(|summary| summary.get(key))
            .filter(|value| !value.is_null()),
        Some(value) => Some(value),
    }
}

pub fn has_apr_candidate(record: &VaultRecord) -> bool {
    first_number(record, &APR_KEYS, parse_plain_number).is_some()
}

fn display_name(record: &VaultRecord, leader: Option<&str>) -> String {
    NAME_KEYS
        .iter()
        .filter_map(|key| lookup(record, key).and_then(Value::as_str))
        .map(str::trim)
        .find(|name| !name.is_empty())
        .map(str::to_string)
        .or_else(|| leader.and_then(leader_suffix))
        .unwrap_or_else(|| UNKNOWN_NAME.to_string())
}

fn leader_suffix(leader: &str) -> Option<String> {
    let chars: Vec<char> = leader.chars().collect();
    if chars.is_empty() {
        return None;
    }
    let start = chars.len().saturating_sub(LEADER_SUFFIX_CHARS);
    Some(chars[start..].iter().collect())
}

fn apr_percent(record: &VaultRecord) -> f64 {
    match first_number(record, &APR_KEYS, parse_plain_number) {
        Some(value) if (0.0..=1.0).contains(&value) => value * 100.0,
        Some(value) => value,
        None => 0.0,
    }
}

fn tvl_usd(record: &VaultRecord) -> f64 {
    first_number(record, &TVL_KEYS, parse_loose_number).unwrap_or(0.0)
}

fn age_days(record: &VaultRecord, now_ms: i64) -> Option<f64> {
    let created_s = CREATED_AT_KEYS
        .iter()
        .filter_map(|key| lookup(record, key))
        .find_map(timestamp_seconds)?;
    let now_s = now_ms as f64 / 1_000.0;
    Some((now_s - created_s) / SECONDS_PER_DAY)
}

fn timestamp_seconds(value: &Value) -> Option<f64> {
    let raw = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => {
            let trimmed = text.trim();
            match trimmed.parse::<f64>() {
                Ok(parsed) => parsed,
                Err(_) => {
                    return DateTime::parse_from_rfc3339(trimmed)
                        .ok()
                        .map(|dt| dt.timestamp_millis() as f64 / 1_000.0)
                }
            }
        }
        _ => return None,
    };

    // Zero and non-finite timestamps carry no creation time.
    if raw == 0.0 || !raw.is_finite() {
        return None;
    }
    if raw > MILLIS_THRESHOLD {
        Some(raw / 1_000.0)
    } else {
        Some(raw)
    }
}

fn first_number(
    record: &VaultRecord,
    keys: &[&str],
    parse_str: fn(&str) -> Option<f64>,
) -> Option<f64> {
    keys.iter()
        .filter_map(|key| lookup(record, key))
        .find_map(|value| match value {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => parse_str(text),
            _ => None,
        }
        .filter(|value| value.is_finite()))
}

fn parse_plain_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok()
}

// Drops currency symbols, separators and words; `e`/`E` survives only as an
// exponent marker between digits.
fn parse_loose_number(text: &str) -> Option<f64> {
    let chars: Vec<char> = text.chars().collect();
    let mut cleaned = String::with_capacity(chars.len());

    for (idx, &c) in chars.iter().enumerate() {
        let keep = match c {
            '0'..='9' | '.' | '-' => true,
            'e' | 'E' => is_exponent_marker(&chars, idx),
            '+' => idx > 0 && is_exponent_marker(&chars, idx - 1),
            _ => false,
        };
        if keep {
            cleaned.push(c);
        }
    }

    cleaned.parse::<f64>().ok()
}

fn is_exponent_marker(chars: &[char], idx: usize) -> bool {
    if !matches!(chars[idx], 'e' | 'E') {
        return false;
    }
    let after_digit = idx > 0 && chars[idx - 1].is_ascii_digit();
    let exponent_follows = match chars.get(idx + 1) {
        Some(c) if c.is_ascii_digit() => true,
        Some('+' | '-') => chars.get(idx + 2).is_some_and(char::is_ascii_digit),
        _ => false,
    };
    after_digit && exponent_follows
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW_MS: i64 = 1_760_000_000_000;
    const HOUR_MS: i64 = 3_600_000;

    fn record(value: Value) -> VaultRecord {
        value.as_object().cloned().expect("test record must be an object")
    }

    #[test]
    fn fractional_apr_and_decorated_tvl_are_converted() {
        let row = normalize_record(
            &record(json!({
                "apr": 0.12,
                "tvl": "$5,808",
                "createTimeMillis": NOW_MS - 12 * HOUR_MS
            })),
            NOW_MS,
        );

        assert!((row.apr_percent - 12.0).abs() < 1e-9);
        assert_eq!(row.tvl_usd, 5808.0);
        assert!((row.age_days.unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn apr_outside_unit_interval_is_used_as_is() {
        let cases = [(1.5, 1.5), (-0.2, -0.2), (35.0, 35.0), (1.0, 100.0), (0.0, 0.0)];
        for (input, expected) in cases {
            let row = normalize_record(&record(json!({ "apr": input })), NOW_MS);
            assert!(
                (row.apr_percent - expected).abs() < 1e-9,
                "apr {input} normalized to {}",
                row.apr_percent
            );
        }
    }

    #[test]
    fn apr_falls_through_unparseable_candidates_in_order() {
        let row = normalize_record(
            &record(json!({ "apr": "n/a", "apy": null, "apr30d": "0.25", "currentApr": 9 })),
            NOW_MS,
        );
        assert!((row.apr_percent - 25.0).abs() < 1e-9);

        let row = normalize_record(&record(json!({ "roiTrailing": 42 })), NOW_MS);
        assert_eq!(row.apr_percent, 42.0);

        let row = normalize_record(&record(json!({ "name": "no apr" })), NOW_MS);
        assert_eq!(row.apr_percent, 0.0);
    }

    #[test]
    fn tvl_defaults_to_zero_when_every_candidate_is_missing() {
        for raw in [
            json!({}),
            json!({ "tvl": null }),
            json!({ "tvl": "n/a", "totalDeposits": [] }),
        ] {
            let row = normalize_record(&record(raw), NOW_MS);
            assert_eq!(row.tvl_usd, 0.0);
        }
    }

    #[test]
    fn tvl_candidates_are_tried_in_order() {
        let row = normalize_record(
            &record(json!({ "totalDeposits": 1234.5, "tvlUsd": 99 })),
            NOW_MS,
        );
        assert_eq!(row.tvl_usd, 1234.5);

        let row = normalize_record(&record(json!({ "tvlUsd": "USD 7,000.25" })), NOW_MS);
        assert_eq!(row.tvl_usd, 7000.25);

        for (raw, expected) in [
            ("$5,808", 5808.0),
            ("$5,808 est.", 5808.0),
            ("5,808 USDe", 5808.0),
            ("1.5e6", 1_500_000.0),
            ("2E+3 USD", 2000.0),
        ] {
            let row = normalize_record(&record(json!({ "tvl": raw })), NOW_MS);
            assert_eq!(row.tvl_usd, expected, "tvl {raw:?}");
        }
    }

    #[test]
    fn explicit_zero_is_a_present_value() {
        let row = normalize_record(
            &record(json!({ "apr": 0, "apy": 0.5, "tvl": 0, "totalDeposits": 10 })),
            NOW_MS,
        );
        assert_eq!(row.apr_percent, 0.0);
        assert_eq!(row.tvl_usd, 0.0);
    }

    #[test]
    fn age_handles_seconds_millis_and_rfc3339() {
        let two_days_s = (NOW_MS / 1_000) - 2 * 86_400;
        let row = normalize_record(&record(json!({ "createdTs": two_days_s })), NOW_MS);
        assert!((row.age_days.unwrap() - 2.0).abs() < 1e-9);

        let row = normalize_record(
            &record(json!({ "startTimestamp": (NOW_MS - 24 * HOUR_MS).to_string() })),
            NOW_MS,
        );
        assert!((row.age_days.unwrap() - 1.0).abs() < 1e-9);

        let created = chrono::DateTime::from_timestamp_millis(NOW_MS - 72 * HOUR_MS)
            .unwrap()
            .to_rfc3339();
        let row = normalize_record(&record(json!({ "createdAt": created })), NOW_MS);
        assert!((row.age_days.unwrap() - 3.0).abs() < 1e-6);
    }

    #[test]
    fn age_is_absent_without_timestamp_and_zero_timestamp_falls_through() {
        let row = normalize_record(&record(json!({ "name": "x" })), NOW_MS);
        assert_eq!(row.age_days, None);

        let row = normalize_record(
            &record(json!({ "createTimeMillis": 0, "createdTime": "garbage" })),
            NOW_MS,
        );
        assert_eq!(row.age_days, None);
    }

    #[test]
    fn name_prefers_display_name_then_leader_suffix_then_placeholder() {
        let row = normalize_record(
            &record(json!({ "vaultName": "  ", "name": "Growi HF", "leader": "0xabcdef123456" })),
            NOW_MS,
        );
        assert_eq!(row.name, "Growi HF");

        let row = normalize_record(&record(json!({ "leader": "0xabcdef123456" })), NOW_MS);
        assert_eq!(row.name, "123456");
        assert_eq!(row.leader.as_deref(), Some("0xabcdef123456"));

        let row = normalize_record(&record(json!({ "leader": "0x1" })), NOW_MS);
        assert_eq!(row.name, "0x1");

        let row = normalize_record(&record(json!({ "leader": 7 })), NOW_MS);
        assert_eq!(row.name, UNKNOWN_NAME);
        assert_eq!(row.leader, None);
    }

    #[test]
    fn snapshot_summary_fields_are_resolved() {
        let row = normalize_record(
            &record(json!({
                "apr": 0.3,
                "summary": {
                    "name": "HLP",
                    "vaultAddress": "0xdfc24b077bc1425ad1dea75bcb6f8158e10df303",
                    "leader": "0x677d831aef5328190852e24f13c46cac05f984e7",
                    "tvl": "123.5",
                    "isClosed": true,
                    "createTimeMillis": NOW_MS - 48 * HOUR_MS
                }
            })),
            NOW_MS,
        );

        assert_eq!(row.name, "HLP");
        assert!((row.apr_percent - 30.0).abs() < 1e-9);
        assert_eq!(row.tvl_usd, 123.5);
        assert!(row.is_closed);
        assert!((row.age_days.unwrap() - 2.0).abs() < 1e-9);
        assert_eq!(
            row.vault_address.as_deref(),
            Some("0xdfc24b077bc1425ad1dea75bcb6f8158e10df303")
        );
    }

    #[test]
    fn raw_record_is_retained_and_non_objects_are_skipped() {
        let raw = vec![json!({ "name": "a", "extra": [1, 2] }), json!("junk"), json!(null)];
        let rows = normalize_vaults(&raw, NOW_MS);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].raw, record(raw[0].clone()));
    }

    #[test]
    fn empty_input_yields_empty_rows() {
        assert!(normalize_vaults(&[], NOW_MS).is_empty());
    }
}
