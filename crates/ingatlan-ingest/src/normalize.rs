//! Field normalization
//!
//! Canonicalizes raw source keys into entity attribute names and coerces
//! the handful of typed values the schema cares about. Everything here is
//! a pure function from one raw record to one normalized record.

use chrono::NaiveDate;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::schema::Row;

// Word-boundary heuristic, two passes: break before an uppercase letter
// that starts a new word, then before an uppercase letter directly after
// a lowercase letter or digit. Downstream renames depend on the exact
// output of this pair, so the patterns are not to be "simplified".
static BOUNDARY_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(.)([A-Z][a-z]+)").expect("static pattern"));
static BOUNDARY_TAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("static pattern"));

/// Source fields the normalizer drops outright before anything else looks
/// at them. The site exposes these on the wire but no entity declares them.
pub const DROPPED_RAW_FIELDS: &[&str] = &["minimumRentalPeriodMonth"];

/// Renames applied after the heuristic, for names where the generic rule
/// would diverge from the canonical schema.
pub const OVERRIDES: &[(&str, &str)] = &[
    // `type` is a reserved-ish name half the tooling chokes on
    ("type", "offer_type"),
];

/// Convert a mixed-case compound identifier to lower snake case.
///
/// "sellerId" → "seller_id", "areaSize" → "area_size",
/// "getHTTPResponseCode" → "get_http_response_code".
pub fn camel_to_snake(name: &str) -> String {
    let pass1 = BOUNDARY_WORD.replace_all(name, "${1}_${2}");
    BOUNDARY_TAIL
        .replace_all(&pass1, "${1}_${2}")
        .to_lowercase()
}

/// Canonicalize a key: heuristic first, then the override table.
pub fn canonical_key(name: &str) -> String {
    let snake = camel_to_snake(name);
    for (from, to) in OVERRIDES {
        if snake == *from {
            return (*to).to_string();
        }
    }
    snake
}

/// Canonicalize every key of a raw record.
pub fn normalize_keys(raw: &Row) -> Row {
    raw.iter()
        .map(|(k, v)| (canonical_key(k), v.clone()))
        .collect()
}

/// Snake-case every key without the override table. The overrides are
/// structural subject-level renames; child sub-documents keep their own
/// names (`parking.type` stays `type`).
pub fn snake_keys(raw: &Row) -> Row {
    raw.iter()
        .map(|(k, v)| (camel_to_snake(k), v.clone()))
        .collect()
}

/// Parse a date-like value leniently. Bad values coerce to null rather
/// than erroring; bad shape is someone else's problem (the validator's).
pub fn coerce_datetime(value: &Value) -> Value {
    let Some(text) = value.as_str() else {
        return Value::Null;
    };
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(text) {
        return Value::String(dt.naive_utc().to_string());
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Value::String(dt.to_string());
    }
    if let Ok(d) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        if let Some(dt) = d.and_hms_opt(0, 0, 0) {
            return Value::String(dt.to_string());
        }
    }
    Value::Null
}

/// Normalize one raw subject record into its canonical shape.
///
/// Drops the known-unparsed raw fields, flattens the nested `property`
/// object one level into sibling columns, canonicalizes every key, and
/// coerces `available_from` to a datetime (failures become null).
pub fn normalize_subject(raw: &Row) -> Row {
    let mut flat = Row::new();
    for (key, value) in raw {
        if DROPPED_RAW_FIELDS.contains(&key.as_str()) {
            continue;
        }
        if key == "property" {
            if let Value::Object(inner) = value {
                for (inner_key, inner_value) in inner {
                    flat.insert(inner_key.clone(), inner_value.clone());
                }
            }
            continue;
        }
        flat.insert(key.clone(), value.clone());
    }

    let mut normalized = normalize_keys(&flat);
    if let Some(value) = normalized.get("available_from") {
        let coerced = coerce_datetime(value);
        normalized.insert("available_from".to_string(), coerced);
    }
    normalized
}
