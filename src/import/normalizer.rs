//! Row normalization
//!
//! Maps loosely-typed CSV rows onto [`TelecomActivity`] records. Source files
//! use wildly different column naming conventions, so every canonical field
//! carries an ordered list of acceptable column names and a typed default.
//! Coercion never fails: a well-formed-but-incomplete row always yields a
//! record, and only rows with no usable content at all are dropped.

use std::collections::HashMap;

use chrono::Utc;
use rand::Rng;

use crate::import::timestamp;
use crate::models::{ActivityType, TelecomActivity};

/// Provenance tag stamped on every record produced by this pipeline
pub const IMPORT_SOURCE: &str = "csv_import";

const ID_ALIASES: &[&str] = &["id"];
const USER_ID_ALIASES: &[&str] = &["user_id", "userId", "phone_number", "phoneNumber"];
const TYPE_ALIASES: &[&str] = &["activity_type", "type", "call_type"];
const TIMESTAMP_ALIASES: &[&str] = &["timestamp", "date", "call_date"];
const DURATION_ALIASES: &[&str] = &["duration", "duration_sec", "call_duration"];
const LOCATION_ALIASES: &[&str] = &["location", "city", "region"];
const NETWORK_ALIASES: &[&str] = &["network_type", "network"];
const PEER_ALIASES: &[&str] = &["peer_number", "called_number", "recipient"];
const ROAMING_ALIASES: &[&str] = &["is_roaming", "roaming"];
const FRAUD_ALIASES: &[&str] = &["is_spam", "is_fraud", "spam", "fraud"];
const DATA_USAGE_ALIASES: &[&str] = &["data_usage", "data_mb"];
const COST_ALIASES: &[&str] = &["cost", "charge"];

/// Normalize one parsed CSV row into a canonical record.
///
/// Returns `None` only when the row carries no usable content; such rows are
/// counted by the caller and silently excluded from the batch.
pub fn normalize(row: &HashMap<String, String>) -> Option<TelecomActivity> {
    if row.values().all(|v| v.trim().is_empty()) {
        return None;
    }

    let id = field(row, ID_ALIASES)
        .map(str::to_string)
        .unwrap_or_else(generate_id);

    let user_id = field(row, USER_ID_ALIASES).unwrap_or("unknown").to_string();

    let activity_type = field(row, TYPE_ALIASES)
        .map(infer_activity_type)
        .unwrap_or(ActivityType::Call);

    let timestamp = match field(row, TIMESTAMP_ALIASES) {
        Some(raw) => timestamp::resolve(raw),
        None => Utc::now(),
    };

    Some(TelecomActivity {
        id,
        user_id,
        activity_type,
        timestamp,
        duration_sec: parse_u32(field(row, DURATION_ALIASES)),
        location: field(row, LOCATION_ALIASES).unwrap_or("Unknown").to_string(),
        network_type: field(row, NETWORK_ALIASES).unwrap_or("4G").to_string(),
        peer_number: field(row, PEER_ALIASES).unwrap_or("unknown").to_string(),
        is_roaming: field(row, ROAMING_ALIASES).map(parse_flag).unwrap_or(false),
        is_spam_or_fraud: field(row, FRAUD_ALIASES).map(parse_flag).unwrap_or(false),
        data_usage_mb: parse_f64(field(row, DATA_USAGE_ALIASES)),
        cost: parse_f64(field(row, COST_ALIASES)),
        source: IMPORT_SOURCE.to_string(),
    })
}

/// First present, non-empty value under any of the field's aliases
fn field<'a>(row: &'a HashMap<String, String>, aliases: &[&str]) -> Option<&'a str> {
    for name in aliases {
        if let Some(value) = row.get(*name) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed);
            }
        }
    }
    None
}

/// Classify a free-text type column. Matched in priority order; anything
/// unrecognized counts as a call.
pub fn infer_activity_type(raw: &str) -> ActivityType {
    let value = raw.trim().to_lowercase();
    if value.contains("call") || value == "voice" {
        ActivityType::Call
    } else if value.contains("sms") || value == "text" {
        ActivityType::Sms
    } else if value.contains("data") || value == "internet" {
        ActivityType::Data
    } else {
        ActivityType::Call
    }
}

/// Truthy-text coercion: exactly {"true", "1", "yes"}, case-insensitive and
/// trimmed, map to true. Everything else is false.
pub fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}

fn parse_u32(raw: Option<&str>) -> u32 {
    raw.and_then(|v| v.parse().ok()).unwrap_or(0)
}

fn parse_f64(raw: Option<&str>) -> f64 {
    raw.and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
        .unwrap_or(0.0)
}

/// Time-based id with a random base36 suffix. Best-effort uniqueness, matches
/// the id format of records that arrive without one.
fn generate_id() -> String {
    const CHARSET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect();
    format!("csv_{}_{}", Utc::now().timestamp_millis(), suffix)
}
