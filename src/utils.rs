//! Helpers for ids, timestamps and client addresses

use chrono::{DateTime, NaiveDateTime, Utc};
use uuid::Uuid;

/// Wire format of event timestamps: UTC, millisecond precision
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Generate a unique id (UUID v4)
///
/// Used for event ids and per-send deduplication tokens.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Render a timestamp in [`TIMESTAMP_FORMAT`]
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a timestamp rendered by [`format_timestamp`]
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).map(|naive| naive.and_utc())
}

/// Serde adapter for the fixed timestamp format
pub mod timestamp_format {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}

/// Case-insensitive header lookup over raw (name, value) pairs
///
/// Returns the first non-blank value.
pub fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .filter(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.trim())
        .find(|value| !value.is_empty())
}

/// Resolve the client address, handling proxies
///
/// Checks in this order:
/// 1. First entry of X-Forwarded-For (if non-blank)
/// 2. X-Real-IP
/// 3. The transport-level peer address
pub fn extract_ip(headers: &[(String, String)], peer_addr: Option<&str>) -> Option<String> {
    if let Some(forwarded) = header_value(headers, "x-forwarded-for") {
        if let Some(ip) = forwarded.split(',').map(str::trim).find(|ip| !ip.is_empty()) {
            return Some(ip.to_string());
        }
    }

    if let Some(ip) = header_value(headers, "x-real-ip") {
        return Some(ip.to_string());
    }

    peer_addr.map(|s| s.to_string())
}
