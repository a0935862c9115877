//! Date-time parsing for string timestamps.

use chrono::{DateTime, NaiveDateTime};

/// Layouts tried, in order, when no explicit format is configured
const FALLBACK_LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Parse a string into a UTC date-time.
///
/// With a chrono `format` the string must match it exactly. Without one, RFC3339
/// is tried first, then a few common layouts without an offset.
pub fn parse_datetime(s: &str, format: Option<&str>) -> Result<NaiveDateTime, String> {
    if let Some(fmt) = format {
        return NaiveDateTime::parse_from_str(s, fmt).map_err(|e| e.to_string());
    }
    match DateTime::parse_from_rfc3339(s) {
        Ok(dt) => Ok(dt.naive_utc()),
        Err(rfc_err) => FALLBACK_LAYOUTS
            .iter()
            .find_map(|layout| NaiveDateTime::parse_from_str(s, layout).ok())
            .ok_or_else(|| rfc_err.to_string()),
    }
}
