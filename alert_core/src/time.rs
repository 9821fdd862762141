use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use chrono_tz::Tz;

pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const MINUTE_KEY_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Parses an RFC 3339 timestamp. Empty or malformed input yields `None`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

pub fn floor_to_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    t.duration_trunc(TimeDelta::minutes(1)).unwrap_or(t)
}

pub fn minute_key(t: DateTime<Utc>) -> String {
    floor_to_minute(t).format(MINUTE_KEY_FORMAT).to_string()
}

/// Strict "happened before" over raw timestamps.
///
/// An unparseable `a` is never before anything, so it can never win an
/// earliest-event selection. A parseable `a` is before an unparseable `b`.
pub fn is_before(a: &str, b: &str) -> bool {
    match (parse_timestamp(a), parse_timestamp(b)) {
        (Some(a), Some(b)) => a < b,
        (Some(_), None) => true,
        (None, _) => false,
    }
}

/// `raw (local wall time)` when the timestamp parses, otherwise `raw` as is.
pub fn display_in_zone(raw: &str, tz: Tz) -> String {
    match parse_timestamp(raw) {
        Some(t) => format!("{raw} ({})", t.with_timezone(&tz).format(DISPLAY_FORMAT)),
        None => raw.to_string(),
    }
}
