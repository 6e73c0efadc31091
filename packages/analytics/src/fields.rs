//! Typed access to play-event fields.
//!
//! Exports from different years disagree on types (`skipped` may be a
//! boolean, a string or a number) and on timestamp format, so every
//! accessor here is lenient and returns `None` rather than failing.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use stream_atlas_enrich_models::EnrichedRecord;

pub const TS: &str = "ts";
pub const MS_PLAYED: &str = "ms_played";
pub const PLATFORM: &str = "platform";
pub const ARTIST: &str = "master_metadata_album_artist_name";
pub const ALBUM: &str = "master_metadata_album_album_name";
pub const TRACK: &str = "master_metadata_track_name";
pub const SKIPPED: &str = "skipped";
pub const REASON_START: &str = "reason_start";

/// `reason_start` value for a track the listener picked directly.
pub const PICKED: &str = "clickrow";

const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Returns a non-blank string field.
pub fn text<'a>(record: &'a EnrichedRecord, name: &str) -> Option<&'a str> {
    record
        .str_field(name)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Milliseconds played, treating missing or negative values as zero.
pub fn ms_played(record: &EnrichedRecord) -> u64 {
    match record.field(MS_PLAYED) {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(round_ms))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round_ms(ms: f64) -> u64 {
    ms.round() as u64
}

/// Whether the play was skipped.
pub fn skipped(record: &EnrichedRecord) -> bool {
    match record.field(SKIPPED) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    }
}

/// Whether the listener started the track by picking it.
pub fn picked(record: &EnrichedRecord) -> bool {
    text(record, REASON_START) == Some(PICKED)
}

/// Play timestamp in UTC.
pub fn timestamp(record: &EnrichedRecord) -> Option<DateTime<Utc>> {
    let ts = text(record, TS)?;

    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return Some(dt.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(ts, format).ok())
        .map(|naive| naive.and_utc())
}

/// Device model from `platform`: the parenthesised part if present,
/// otherwise the whole platform string, otherwise `Unknown`.
pub fn device_model(record: &EnrichedRecord) -> String {
    let Some(platform) = text(record, PLATFORM) else {
        return "Unknown".to_string();
    };

    platform
        .find('(')
        .and_then(|open| {
            let rest = &platform[open + 1..];
            rest.find(')').map(|close| rest[..close].trim())
        })
        .filter(|model| !model.is_empty())
        .unwrap_or(platform)
        .to_string()
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike as _, Timelike as _};
    use serde_json::json;
    use stream_atlas_archive_models::RecordSource;

    use super::*;

    fn record(value: Value) -> EnrichedRecord {
        let Value::Object(record) = value else {
            panic!("expected object");
        };
        EnrichedRecord {
            source: RecordSource { entry: 0, index: 0 },
            record,
            address: None,
            outcome: None,
        }
    }

    #[test]
    fn parses_every_timestamp_format() {
        for ts in [
            "2023-06-01T12:30:00Z",
            "2023-06-01T12:30:00.123Z",
            "2023-06-01T14:30:00+02:00",
            "2023-06-01 12:30",
        ] {
            let dt = timestamp(&record(json!({ "ts": ts }))).unwrap();
            assert_eq!((dt.year(), dt.month(), dt.day()), (2023, 6, 1), "{ts}");
            assert_eq!(dt.hour(), 12, "{ts}");
        }
        assert!(timestamp(&record(json!({"ts": "yesterday"}))).is_none());
    }

    #[test]
    fn skipped_accepts_legacy_encodings() {
        assert!(skipped(&record(json!({"skipped": true}))));
        assert!(skipped(&record(json!({"skipped": "True"}))));
        assert!(skipped(&record(json!({"skipped": "true"}))));
        assert!(skipped(&record(json!({"skipped": 1}))));
        assert!(!skipped(&record(json!({"skipped": null}))));
        assert!(!skipped(&record(json!({"skipped": false}))));
        assert!(!skipped(&record(json!({}))));
    }

    #[test]
    fn extracts_device_model() {
        let model = |platform: Value| device_model(&record(json!({ "platform": platform })));
        assert_eq!(model(json!("iOS 16.1 (iPhone14,2)")), "iPhone14,2");
        assert_eq!(model(json!("android")), "android");
        assert_eq!(model(json!("weird ()")), "weird ()");
        assert_eq!(model(json!(null)), "Unknown");
        assert_eq!(device_model(&record(json!({}))), "Unknown");
    }

    #[test]
    fn ms_played_is_lenient() {
        assert_eq!(ms_played(&record(json!({"ms_played": 1234}))), 1234);
        assert_eq!(ms_played(&record(json!({"ms_played": 12.6}))), 13);
        assert_eq!(ms_played(&record(json!({"ms_played": "500"}))), 500);
        assert_eq!(ms_played(&record(json!({"ms_played": -5}))), 0);
        assert_eq!(ms_played(&record(json!({}))), 0);
    }
}
