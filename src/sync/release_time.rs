//! Parsing chapter release times published by sources.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::source::ChapterItem;

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];

/// Parses a release time into epoch milliseconds.
///
/// Accepts RFC 3339 timestamps and the common date(-time) layouts sources
/// emit. Times without an offset are read as UTC. Unparseable text and
/// instants at or before the epoch yield `None`.
#[must_use]
pub fn parse_release_time(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let millis = DateTime::parse_from_rfc3339(text)
        .map(|parsed| parsed.timestamp_millis())
        .ok()
        .or_else(|| {
            DATE_TIME_FORMATS.iter().find_map(|format| {
                NaiveDateTime::parse_from_str(text, format)
                    .ok()
                    .map(|parsed| parsed.and_utc().timestamp_millis())
            })
        })
        .or_else(|| {
            DATE_FORMATS.iter().find_map(|format| {
                NaiveDate::parse_from_str(text, format)
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
                    .map(|parsed| parsed.and_utc().timestamp_millis())
            })
        })?;

    (millis > 0).then_some(millis)
}

/// Newest parseable release time among `chapters`.
pub fn max_release_time<'a>(chapters: impl IntoIterator<Item = &'a ChapterItem>) -> Option<i64> {
    chapters
        .into_iter()
        .filter_map(|chapter| chapter.release_time.as_deref())
        .filter_map(parse_release_time)
        .max()
}
