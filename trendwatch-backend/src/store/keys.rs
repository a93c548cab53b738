//! Table definitions and key encoding for the snapshot store.
//!
//! Keys are `/`-separated composites:
//!
//! - `follows`:  `{store_key}`
//! - `scrapes`:  `{store_key}/{taken_at}` -> JSON [`BucketManifest`]
//! - `entries`:  `{store_key}/{taken_at}/{period}-{rank:02}` -> JSON `RankedItem`
//!
//! `taken_at` is always RFC3339 UTC with millisecond precision and a `Z`
//! suffix, so byte order of bucket keys is chronological order.

use chrono::{DateTime, SecondsFormat, Utc};
use redb::TableDefinition;
use serde::{Deserialize, Serialize};
use trendwatch_common::{Language, Period};

use super::error::StoreError;

pub const FOLLOWS: TableDefinition<&str, ()> = TableDefinition::new("follows");
pub const SCRAPES: TableDefinition<&str, &str> = TableDefinition::new("scrapes");
pub const ENTRIES: TableDefinition<&str, &str> = TableDefinition::new("entries");

/// Length of an encoded `taken_at`, e.g. `2026-10-18T09:30:00.123Z`
pub const TAKEN_AT_LEN: usize = 24;

/// Per-period item counts of one timestamp bucket
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketManifest {
    pub periods: Vec<PeriodCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodCount {
    pub period: Period,
    pub items: usize,
}

impl BucketManifest {
    pub fn count(&self, period: Period) -> Option<usize> {
        self.periods.iter().find(|p| p.period == period).map(|p| p.items)
    }
}

/// Drop sub-millisecond precision so the stored key and the returned
/// timestamp are the same instant.
pub fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}

pub fn encode_taken_at(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn decode_taken_at(s: &str) -> Result<DateTime<Utc>, StoreError> {
    if s.len() != TAKEN_AT_LEN || !s.ends_with('Z') {
        return Err(StoreError::CorruptKey(s.to_string()));
    }
    DateTime::parse_from_rfc3339(s)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| StoreError::CorruptKey(s.to_string()))
}

/// `{store_key}/`, the prefix of all of a language's bucket keys.
pub fn language_prefix(lang: &Language) -> String {
    format!("{}/", lang.store_key)
}

pub fn bucket_key(lang: &Language, taken_at: &str) -> String {
    format!("{}/{}", lang.store_key, taken_at)
}

/// `{store_key}/{taken_at}/{period}-`, the prefix of one period's entries.
pub fn period_prefix(lang: &Language, taken_at: &str, period: Period) -> String {
    format!("{}/{}/{}", lang.store_key, taken_at, period.key_prefix())
}

pub fn entry_key(lang: &Language, taken_at: &str, period: Period, rank: usize) -> String {
    format!("{}/{}/{}", lang.store_key, taken_at, period.entry_key(rank))
}

/// Smallest key greater than every key starting with `prefix`.
///
/// Only used with ASCII prefixes ending in `/` or `-`.
pub fn prefix_end(prefix: &str) -> String {
    let mut end = prefix.to_string();
    if let Some(last) = end.pop() {
        end.push(char::from_u32(last as u32 + 1).unwrap_or(char::MAX));
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_taken_at_is_fixed_width() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let encoded = encode_taken_at(ts);
        assert_eq!(encoded, "2026-01-02T03:04:05.000Z");
        assert_eq!(encoded.len(), TAKEN_AT_LEN);
        assert_eq!(decode_taken_at(&encoded).unwrap(), ts);
    }

    #[test]
    fn test_taken_at_orders_chronologically() {
        let earlier = Utc.with_ymd_and_hms(2026, 9, 30, 23, 59, 59).unwrap();
        let later = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();
        assert!(encode_taken_at(earlier) < encode_taken_at(later));
    }

    #[test]
    fn test_truncate_to_millis() {
        let ts = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        let truncated = truncate_to_millis(ts);
        assert_eq!(encode_taken_at(truncated), "2026-01-02T03:04:05.123Z");
        assert_eq!(decode_taken_at(&encode_taken_at(truncated)).unwrap(), truncated);
    }

    #[test]
    fn test_decode_rejects_other_formats() {
        assert!(decode_taken_at("2026-01-02T03:04:05Z").is_err());
        assert!(decode_taken_at("2026-01-02T03:04:05.000+00:00").is_err());
        assert!(decode_taken_at("not a timestamp at all!!").is_err());
    }

    #[test]
    fn test_prefix_end_bounds_prefix() {
        assert_eq!(prefix_end("go/"), "go0");
        assert_eq!(prefix_end("weekly-"), "weekly.");
        let key = entry_key(&Language::GO, "2026-01-02T03:04:05.000Z", Period::Weekly, 7);
        let prefix = period_prefix(&Language::GO, "2026-01-02T03:04:05.000Z", Period::Weekly);
        assert!(key.as_str() >= prefix.as_str() && key < prefix_end(&prefix));
    }
}
