//! Snapshot store
//!
//! Persists the follow set and every refresh's results in a single redb
//! file. redb gives us one writer and any number of MVCC readers, so a
//! reader always sees the snapshots committed before its transaction
//! started and never blocks on a refresh in progress.

mod error;
pub mod keys;

pub use error::{Result, StoreError};
pub use keys::BucketManifest;

use chrono::{DateTime, Utc};
use redb::{Database, ReadOnlyTable, ReadableTable};
use std::path::Path;
use tracing::{debug, info, warn};
use trendwatch_common::{Language, Period, RankedItem, lookup};

use keys::{
    ENTRIES, FOLLOWS, PeriodCount, SCRAPES, bucket_key, decode_taken_at, encode_taken_at,
    entry_key, language_prefix, period_prefix, prefix_end, truncate_to_millis,
};

/// Handle to the on-disk store. Cheap to share behind an `Arc`.
pub struct SnapshotStore {
    db: Database,
}

impl SnapshotStore {
    /// Open (or create) the store at `path`, creating every table up front
    /// so that read transactions never see a missing table.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
                info!("Created store directory: {:?}", parent);
            }
        }

        let db = Database::create(path)?;
        let txn = db.begin_write()?;
        {
            txn.open_table(FOLLOWS)?;
            txn.open_table(SCRAPES)?;
            txn.open_table(ENTRIES)?;
        }
        txn.commit()?;

        info!("Opened snapshot store at {:?}", path);
        Ok(Self { db })
    }

    /// Add a language to the follow set. Following twice is a no-op.
    pub fn follow(&self, lang: &Language) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut follows = txn.open_table(FOLLOWS)?;
            follows.insert(lang.store_key, ())?;
        }
        txn.commit()?;
        debug!("Following {}", lang);
        Ok(())
    }

    /// Remove a language from the follow set. Unknown entries are ignored.
    pub fn unfollow(&self, lang: &Language) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut follows = txn.open_table(FOLLOWS)?;
            follows.remove(lang.store_key)?;
        }
        txn.commit()?;
        debug!("Unfollowed {}", lang);
        Ok(())
    }

    /// The languages currently followed. Callers must not rely on the order.
    pub fn follows(&self) -> Result<Vec<&'static Language>> {
        let txn = self.db.begin_read()?;
        let follows = txn.open_table(FOLLOWS)?;

        let mut langs = Vec::new();
        for row in follows.iter()? {
            let (key, _) = row?;
            match lookup(key.value()) {
                Some(lang) => langs.push(lang),
                None => warn!("Ignoring followed language missing from catalog: {}", key.value()),
            }
        }
        Ok(langs)
    }

    /// Every snapshot timestamp stored for `lang`, oldest first. Empty if
    /// the language was never scraped.
    pub fn scrape_history(&self, lang: &Language) -> Result<Vec<DateTime<Utc>>> {
        let txn = self.db.begin_read()?;
        let scrapes = txn.open_table(SCRAPES)?;

        let prefix = language_prefix(lang);
        let end = prefix_end(&prefix);
        let mut history = Vec::new();
        for row in scrapes.range(prefix.as_str()..end.as_str())? {
            let (key, _) = row?;
            history.push(decode_taken_at(&key.value()[prefix.len()..])?);
        }
        Ok(history)
    }

    /// The most recent snapshot that has any items for `period`.
    ///
    /// Buckets are scanned newest to oldest and the first one holding at
    /// least one entry of the period wins, so a refresh that left a period
    /// empty falls back to older data for that period.
    pub fn latest(&self, lang: &Language, period: Period) -> Result<(Vec<RankedItem>, DateTime<Utc>)> {
        let txn = self.db.begin_read()?;
        let scrapes = txn.open_table(SCRAPES)?;
        let entries = txn.open_table(ENTRIES)?;

        let prefix = language_prefix(lang);
        let end = prefix_end(&prefix);
        let mut any_bucket = false;

        for row in scrapes.range(prefix.as_str()..end.as_str())?.rev() {
            let (key, _) = row?;
            any_bucket = true;

            let taken_at = key.value()[prefix.len()..].to_string();
            let items = read_period(&entries, lang, &taken_at, period)?;
            if !items.is_empty() {
                return Ok((items, decode_taken_at(&taken_at)?));
            }
        }

        if any_bucket {
            Err(StoreError::NoScrapesForPeriod {
                language: lang.store_key.to_string(),
                period,
            })
        } else {
            Err(StoreError::NoScrapesForLanguage(lang.store_key.to_string()))
        }
    }

    /// Items of `period` from the snapshot taken exactly at `taken_at`.
    ///
    /// There is no nearest-match: a timestamp that doesn't name a bucket is
    /// [`StoreError::SnapshotNotFound`]. A bucket whose refresh recorded the
    /// period with zero items yields an empty list.
    pub fn get_scrape(&self, lang: &Language, period: Period, taken_at: DateTime<Utc>) -> Result<Vec<RankedItem>> {
        let txn = self.db.begin_read()?;
        let scrapes = txn.open_table(SCRAPES)?;
        let entries = txn.open_table(ENTRIES)?;

        let taken_at = encode_taken_at(truncate_to_millis(taken_at));
        let manifest: BucketManifest = match scrapes.get(bucket_key(lang, &taken_at).as_str())? {
            Some(raw) => serde_json::from_str(raw.value())?,
            None => {
                let prefix = language_prefix(lang);
                let end = prefix_end(&prefix);
                let has_buckets = scrapes.range(prefix.as_str()..end.as_str())?.next().is_some();
                return Err(if has_buckets {
                    StoreError::SnapshotNotFound {
                        language: lang.store_key.to_string(),
                        taken_at,
                    }
                } else {
                    StoreError::NoScrapesForLanguage(lang.store_key.to_string())
                });
            }
        };

        if manifest.count(period).is_none() {
            return Err(StoreError::PeriodNotRecorded {
                language: lang.store_key.to_string(),
                taken_at,
                period,
            });
        }
        read_period(&entries, lang, &taken_at, period)
    }

    /// Write one language's refresh results as a new timestamp bucket.
    ///
    /// All periods land in one write transaction, so readers see either the
    /// whole snapshot or none of it. An existing bucket with the same
    /// timestamp is never overwritten. Returns the stored timestamp.
    pub fn commit_snapshot(
        &self,
        lang: &Language,
        taken_at: DateTime<Utc>,
        periods: &[(Period, Vec<RankedItem>)],
    ) -> Result<DateTime<Utc>> {
        let taken_at = truncate_to_millis(taken_at);
        let encoded = encode_taken_at(taken_at);
        let bucket = bucket_key(lang, &encoded);

        let manifest = BucketManifest {
            periods: periods
                .iter()
                .map(|(period, items)| PeriodCount { period: *period, items: items.len() })
                .collect(),
        };
        let manifest_json = serde_json::to_string(&manifest)?;

        let txn = self.db.begin_write()?;
        {
            let mut scrapes = txn.open_table(SCRAPES)?;
            if scrapes.get(bucket.as_str())?.is_some() {
                return Err(StoreError::SnapshotExists {
                    language: lang.store_key.to_string(),
                    taken_at: encoded,
                });
            }
            scrapes.insert(bucket.as_str(), manifest_json.as_str())?;

            let mut entries = txn.open_table(ENTRIES)?;
            for (period, items) in periods {
                for (rank, item) in items.iter().enumerate() {
                    let json = serde_json::to_string(item)?;
                    entries.insert(entry_key(lang, &encoded, *period, rank).as_str(), json.as_str())?;
                }
            }
        }
        txn.commit()?;

        info!(
            "Committed snapshot {} for {} ({})",
            encoded,
            lang,
            periods
                .iter()
                .map(|(p, items)| format!("{}: {}", p, items.len()))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(taken_at)
    }
}

/// Entries of one period inside one bucket, in rank order.
///
/// Ranks are padded to two digits only, so from rank 100 on key order is no
/// longer rank order. Entries are ordered by their numeric rank instead.
fn read_period(
    entries: &ReadOnlyTable<&'static str, &'static str>,
    lang: &Language,
    taken_at: &str,
    period: Period,
) -> Result<Vec<RankedItem>> {
    let prefix = period_prefix(lang, taken_at, period);
    let end = prefix_end(&prefix);

    let mut ranked: Vec<(usize, RankedItem)> = Vec::new();
    for row in entries.range(prefix.as_str()..end.as_str())? {
        let (key, value) = row?;
        let key = key.value();
        let rank = key
            .strip_prefix(prefix.as_str())
            .and_then(|suffix| suffix.parse::<usize>().ok())
            .ok_or_else(|| StoreError::CorruptKey(key.to_string()))?;
        ranked.push((rank, serde_json::from_str(value.value())?));
    }
    ranked.sort_by_key(|(rank, _)| *rank);
    Ok(ranked.into_iter().map(|(_, item)| item).collect())
}
