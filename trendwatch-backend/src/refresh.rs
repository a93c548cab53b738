//! Refresh cycle: fetch and extract every period of every followed language,
//! then commit each language as one snapshot.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};
use trendwatch_common::{Language, Period, RankedItem};

use crate::extract::{ExtractError, ExtractOptions, extract_page};
use crate::source::{FetchError, PageSource};
use crate::store::{SnapshotStore, StoreError};

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("Fetching {period} page for {language} failed: {source}")]
    Fetch {
        language: String,
        period: Period,
        source: FetchError,
    },

    #[error("Extracting {period} page for {language} failed: {source}")]
    Extract {
        language: String,
        period: Period,
        source: ExtractError,
    },

    #[error("Storing snapshot for {language} failed: {source}")]
    Store { language: String, source: StoreError },

    #[error("Reading follow set failed: {0}")]
    Follows(#[source] StoreError),

    #[error("Snapshot commit task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// One language committed by a refresh
#[derive(Debug, Clone)]
pub struct CommittedSnapshot {
    pub language: &'static Language,
    pub taken_at: DateTime<Utc>,
    pub counts: Vec<(Period, usize)>,
}

#[derive(Debug, Clone, Default)]
pub struct RefreshReport {
    pub committed: Vec<CommittedSnapshot>,
}

/// Drives refresh cycles against a [`PageSource`] and a [`SnapshotStore`].
pub struct Refresher {
    store: Arc<SnapshotStore>,
    source: Arc<dyn PageSource>,
    options: ExtractOptions,
}

impl Refresher {
    pub fn new(store: Arc<SnapshotStore>, source: Arc<dyn PageSource>, options: ExtractOptions) -> Self {
        Self { store, source, options }
    }

    /// Refresh every followed language in turn.
    ///
    /// The first fetch or extraction failure aborts the whole call. Languages
    /// committed before the failure keep their new snapshot; the failing
    /// language and everything after it are left as they were.
    pub async fn refresh(&self) -> Result<RefreshReport, RefreshError> {
        let follows = self.store.follows().map_err(RefreshError::Follows)?;
        info!("Refreshing {} followed languages", follows.len());

        let mut report = RefreshReport::default();
        for lang in follows {
            let committed = self.refresh_language(lang).await.inspect_err(|e| {
                error!("Refresh aborted at {}: {}", lang, e);
            })?;
            report.committed.push(committed);
        }

        info!("Refresh finished, {} snapshots committed", report.committed.len());
        Ok(report)
    }

    async fn refresh_language(&self, lang: &'static Language) -> Result<CommittedSnapshot, RefreshError> {
        info!("Refreshing language {}", lang);

        // Network I/O happens before any write transaction is opened.
        let mut periods: Vec<(Period, Vec<RankedItem>)> = Vec::with_capacity(Period::ALL.len());
        for period in Period::ALL {
            info!("Getting trending page: {} {}", lang, period);
            let html = self
                .source
                .fetch_page(lang, period)
                .await
                .map_err(|source| RefreshError::Fetch {
                    language: lang.store_key.to_string(),
                    period,
                    source,
                })?;

            let items = extract_page(&html, self.options).map_err(|source| RefreshError::Extract {
                language: lang.store_key.to_string(),
                period,
                source,
            })?;
            periods.push((period, items));
        }

        let counts = periods.iter().map(|(p, items)| (*p, items.len())).collect();
        let store = self.store.clone();
        let taken_at = tokio::task::spawn_blocking(move || store.commit_snapshot(lang, Utc::now(), &periods))
            .await?
            .map_err(|source| RefreshError::Store {
                language: lang.store_key.to_string(),
                source,
            })?;

        Ok(CommittedSnapshot { language: lang, taken_at, counts })
    }
}
