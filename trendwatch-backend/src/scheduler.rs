//! Background refresh task
//!
//! Runs [`Refresher::refresh`] on a fixed interval, aligned to multiples of
//! the interval since the Unix epoch (so a 4 hour interval fires at 00:00,
//! 04:00, ... UTC). Each cycle is bounded by a timeout. Failures are logged
//! and the next cycle starts from the full follow set again; there are no
//! retries within a cycle.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::refresh::Refresher;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub interval: Duration,
    pub timeout: Duration,
    /// Refresh immediately on start instead of waiting for the first slot
    pub initial_refresh: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(4 * 60 * 60),
            timeout: Duration::from_secs(15 * 60),
            initial_refresh: true,
        }
    }
}

pub struct RefreshScheduler {
    config: SchedulerConfig,
    refresher: Arc<Refresher>,
    handle: Option<JoinHandle<()>>,
}

impl RefreshScheduler {
    pub fn new(config: SchedulerConfig, refresher: Arc<Refresher>) -> Self {
        Self {
            config,
            refresher,
            handle: None,
        }
    }

    /// Spawn the refresh loop. Calling it again while running is a no-op.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            tracing::warn!("Refresh scheduler already running");
            return;
        }

        let refresher = self.refresher.clone();
        let config = self.config.clone();

        tracing::info!(
            "Scheduling refresh task (interval: {:.1} hours, timeout: {} s, initial: {})",
            config.interval.as_secs_f64() / 3600.0,
            config.timeout.as_secs(),
            config.initial_refresh
        );

        self.handle = Some(tokio::spawn(async move {
            if config.initial_refresh {
                tracing::info!("Performing initial refresh...");
                Self::run_refresh(&refresher, config.timeout).await;
            }
            Self::refresh_loop(refresher, config).await;
        }));
    }

    async fn refresh_loop(refresher: Arc<Refresher>, config: SchedulerConfig) {
        loop {
            let now = Utc::now();
            let next_trigger = Self::next_refresh_time(now, config.interval);
            let sleep_duration = (next_trigger - now)
                .to_std()
                .unwrap_or(Duration::from_secs(60));

            tracing::info!(
                "Next refresh at: {} (in {:.1} min)",
                next_trigger.format("%Y-%m-%d %H:%M:%S UTC"),
                sleep_duration.as_secs_f64() / 60.0
            );

            tokio::time::sleep(sleep_duration).await;
            Self::run_refresh(&refresher, config.timeout).await;
        }
    }

    /// First multiple of `interval` since the epoch strictly after `now`.
    fn next_refresh_time(now: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
        let step = interval.as_secs().max(1) as i64;
        let next = (now.timestamp().div_euclid(step) + 1) * step;
        DateTime::from_timestamp(next, 0).unwrap_or(now + chrono::Duration::seconds(step))
    }

    /// Run one refresh cycle, giving up after `timeout`.
    async fn run_refresh(refresher: &Refresher, timeout: Duration) {
        match tokio::time::timeout(timeout, refresher.refresh()).await {
            Ok(Ok(report)) => {
                tracing::info!("Refresh completed: {} languages committed", report.committed.len());
            }
            Ok(Err(e)) => {
                tracing::error!("Couldn't refresh: {}", e);
            }
            Err(_) => {
                tracing::error!("Refresh timed out after {} seconds", timeout.as_secs());
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop the refresh loop. A cycle in flight is cancelled; snapshots it
    /// already committed stay.
    pub async fn shutdown(mut self) {
        tracing::info!("Shutting down refresh scheduler...");
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
        tracing::info!("Refresh scheduler stopped");
    }
}
