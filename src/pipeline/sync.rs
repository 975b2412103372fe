// src/pipeline/sync.rs

//! Incremental synchronization: gap resolution, fetch, upsert, index refresh.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use super::periods::periods_to_check;
use crate::error::{AppError, Result};
use crate::models::{Config, IndexMode, Period, UpsertOutcome};
use crate::search::IndexSynchronizer;
use crate::services::BulletinSource;
use crate::storage::RecordStore;

/// How the index was brought up to date at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexRefresh {
    Rebuilt,
    Incremental,
    /// Incremental mode with nothing to apply
    #[default]
    Skipped,
    /// Another writer held the lock
    Busy,
    Failed,
}

/// Aggregated outcome of one synchronization run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub periods_checked: usize,
    pub first_period: Option<Period>,
    pub last_period: Option<Period>,
    pub records_added: usize,
    pub records_updated: usize,
    pub records_unchanged: usize,
    /// Entries stored with at least one sentinel field
    pub degraded_entries: usize,
    /// Periods whose listing could not be fetched
    pub failed_periods: Vec<Period>,
    /// Entries the store refused
    pub record_failures: usize,
    pub index: IndexRefresh,
    /// Sum of every failure above, index included
    pub failures: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    /// Whether the run changed the store.
    pub fn has_changes(&self) -> bool {
        self.records_added + self.records_updated > 0
    }

    fn finish(&mut self) {
        let index_failed = matches!(self.index, IndexRefresh::Busy | IndexRefresh::Failed);
        self.failures = self.failed_periods.len() + self.record_failures + usize::from(index_failed);
        self.finished_at = Utc::now();
    }
}

/// Composes period resolution, fetching, storage and indexing.
pub struct Synchronizer {
    config: Arc<Config>,
    source: Arc<dyn BulletinSource>,
    store: Arc<dyn RecordStore>,
    index: Arc<IndexSynchronizer>,
    running: Mutex<()>,
}

impl Synchronizer {
    pub fn new(
        config: Arc<Config>,
        source: Arc<dyn BulletinSource>,
        store: Arc<dyn RecordStore>,
        index: Arc<IndexSynchronizer>,
    ) -> Self {
        Self {
            config,
            source,
            store,
            index,
            running: Mutex::new(()),
        }
    }

    /// Bring the store and index up to the current calendar week.
    pub async fn sync(&self) -> Result<SyncReport> {
        self.sync_until(Period::current()).await
    }

    /// Like [`sync`](Self::sync), treating `current` as this week.
    pub async fn sync_until(&self, current: Period) -> Result<SyncReport> {
        let _running = self.running.try_lock().map_err(|_| AppError::SyncInProgress)?;

        let epoch = self.config.sync.epoch()?;
        let watermark = self.store.max_period().await?;
        let periods = periods_to_check(watermark, epoch, current, self.config.sync.max_periods);

        match watermark {
            Some(mark) => log::info!(
                "Watermark {}, {} period(s) to check through {}",
                mark,
                periods.len(),
                current
            ),
            None => log::info!(
                "Empty store, {} period(s) to check from {} through {}",
                periods.len(),
                epoch,
                current
            ),
        }

        self.run(&periods).await
    }

    /// Re-check explicit periods regardless of the watermark.
    pub async fn sync_periods(&self, periods: &[Period]) -> Result<SyncReport> {
        let _running = self.running.try_lock().map_err(|_| AppError::SyncInProgress)?;

        let mut periods = periods.to_vec();
        periods.sort();
        periods.dedup();
        self.run(&periods).await
    }

    /// Rebuild the index from every stored record.
    pub async fn rebuild_index(&self) -> Result<usize> {
        let records = self.store.all_records().await?;
        self.index.rebuild(&records).await
    }

    async fn run(&self, periods: &[Period]) -> Result<SyncReport> {
        let mut report = SyncReport {
            periods_checked: periods.len(),
            first_period: periods.first().copied(),
            last_period: periods.last().copied(),
            started_at: Utc::now(),
            ..SyncReport::default()
        };
        let mut changed = Vec::new();
        // Left by an earlier run whose refresh never completed.
        let was_stale = self.index.is_stale();
        let mut marked = false;

        for (i, &period) in periods.iter().enumerate() {
            let fetch = self.source.fetch_period(period).await;
            if fetch.is_failed() {
                report.failed_periods.push(period);
                continue;
            }

            report.degraded_entries += fetch.degraded;
            let before = (report.records_added, report.records_updated);

            for entry in &fetch.entries {
                if !marked {
                    if let Err(e) = self.index.mark_stale().await {
                        log::warn!("Failed to mark index stale: {}", e);
                    }
                    marked = true;
                }
                match self.store.upsert(entry).await {
                    Ok(UpsertOutcome::Inserted) => {
                        report.records_added += 1;
                        changed.push(entry.title.clone());
                    }
                    Ok(UpsertOutcome::Updated) => {
                        report.records_updated += 1;
                        changed.push(entry.title.clone());
                    }
                    Ok(UpsertOutcome::Unchanged) => report.records_unchanged += 1,
                    Err(e) if e.is_fatal() => {
                        log::error!("Store unavailable, aborting sync: {}", e);
                        return Err(e);
                    }
                    Err(e) => {
                        log::warn!("Failed to store '{}': {}", entry.title, e);
                        report.record_failures += 1;
                    }
                }
            }

            log::info!(
                "[{}/{}] {}: {} entries, +{} new, {} updated",
                i + 1,
                periods.len(),
                period,
                fetch.entries.len(),
                report.records_added - before.0,
                report.records_updated - before.1
            );
        }

        report.index = self.refresh_index(&changed, was_stale).await?;
        report.finish();
        Ok(report)
    }

    /// Refresh the index after a run. Only a fatal store error propagates.
    ///
    /// Incremental mode falls back to a rebuild when there is no index yet or
    /// an earlier run left records unindexed.
    async fn refresh_index(&self, changed: &[String], was_stale: bool) -> Result<IndexRefresh> {
        let incremental = self.config.sync.index_mode == IndexMode::Incremental;
        if incremental && was_stale {
            log::info!("Index missed earlier changes, rebuilding");
        }

        let outcome = if incremental && self.index.exists() && !was_stale {
            if changed.is_empty() {
                if let Err(e) = self.index.clear_stale().await {
                    log::warn!("Failed to clear index stale marker: {}", e);
                }
                return Ok(IndexRefresh::Skipped);
            }
            self.apply_incremental(changed).await
        } else {
            self.rebuild_index().await.map(|_| IndexRefresh::Rebuilt)
        };

        match outcome {
            Ok(refresh) => Ok(refresh),
            Err(e) if e.is_fatal() => Err(e),
            Err(e @ AppError::IndexBusy { .. }) => {
                log::warn!("Index not refreshed, retry later: {}", e);
                Ok(IndexRefresh::Busy)
            }
            Err(e) => {
                log::error!("Index refresh failed: {}", e);
                Ok(IndexRefresh::Failed)
            }
        }
    }

    async fn apply_incremental(&self, changed: &[String]) -> Result<IndexRefresh> {
        let records = self.store.records_by_titles(changed).await?;
        match self.index.sync_incremental(&records).await {
            Ok(_) => Ok(IndexRefresh::Incremental),
            Err(AppError::IndexCorrupt(reason)) => {
                log::warn!("Index unusable ({}), rebuilding", reason);
                self.rebuild_index().await.map(|_| IndexRefresh::Rebuilt)
            }
            Err(e) => Err(e),
        }
    }
}
