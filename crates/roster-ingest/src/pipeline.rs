//! Batch coordinator and persist stage
//!
//! A harvest walks the directory index in fixed-size batches. Each batch:
//!
//! 1. Opens a fresh funnel and spawns one persist task draining it
//! 2. Spawns a listing task per page offset in the batch
//! 3. Joins every listing task (each of which joins its own detail tasks)
//! 4. Closes the funnel and waits for the persist task to drain it
//!
//! The next batch starts only after step 4. A lifecycle violation or store
//! failure anywhere ends the run: remaining tasks are aborted, the tracker
//! state is dumped to the log and the error is returned to the caller.

use indicatif::ProgressBar;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::HarvestConfig;
use crate::error::{HarvestError, Result};
use crate::fetcher::{self, FetchContext};
use crate::models::StudentRecord;
use crate::source::RecordSource;
use crate::storage::{InsertOutcome, RecordStore};
use crate::tracker::{KeyTracker, PersistOutcome};

/// Outcome of one persist stage run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PersistStats {
    /// Records written to the store
    pub inserted: usize,
    /// Records delivered more than once through the funnel
    pub duplicates_skipped: usize,
    /// Records the store already held from an earlier run
    pub already_present: usize,
}

impl PersistStats {
    fn absorb(&mut self, other: PersistStats) {
        self.inserted += other.inserted;
        self.duplicates_skipped += other.duplicates_skipped;
        self.already_present += other.already_present;
    }
}

/// Summary of a completed harvest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HarvestStats {
    pub batches: usize,
    pub pages_requested: usize,
    pub pages_dropped: usize,
    pub discovered: usize,
    pub fetched: usize,
    pub items_dropped: usize,
    pub inserted: usize,
    pub duplicates_skipped: usize,
    pub already_present: usize,
}

impl HarvestStats {
    /// Listing and detail requests that were given up on
    pub fn fetch_failures(&self) -> usize {
        self.pages_dropped + self.items_dropped
    }
}

/// Drives a full harvest over a [`RecordSource`] into a [`RecordStore`]
pub struct HarvestPipeline {
    source: Arc<dyn RecordSource>,
    store: Arc<dyn RecordStore>,
    tracker: Arc<KeyTracker>,
    config: HarvestConfig,
    fetch_timeout: Option<Duration>,
    progress: Option<ProgressBar>,
}

impl HarvestPipeline {
    pub fn new(
        source: Arc<dyn RecordSource>,
        store: Arc<dyn RecordStore>,
        config: HarvestConfig,
    ) -> Self {
        Self {
            source,
            store,
            tracker: Arc::new(KeyTracker::new()),
            config,
            fetch_timeout: None,
            progress: None,
        }
    }

    /// Use an existing tracker instead of a fresh one
    pub fn with_tracker(mut self, tracker: Arc<KeyTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    /// Give up on any single request after `timeout`
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    /// Advance `progress` once per finished batch
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn tracker(&self) -> &Arc<KeyTracker> {
        &self.tracker
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Harvest using the configured counts
    pub async fn run(&self) -> Result<HarvestStats> {
        self.run_all(
            self.config.total_count,
            self.config.batch_size,
            self.config.page_stride,
        )
        .await
    }

    /// Harvest index positions `0..total_count`
    pub async fn run_all(
        &self,
        total_count: usize,
        batch_size: usize,
        page_stride: usize,
    ) -> Result<HarvestStats> {
        let config = HarvestConfig {
            total_count,
            batch_size,
            page_stride,
            ..self.config.clone()
        };
        config.validate()?;

        let mut ctx = FetchContext::new(
            Arc::clone(&self.source),
            Arc::clone(&self.tracker),
            config.max_in_flight,
        );
        if let Some(timeout) = self.fetch_timeout {
            ctx = ctx.with_fetch_timeout(timeout);
        }

        let batch_count = config.batch_count();
        if let Some(progress) = &self.progress {
            progress.set_length(batch_count as u64);
        }

        info!(
            total_count,
            batch_size,
            page_stride,
            batches = batch_count,
            max_in_flight = config.max_in_flight,
            "Starting harvest"
        );

        let mut stats = HarvestStats::default();
        let mut persisted = PersistStats::default();

        for (batch, start) in (0..total_count).step_by(batch_size).enumerate() {
            let end = (start + batch_size).min(total_count);
            info!(batch = batch + 1, of = batch_count, start, end, "Starting batch");

            let batch_stats = self.run_batch(&ctx, &config, start, end).await?;
            persisted.absorb(batch_stats);
            stats.batches += 1;

            info!(
                batch = batch + 1,
                inserted = batch_stats.inserted,
                duplicates = batch_stats.duplicates_skipped,
                "Batch complete"
            );
            if let Some(progress) = &self.progress {
                progress.inc(1);
            }
        }

        let totals = ctx.counters.totals();
        stats.pages_requested = totals.pages_requested;
        stats.pages_dropped = totals.pages_dropped;
        stats.discovered = totals.discovered;
        stats.fetched = totals.fetched;
        stats.items_dropped = totals.items_dropped;
        stats.inserted = persisted.inserted;
        stats.duplicates_skipped = persisted.duplicates_skipped;
        stats.already_present = persisted.already_present;

        if let Some(progress) = &self.progress {
            progress.finish_with_message("harvest complete");
        }

        info!(
            batches = stats.batches,
            discovered = stats.discovered,
            fetched = stats.fetched,
            inserted = stats.inserted,
            fetch_failures = stats.fetch_failures(),
            "Harvest complete"
        );

        Ok(stats)
    }

    async fn run_batch(
        &self,
        ctx: &FetchContext,
        config: &HarvestConfig,
        start: usize,
        end: usize,
    ) -> Result<PersistStats> {
        let (funnel, records) = mpsc::channel(config.funnel_capacity);
        let mut persist = tokio::spawn(persist_stage(
            records,
            Arc::clone(&self.tracker),
            Arc::clone(&self.store),
        ));

        let mut producers = JoinSet::new();
        for offset in (start..end).step_by(config.page_stride) {
            producers.spawn(fetcher::fetch_page(ctx.clone(), offset, funnel.clone()));
        }

        // The persist stage cannot finish on its own while the funnel is
        // open, so finishing first means it failed.
        let first = tokio::select! {
            produced = fetcher::join_all(&mut producers) => FirstDone::Producers(produced),
            joined = &mut persist => FirstDone::Persist(flatten(joined)),
        };

        let (produced, persisted) = match first {
            FirstDone::Producers(produced) => {
                debug!(start, end, "Producers joined, closing funnel");
                drop(funnel);
                (produced, flatten(persist.await))
            },
            FirstDone::Persist(Err(e)) => {
                warn!(start, end, "Persist stage failed, aborting producers");
                producers.shutdown().await;
                drop(funnel);
                (Ok(()), Err(e))
            },
            FirstDone::Persist(Ok(stats)) => {
                drop(funnel);
                (fetcher::join_all(&mut producers).await, Ok(stats))
            },
        };

        match (produced, persisted) {
            (Ok(()), Ok(stats)) => Ok(stats),
            (Err(e), persisted) => {
                if let Err(persist_err) = &persisted {
                    warn!(error = %persist_err, "Persist stage also failed");
                }
                error!(error = %e, start, end, "Batch aborted");
                self.tracker.dump();
                Err(e)
            },
            (Ok(()), Err(e)) => {
                error!(error = %e, start, end, "Batch aborted");
                self.tracker.dump();
                Err(e)
            },
        }
    }
}

enum FirstDone {
    Producers(Result<()>),
    Persist(Result<PersistStats>),
}

fn flatten(joined: std::result::Result<Result<PersistStats>, JoinError>) -> Result<PersistStats> {
    joined.map_err(HarvestError::from).and_then(|result| result)
}

/// Drain `records` into `store` until every sender is gone
///
/// Each record is marked persisted before it is written, so a record that
/// reaches the funnel twice is written at most once. Store failures are
/// fatal and log the offending record; the coordinator dumps the tracker
/// once the batch's producers have been stopped.
pub async fn persist_stage(
    mut records: mpsc::Receiver<StudentRecord>,
    tracker: Arc<KeyTracker>,
    store: Arc<dyn RecordStore>,
) -> Result<PersistStats> {
    let mut stats = PersistStats::default();

    while let Some(record) = records.recv().await {
        match tracker.mark_persisted(&record.roll) {
            Ok(PersistOutcome::Transitioned) => {},
            Ok(PersistOutcome::AlreadyPersisted) => {
                warn!(roll = %record.roll, "Record delivered twice, skipping write");
                stats.duplicates_skipped += 1;
                continue;
            },
            Err(violation) => return Err(violation.into()),
        }

        match store.insert(&record).await {
            Ok(InsertOutcome::Inserted) => {
                debug!(roll = %record.roll, "Record stored");
                stats.inserted += 1;
            },
            Ok(InsertOutcome::AlreadyPresent) => {
                warn!(roll = %record.roll, "Record already stored by an earlier run");
                stats.already_present += 1;
            },
            Err(source) => {
                error!(record = ?record, error = %source, "Failed to store record");
                return Err(HarvestError::Store {
                    roll: record.roll.clone(),
                    source,
                });
            },
        }
    }

    Ok(stats)
}
