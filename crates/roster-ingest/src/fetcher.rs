//! Listing and detail fetch tasks
//!
//! A listing task registers every roll number it finds and spawns one detail
//! task per roll. Detail tasks push their records into the batch funnel. A
//! listing task only finishes once all of its detail tasks have, so joining
//! the listing tasks is enough to know a batch has stopped producing.
//!
//! Network failures are dropped here, after a warning. Only lifecycle
//! violations travel upward.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::{HarvestError, Result, SourceError};
use crate::models::StudentRecord;
use crate::parser;
use crate::source::RecordSource;
use crate::tracker::KeyTracker;

/// Running totals shared by every fetch task of a harvest
#[derive(Debug, Default)]
pub struct FetchCounters {
    pages_requested: AtomicUsize,
    pages_dropped: AtomicUsize,
    discovered: AtomicUsize,
    fetched: AtomicUsize,
    items_dropped: AtomicUsize,
}

/// Plain copy of [`FetchCounters`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchTotals {
    pub pages_requested: usize,
    pub pages_dropped: usize,
    pub discovered: usize,
    pub fetched: usize,
    pub items_dropped: usize,
}

impl FetchCounters {
    pub fn totals(&self) -> FetchTotals {
        FetchTotals {
            pages_requested: self.pages_requested.load(Ordering::Relaxed),
            pages_dropped: self.pages_dropped.load(Ordering::Relaxed),
            discovered: self.discovered.load(Ordering::Relaxed),
            fetched: self.fetched.load(Ordering::Relaxed),
            items_dropped: self.items_dropped.load(Ordering::Relaxed),
        }
    }
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Handles every fetch task needs
#[derive(Clone)]
pub struct FetchContext {
    pub source: Arc<dyn RecordSource>,
    pub tracker: Arc<KeyTracker>,
    /// Bounds concurrent detail requests; held only around the network call
    pub permits: Arc<Semaphore>,
    pub counters: Arc<FetchCounters>,
    /// Upper bound on a single request, on top of any client-side timeout
    pub fetch_timeout: Option<Duration>,
}

impl FetchContext {
    pub fn new(
        source: Arc<dyn RecordSource>,
        tracker: Arc<KeyTracker>,
        max_in_flight: usize,
    ) -> Self {
        Self {
            source,
            tracker,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            counters: Arc::new(FetchCounters::default()),
            fetch_timeout: None,
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    async fn bounded<F>(&self, what: String, request: F) -> std::result::Result<String, SourceError>
    where
        F: Future<Output = std::result::Result<String, SourceError>>,
    {
        match self.fetch_timeout {
            None => request.await,
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .unwrap_or(Err(SourceError::Timeout {
                    url: what,
                    secs: limit.as_secs(),
                })),
        }
    }
}

/// Fetch and parse one detail page
///
/// Returns `Ok(None)` when the request fails; the roll then stays
/// `Discovered` for good. On success the roll is marked `Fetched` before the
/// record is handed back.
pub async fn fetch_item(ctx: &FetchContext, roll: &str) -> Result<Option<StudentRecord>> {
    let html = {
        let _permit = ctx
            .permits
            .acquire()
            .await
            .map_err(|_| HarvestError::PermitsClosed)?;
        ctx.bounded(format!("detail {}", roll), ctx.source.fetch_detail(roll)).await
    };

    let html = match html {
        Ok(html) => html,
        Err(e) => {
            warn!(roll = %roll, error = %e, "Detail fetch failed, dropping record");
            bump(&ctx.counters.items_dropped);
            return Ok(None);
        },
    };

    let record = parser::parse_student(roll, &html);
    ctx.tracker.mark_fetched(roll)?;
    bump(&ctx.counters.fetched);

    Ok(Some(record))
}

async fn item_task(ctx: FetchContext, roll: String, funnel: mpsc::Sender<StudentRecord>) -> Result<()> {
    if let Some(record) = fetch_item(&ctx, &roll).await? {
        if funnel.send(record).await.is_err() {
            debug!(roll = %roll, "Funnel closed before record could be queued");
        }
    }
    Ok(())
}

/// Fetch one listing page and fan out over the rolls it lists
///
/// A failed listing request registers nothing. Registration failures abort
/// every detail task this page already started.
pub async fn fetch_page(
    ctx: FetchContext,
    offset: usize,
    funnel: mpsc::Sender<StudentRecord>,
) -> Result<()> {
    bump(&ctx.counters.pages_requested);

    let html = match ctx
        .bounded(format!("listing {}", offset), ctx.source.fetch_listing(offset))
        .await
    {
        Ok(html) => html,
        Err(e) => {
            warn!(offset, error = %e, "Listing fetch failed, dropping page");
            bump(&ctx.counters.pages_dropped);
            return Ok(());
        },
    };

    let rolls = parser::parse_listing(&html);
    debug!(offset, count = rolls.len(), "Listing parsed");

    let mut items = JoinSet::new();
    for roll in rolls {
        ctx.tracker.register(&roll)?;
        bump(&ctx.counters.discovered);
        items.spawn(item_task(ctx.clone(), roll, funnel.clone()));
    }
    drop(funnel);

    join_all(&mut items).await
}

/// Wait for every task in `set`
///
/// On the first failure the remaining tasks are aborted and awaited before
/// the error is returned.
pub async fn join_all(set: &mut JoinSet<Result<()>>) -> Result<()> {
    while let Some(joined) = set.join_next().await {
        let outcome = joined.map_err(HarvestError::from).and_then(|result| result);
        if let Err(e) = outcome {
            set.shutdown().await;
            return Err(e);
        }
    }
    Ok(())
}
