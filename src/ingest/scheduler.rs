// src/ingest/scheduler.rs
//! Periodic synchronization driver.
//!
//! One driver task ticks on a fixed interval and spawns each cycle into its
//! own task, so a slow cycle never delays the next tick. The tick that lands
//! while a cycle still holds the processing guard is dropped, not queued.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::config::SyncConfig;
use crate::ingest::types::Source;
use crate::ingest::{ensure_metrics_described, frontier};
use crate::store::ArticleStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Scheduled,
    /// Scheduled, and a cycle currently holds the processing guard.
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduler can only be started once (state: {0:?})")]
    NotIdle(SchedulerState),
}

/// What happened to one source during a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    Synced {
        from: DateTime<Utc>,
        fetched: usize,
        stored: u64,
    },
    FrontierFailed {
        error: String,
    },
    FetchFailed {
        from: DateTime<Utc>,
        error: String,
    },
    StoreFailed {
        from: DateTime<Utc>,
        error: String,
    },
}

impl SourceOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, SourceOutcome::Synced { .. })
    }

    pub fn stored(&self) -> u64 {
        match self {
            SourceOutcome::Synced { stored, .. } => *stored,
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleReport {
    /// Another cycle held the guard; nothing was fetched or stored.
    Skipped,
    Completed {
        /// Sorted by source name. Sources whose task panicked are absent.
        sources: Vec<(String, SourceOutcome)>,
        /// `None` when the retention pass failed.
        evicted: Option<u64>,
    },
}

impl CycleReport {
    pub fn is_skipped(&self) -> bool {
        matches!(self, CycleReport::Skipped)
    }

    pub fn outcome(&self, source: &str) -> Option<&SourceOutcome> {
        match self {
            CycleReport::Skipped => None,
            CycleReport::Completed { sources, .. } => sources
                .iter()
                .find(|(name, _)| name == source)
                .map(|(_, o)| o),
        }
    }

    pub fn stored(&self) -> u64 {
        match self {
            CycleReport::Skipped => 0,
            CycleReport::Completed { sources, .. } => sources.iter().map(|(_, o)| o.stored()).sum(),
        }
    }
}

const PHASE_IDLE: u8 = 0;
const PHASE_SCHEDULED: u8 = 1;
const PHASE_STOPPING: u8 = 2;
const PHASE_STOPPED: u8 = 3;

struct Inner {
    sources: Vec<Arc<dyn Source>>,
    store: Arc<ArticleStore>,
    cfg: SyncConfig,
    processing: AtomicBool,
    phase: AtomicU8,
}

/// Releases the processing flag on drop, including during unwinding.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl<'a> ProcessingGuard<'a> {
    fn claim(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SyncScheduler {
    inner: Arc<Inner>,
    stop_tx: watch::Sender<bool>,
    /// Flips to `true` once the phase is `Stopped`; later `stop` callers wait on it.
    stopped_tx: watch::Sender<bool>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl SyncScheduler {
    pub fn new(sources: Vec<Arc<dyn Source>>, store: Arc<ArticleStore>, cfg: SyncConfig) -> Self {
        let (stop_tx, _) = watch::channel(false);
        let (stopped_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                sources,
                store,
                cfg,
                processing: AtomicBool::new(false),
                phase: AtomicU8::new(PHASE_IDLE),
            }),
            stop_tx,
            stopped_tx,
            driver: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SchedulerState {
        match self.inner.phase.load(Ordering::Acquire) {
            PHASE_IDLE => SchedulerState::Idle,
            PHASE_SCHEDULED if self.is_processing() => SchedulerState::Running,
            PHASE_SCHEDULED => SchedulerState::Scheduled,
            PHASE_STOPPING => SchedulerState::Stopping,
            _ => SchedulerState::Stopped,
        }
    }

    pub fn is_processing(&self) -> bool {
        self.inner.processing.load(Ordering::Acquire)
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.inner.sources.iter().map(|s| s.name())
    }

    /// Spawn the periodic driver. The first cycle fires immediately.
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), SchedulerError> {
        if self
            .inner
            .phase
            .compare_exchange(PHASE_IDLE, PHASE_SCHEDULED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SchedulerError::NotIdle(self.state()));
        }

        let inner = self.inner.clone();
        let stop_rx = self.stop_tx.subscribe();
        let handle = tokio::spawn(drive(inner, stop_rx));
        *self.driver.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        tracing::info!(
            interval_secs = self.inner.cfg.interval_secs,
            sources = self.inner.sources.len(),
            "sync scheduler started"
        );
        Ok(())
    }

    /// Stop issuing ticks and wait for the driver and every in-flight cycle.
    ///
    /// Concurrent callers all return only after the scheduler is `Stopped`.
    pub async fn stop(&self) {
        let prev = self
            .inner
            .phase
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |p| match p {
                PHASE_SCHEDULED => Some(PHASE_STOPPING),
                PHASE_IDLE => Some(PHASE_STOPPED),
                _ => None,
            });
        match prev {
            Ok(PHASE_SCHEDULED) => {}
            Ok(_) => {
                self.stopped_tx.send_replace(true);
                return;
            }
            Err(_) => {
                // another caller owns the shutdown
                let mut done = self.stopped_tx.subscribe();
                let _ = done.wait_for(|stopped| *stopped).await;
                return;
            }
        }

        self.stop_tx.send_replace(true);
        let handle = self
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "sync driver task failed");
            }
        }

        self.inner.phase.store(PHASE_STOPPED, Ordering::Release);
        self.stopped_tx.send_replace(true);
        tracing::info!("sync scheduler stopped");
    }

    /// Run one cycle now, outside the driver. Still subject to the guard.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> CycleReport {
        self.inner.run_cycle(now).await
    }
}

async fn drive(inner: Arc<Inner>, mut stop_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(inner.cfg.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut cycles: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let inner = inner.clone();
                cycles.spawn(async move {
                    inner.run_cycle(Utc::now()).await;
                });
            }
            Some(res) = cycles.join_next(), if !cycles.is_empty() => {
                if let Err(e) = res {
                    tracing::error!(error = %e, "sync cycle task failed");
                }
            }
        }
    }

    let in_flight = cycles.len();
    if in_flight > 0 {
        tracing::info!(in_flight, "waiting for in-flight sync cycles");
    }
    while let Some(res) = cycles.join_next().await {
        if let Err(e) = res {
            tracing::error!(error = %e, "sync cycle task failed");
        }
    }
}

impl Inner {
    async fn run_cycle(&self, now: DateTime<Utc>) -> CycleReport {
        ensure_metrics_described();

        let Some(_guard) = ProcessingGuard::claim(&self.processing) else {
            tracing::warn!("already processing, tick dropped");
            counter!("sync_cycles_skipped_total").increment(1);
            return CycleReport::Skipped;
        };
        counter!("sync_cycles_total").increment(1);
        let t0 = std::time::Instant::now();

        let mut tasks = JoinSet::new();
        for source in &self.sources {
            let source = source.clone();
            let store = self.store.clone();
            let cfg = self.cfg;
            tasks.spawn(async move {
                let outcome = sync_source(&store, source.as_ref(), now, &cfg).await;
                (source.name().to_string(), outcome)
            });
        }

        let mut sources = Vec::with_capacity(self.sources.len());
        while let Some(res) = tasks.join_next().await {
            match res {
                Ok(pair) => sources.push(pair),
                Err(e) => {
                    tracing::error!(error = %e, "source task failed");
                    counter!("sync_source_errors_total").increment(1);
                }
            }
        }
        sources.sort_by(|a, b| a.0.cmp(&b.0));

        let evicted = match now.checked_sub_signed(self.cfg.retention()) {
            Some(cutoff) => self.evict(cutoff).await,
            None => {
                counter!("sync_eviction_errors_total").increment(1);
                tracing::error!(
                    retention_days = self.cfg.retention_days,
                    "retention window out of range, eviction skipped"
                );
                None
            }
        };

        gauge!("sync_last_cycle_ts").set(now.timestamp() as f64);
        let stored: u64 = sources.iter().map(|(_, o)| o.stored()).sum();
        tracing::info!(
            stored,
            failed = sources.iter().filter(|(_, o)| !o.is_ok()).count(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "sync cycle finished"
        );

        CycleReport::Completed { sources, evicted }
    }

    async fn evict(&self, cutoff: DateTime<Utc>) -> Option<u64> {
        match self.store.remove_old_articles(cutoff).await {
            Ok(n) => {
                counter!("sync_evicted_total").increment(n);
                if n > 0 {
                    tracing::info!(evicted = n, %cutoff, "removed old articles");
                }
                Some(n)
            }
            Err(e) => {
                counter!("sync_eviction_errors_total").increment(1);
                tracing::error!(error = %e, %cutoff, "failed to remove old articles");
                None
            }
        }
    }
}

/// Frontier, fetch and store for one source. Failures are logged here and
/// reported in the outcome; they never leave the source's task.
pub async fn sync_source(
    store: &ArticleStore,
    source: &dyn Source,
    now: DateTime<Utc>,
    cfg: &SyncConfig,
) -> SourceOutcome {
    let name = source.name();

    let from = match frontier(store, name, now, cfg).await {
        Ok(from) => from,
        Err(e) => {
            counter!("sync_source_errors_total", "source" => name.to_string()).increment(1);
            tracing::error!(source = name, error = %e, "failed to get latest article for source");
            return SourceOutcome::FrontierFailed {
                error: e.to_string(),
            };
        }
    };

    let mut articles = match source.fetch(from).await {
        Ok(v) => v,
        Err(e) => {
            counter!("sync_source_errors_total", "source" => name.to_string()).increment(1);
            tracing::error!(
                source = name,
                %from,
                transient = e.is_transient(),
                error = %e,
                "failed to get new articles from source"
            );
            return SourceOutcome::FetchFailed {
                from,
                error: e.to_string(),
            };
        }
    };

    // A misbehaving adapter must not move anything behind the frontier.
    let returned = articles.len();
    articles.retain(|a| a.published_at >= from);
    if articles.len() != returned {
        tracing::warn!(
            source = name,
            %from,
            dropped = returned - articles.len(),
            "source returned articles before frontier"
        );
    }

    let fetched = articles.len();
    counter!("sync_articles_fetched_total", "source" => name.to_string()).increment(fetched as u64);
    if articles.is_empty() {
        tracing::debug!(source = name, %from, "no new articles");
        return SourceOutcome::Synced {
            from,
            fetched: 0,
            stored: 0,
        };
    }

    match store.add_articles(articles).await {
        Ok(stored) => {
            counter!("sync_articles_stored_total", "source" => name.to_string()).increment(stored);
            tracing::info!(source = name, %from, fetched, stored, "stored new articles");
            SourceOutcome::Synced {
                from,
                fetched,
                stored,
            }
        }
        Err(e) => {
            counter!("sync_source_errors_total", "source" => name.to_string()).increment(1);
            tracing::error!(source = name, %from, error = %e, "failed to add new articles to store");
            SourceOutcome::StoreFailed {
                from,
                error: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::{Article, FetchError};
    use crate::keywords::TokenizerExtractor;
    use crate::store::MemoryBackend;
    use async_trait::async_trait;
    use chrono::TimeZone;

    struct Fixed(Vec<Article>);

    #[async_trait]
    impl Source for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn fetch(&self, _from: DateTime<Utc>) -> Result<Vec<Article>, FetchError> {
            Ok(self.0.clone())
        }
    }

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 9, h, 0, 0).unwrap()
    }

    fn store() -> Arc<ArticleStore> {
        Arc::new(ArticleStore::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(TokenizerExtractor::new()),
        ))
    }

    fn art(url: &str, h: u32) -> Article {
        Article {
            url: url.into(),
            header: url.into(),
            published_at: at(h),
            text: String::new(),
            source_name: "fixed".into(),
        }
    }

    #[test]
    fn guard_is_exclusive_and_released_on_drop() {
        let flag = AtomicBool::new(false);
        let g = ProcessingGuard::claim(&flag).unwrap();
        assert!(ProcessingGuard::claim(&flag).is_none());
        drop(g);
        assert!(ProcessingGuard::claim(&flag).is_some());
    }

    #[test]
    fn guard_is_released_on_panic() {
        let flag = AtomicBool::new(false);
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _g = ProcessingGuard::claim(&flag).unwrap();
            panic!("boom");
        }));
        assert!(res.is_err());
        assert!(!flag.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn articles_behind_frontier_are_discarded() {
        let store = store();
        let src = Fixed(vec![art("old", 1), art("new", 12)]);
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        // lookback frontier is 2024-01-09T00:00, so force a later one by storing 10:00
        store.add_articles(vec![art("seed", 10)]).await.unwrap();
        let outcome = sync_source(&store, &src, now, &SyncConfig::default()).await;
        assert_eq!(
            outcome,
            SourceOutcome::Synced {
                from: at(10) + chrono::Duration::minutes(1),
                fetched: 1,
                stored: 1
            }
        );
    }

    #[tokio::test]
    async fn start_twice_and_start_after_stop_fail() {
        let sched = SyncScheduler::new(vec![], store(), SyncConfig::default());
        assert_eq!(sched.state(), SchedulerState::Idle);
        sched.start().unwrap();
        assert!(matches!(sched.start(), Err(SchedulerError::NotIdle(_))));
        sched.stop().await;
        assert_eq!(sched.state(), SchedulerState::Stopped);
        assert!(sched.start().is_err());
    }

    #[tokio::test]
    async fn out_of_range_retention_skips_eviction() {
        let cfg = SyncConfig {
            retention_days: 200_000_000,
            ..SyncConfig::default()
        };
        let sched = SyncScheduler::new(vec![], store(), cfg);
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let report = sched.run_cycle(now).await;
        assert_eq!(
            report,
            CycleReport::Completed {
                sources: vec![],
                evicted: None
            }
        );
        assert!(!sched.is_processing());
    }

    #[tokio::test]
    async fn stop_before_start_is_terminal() {
        let sched = SyncScheduler::new(vec![], store(), SyncConfig::default());
        sched.stop().await;
        assert_eq!(sched.state(), SchedulerState::Stopped);
        assert!(sched.start().is_err());
    }
}
