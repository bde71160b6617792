// tests/scheduler_reentrancy.rs
mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{article, memory_store, ts};
use news_aggregator::config::SyncConfig;
use news_aggregator::{Article, FetchError, SchedulerState, Source, SyncScheduler};
use tokio::sync::{Notify, Semaphore};

/// Source that blocks inside `fetch` until the test releases a permit.
struct GatedSource {
    calls: AtomicUsize,
    entered: Notify,
    gate: Semaphore,
}

impl GatedSource {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            entered: Notify::new(),
            gate: Semaphore::new(0),
        }
    }
}

#[async_trait]
impl Source for GatedSource {
    fn name(&self) -> &str {
        "gated"
    }

    async fn fetch(&self, _from: DateTime<Utc>) -> Result<Vec<Article>, FetchError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        let permit = self.gate.acquire().await.expect("gate closed");
        permit.forget();
        Ok(vec![article(
            "gated",
            &format!("https://gated/{n}"),
            Utc::now() - chrono::Duration::minutes(1),
            "slow",
            "",
        )])
    }
}

#[tokio::test]
async fn tick_during_running_cycle_is_dropped() {
    let (backend, store) = memory_store();
    let src = Arc::new(GatedSource::new());
    let sched = Arc::new(SyncScheduler::new(
        vec![src.clone() as Arc<dyn Source>],
        store,
        SyncConfig::default(),
    ));

    let first = {
        let sched = sched.clone();
        tokio::spawn(async move { sched.run_cycle(Utc::now()).await })
    };
    src.entered.notified().await;
    assert!(sched.is_processing());

    // second trigger while the first holds the guard
    let second = sched.run_cycle(Utc::now()).await;
    assert!(second.is_skipped());
    assert_eq!(src.calls.load(Ordering::SeqCst), 1);
    assert_eq!(backend.len(), 0);

    src.gate.add_permits(1);
    let first = first.await.unwrap();
    assert!(!first.is_skipped());
    assert_eq!(first.stored(), 1);
    assert!(!sched.is_processing());
}

#[tokio::test]
async fn stop_waits_for_in_flight_cycle() {
    let (backend, store) = memory_store();
    let src = Arc::new(GatedSource::new());
    let sched = Arc::new(SyncScheduler::new(
        vec![src.clone() as Arc<dyn Source>],
        store,
        SyncConfig::default(),
    ));

    sched.start().unwrap();
    // first tick fires immediately
    src.entered.notified().await;
    assert_eq!(sched.state(), SchedulerState::Running);

    let stopping = {
        let sched = sched.clone();
        tokio::spawn(async move { sched.stop().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!stopping.is_finished());
    assert_eq!(sched.state(), SchedulerState::Stopping);

    src.gate.add_permits(1);
    stopping.await.unwrap();

    assert_eq!(sched.state(), SchedulerState::Stopped);
    assert_eq!(backend.len(), 1);
    assert_eq!(src.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn driver_ticks_on_interval_and_stops_cleanly() {
    let (_backend, store) = memory_store();
    let src = Arc::new(common::ScriptedSource::new("demo", true));
    src.publish(article("demo", "https://demo/1", ts(2024, 1, 9, 10, 0), "x", ""));

    let cfg = SyncConfig {
        interval_secs: 60,
        ..SyncConfig::default()
    };
    let sched = SyncScheduler::new(vec![src.clone() as Arc<dyn Source>], store, cfg);
    sched.start().unwrap();

    // immediate tick plus two interval ticks
    tokio::time::sleep(Duration::from_secs(125)).await;
    sched.stop().await;
    let calls = src.froms().len();
    assert_eq!(calls, 3);

    // no further cycles after stop
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(src.froms().len(), calls);
}

#[tokio::test]
async fn concurrent_stop_waits_for_the_same_shutdown() {
    let (backend, store) = memory_store();
    let src = Arc::new(GatedSource::new());
    let sched = Arc::new(SyncScheduler::new(
        vec![src.clone() as Arc<dyn Source>],
        store,
        SyncConfig::default(),
    ));

    sched.start().unwrap();
    src.entered.notified().await;

    let first = {
        let sched = sched.clone();
        tokio::spawn(async move { sched.stop().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(sched.state(), SchedulerState::Stopping);

    // a second caller must not report Stopped while the cycle still runs
    let second = {
        let sched = sched.clone();
        tokio::spawn(async move { sched.stop().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!first.is_finished());
    assert!(!second.is_finished());
    assert_eq!(sched.state(), SchedulerState::Stopping);

    src.gate.add_permits(1);
    first.await.unwrap();
    second.await.unwrap();
    assert_eq!(sched.state(), SchedulerState::Stopped);
    assert_eq!(backend.len(), 1);

    // and once stopped, further calls return at once
    tokio::time::timeout(Duration::from_secs(1), sched.stop())
        .await
        .expect("stop after stop should not block");
}
