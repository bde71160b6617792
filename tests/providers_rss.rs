// tests/providers_rss.rs
mod common;

use std::sync::Arc;

use common::{memory_store, ts};
use news_aggregator::config::SyncConfig;
use news_aggregator::ingest::providers::RssSource;
use news_aggregator::{Source, SyncScheduler};

const FEED: &str = include_str!("fixtures/feed.xml");

#[tokio::test]
async fn feed_items_are_filtered_sorted_and_cleaned() {
    let src = RssSource::from_fixture("wire", FEED);
    let items = src.fetch(ts(2024, 1, 9, 0, 0)).await.unwrap();

    let urls: Vec<_> = items.iter().map(|a| a.url.as_str()).collect();
    // 14:30 +03:00 is 11:30 UTC, after the 10:00 UTC budget story
    assert_eq!(urls, vec!["https://wire.example/budget", "https://wire.example/storm"]);
    assert_eq!(items[0].text, "The vote was 300 to 120.");
    assert_eq!(items[1].header, "Storm warning issued");
    assert_eq!(items[1].published_at, ts(2024, 1, 9, 11, 30));
    assert!(items.iter().all(|a| a.source_name == "wire"));
}

#[tokio::test]
async fn rss_source_syncs_incrementally() {
    let (backend, store) = memory_store();
    let src = Arc::new(RssSource::from_fixture("wire", FEED));
    let sched = SyncScheduler::new(vec![src as Arc<dyn Source>], store.clone(), SyncConfig::default());

    // real clock: fixture items are older than the lookback, so pin the
    // frontier by seeding one item first
    store
        .add_articles(vec![common::article(
            "wire",
            "https://wire.example/seed",
            ts(2024, 1, 9, 9, 0),
            "seed",
            "",
        )])
        .await
        .unwrap();

    let report = sched.run_cycle(ts(2024, 1, 10, 0, 0)).await;
    assert_eq!(report.stored(), 2);
    assert_eq!(backend.len(), 3);

    let again = sched.run_cycle(ts(2024, 1, 10, 0, 1)).await;
    assert_eq!(again.stored(), 0);
    assert_eq!(backend.len(), 3);
}
