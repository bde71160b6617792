// src/ingest/mod.rs
pub mod providers;
pub mod scheduler;
pub mod types;

pub use scheduler::{CycleReport, SchedulerError, SchedulerState, SourceOutcome, SyncScheduler};
pub use types::{Article, FetchError, Source};

use chrono::{DateTime, Utc};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

use crate::config::SyncConfig;
use crate::store::{ArticleStore, StoreError};

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("sync_cycles_total", "Sync cycles that acquired the processing guard.");
        describe_counter!(
            "sync_cycles_skipped_total",
            "Ticks dropped because a cycle was still running."
        );
        describe_counter!(
            "sync_articles_fetched_total",
            "Articles returned by sources at or after their frontier."
        );
        describe_counter!(
            "sync_articles_stored_total",
            "Articles newly written to the store."
        );
        describe_counter!(
            "sync_source_errors_total",
            "Per-source frontier, fetch or store failures."
        );
        describe_counter!("sync_evicted_total", "Articles removed by retention.");
        describe_counter!("sync_eviction_errors_total", "Failed retention passes.");
        describe_gauge!("sync_last_cycle_ts", "Unix ts of the last completed cycle.");
        describe_histogram!("source_parse_ms", "Upstream document parse time in milliseconds.");
    });
}

/// Plain text from an HTML fragment: strip tags, decode entities, collapse whitespace.
pub fn clean_text(s: &str) -> String {
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    let stripped = re_tags.replace_all(s, "");

    let decoded = html_escape::decode_html_entities(&stripped);

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    re_ws.replace_all(&decoded, " ").trim().to_string()
}

/// Where the next fetch for `source_name` starts.
///
/// `latest + stride` when the store holds anything for the source, otherwise
/// `now - lookback`. Any store failure other than `NotFound` is returned and
/// the caller skips the source for this cycle.
pub async fn frontier(
    store: &ArticleStore,
    source_name: &str,
    now: DateTime<Utc>,
    cfg: &SyncConfig,
) -> Result<DateTime<Utc>, StoreError> {
    match store.latest_article(source_name).await {
        Ok(latest) => Ok(latest.published_at + cfg.frontier_stride()),
        Err(StoreError::NotFound) => Ok(now - cfg.lookback()),
        Err(e) => Err(e),
    }
}
