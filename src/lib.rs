// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod aggregator;
pub mod api;
pub mod config;
pub mod ingest;
pub mod keywords;
pub mod metrics;
pub mod server;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::aggregator::NewsAggregator;
pub use crate::api::router;
pub use crate::config::AppConfig;
pub use crate::ingest::types::{Article, FetchError, Source};
pub use crate::ingest::{CycleReport, SchedulerState, SourceOutcome, SyncScheduler};
pub use crate::keywords::{KeywordExtractor, KeywordSet};
pub use crate::store::{ArticleStore, SearchError, StoreError};
