// tests/common/mod.rs
// Shared fakes for integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use news_aggregator::keywords::{KeywordError, TokenizerExtractor};
use news_aggregator::store::MemoryBackend;
use news_aggregator::{Article, ArticleStore, FetchError, KeywordExtractor, KeywordSet, Source};
use parking_lot::Mutex;

pub fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
}

pub fn article(source: &str, url: &str, at: DateTime<Utc>, header: &str, text: &str) -> Article {
    Article {
        url: url.to_string(),
        header: header.to_string(),
        published_at: at,
        text: text.to_string(),
        source_name: source.to_string(),
    }
}

pub fn memory_store() -> (Arc<MemoryBackend>, Arc<ArticleStore>) {
    let backend = Arc::new(MemoryBackend::new());
    let store = Arc::new(ArticleStore::new(
        backend.clone(),
        Arc::new(TokenizerExtractor::new()),
    ));
    (backend, store)
}

/// Source that replays a fixed catalogue and records every frontier it was asked for.
///
/// With `honest` it filters the catalogue to `>= from` like a real adapter;
/// otherwise it returns everything.
pub struct ScriptedSource {
    name: String,
    catalogue: Mutex<Vec<Article>>,
    honest: bool,
    fail_with: Mutex<Option<String>>,
    pub calls: Mutex<Vec<DateTime<Utc>>>,
}

impl ScriptedSource {
    pub fn new(name: &str, honest: bool) -> Self {
        Self {
            name: name.to_string(),
            catalogue: Mutex::new(Vec::new()),
            honest,
            fail_with: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn publish(&self, a: Article) {
        self.catalogue.lock().push(a);
    }

    pub fn fail(&self, reason: Option<&str>) {
        *self.fail_with.lock() = reason.map(str::to_string);
    }

    pub fn froms(&self) -> Vec<DateTime<Utc>> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Source for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, from: DateTime<Utc>) -> Result<Vec<Article>, FetchError> {
        self.calls.lock().push(from);
        if let Some(reason) = self.fail_with.lock().clone() {
            return Err(FetchError::parse("scripted", reason));
        }
        let mut out: Vec<Article> = self
            .catalogue
            .lock()
            .iter()
            .filter(|a| !self.honest || a.published_at >= from)
            .cloned()
            .collect();
        out.sort_by_key(|a| a.published_at);
        Ok(out)
    }
}

/// Keyword extractor that always fails, like a missing mystem binary.
pub struct BrokenExtractor;

#[async_trait]
impl KeywordExtractor for BrokenExtractor {
    async fn extract_keywords(&self, _text: &str) -> Result<KeywordSet, KeywordError> {
        Err(KeywordError::Spawn {
            bin: "/missing/mystem".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        })
    }
}
