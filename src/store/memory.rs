//! In-memory [`ArticleBackend`] for tests and database-less runs.
//!
//! Uses a `HashMap` keyed by URL behind `std::sync::RwLock`.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{ArticleBackend, StoreError, TaggedArticle};
use crate::ingest::types::Article;
use crate::keywords::KeywordSet;

#[derive(Debug, Default)]
pub struct MemoryBackend {
    rows: RwLock<HashMap<String, TaggedArticle>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().expect("memory store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every stored row, ascending by publish time then URL.
    pub fn snapshot(&self) -> Vec<TaggedArticle> {
        let rows = self.rows.read().expect("memory store lock poisoned");
        let mut v: Vec<_> = rows.values().cloned().collect();
        v.sort_by(|a, b| {
            a.article
                .published_at
                .cmp(&b.article.published_at)
                .then_with(|| a.article.url.cmp(&b.article.url))
        });
        v
    }
}

#[async_trait]
impl ArticleBackend for MemoryBackend {
    async fn insert_many(&self, articles: &[TaggedArticle]) -> Result<u64, StoreError> {
        let mut rows = self.rows.write().expect("memory store lock poisoned");
        let mut inserted = 0u64;
        for a in articles {
            if rows.contains_key(&a.article.url) {
                continue;
            }
            rows.insert(a.article.url.clone(), a.clone());
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn latest_for_source(&self, source_name: &str) -> Result<Option<Article>, StoreError> {
        let rows = self.rows.read().expect("memory store lock poisoned");
        Ok(rows
            .values()
            .filter(|r| r.article.source_name == source_name)
            .max_by_key(|r| r.article.published_at)
            .map(|r| r.article.clone()))
    }

    async fn find_by_keywords(
        &self,
        keywords: &KeywordSet,
        limit: usize,
    ) -> Result<Vec<Article>, StoreError> {
        let rows = self.rows.read().expect("memory store lock poisoned");
        let mut hits: Vec<&TaggedArticle> = rows
            .values()
            .filter(|r| keywords.is_subset(&r.keywords))
            .collect();
        hits.sort_by(|a, b| {
            b.article
                .published_at
                .cmp(&a.article.published_at)
                .then_with(|| a.article.url.cmp(&b.article.url))
        });
        Ok(hits
            .into_iter()
            .take(limit)
            .map(|r| r.article.clone())
            .collect())
    }

    async fn delete_published_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut rows = self.rows.write().expect("memory store lock poisoned");
        let before = rows.len();
        rows.retain(|_, r| r.article.published_at >= cutoff);
        Ok((before - rows.len()) as u64)
    }
}
