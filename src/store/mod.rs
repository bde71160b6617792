//! Persistence gateway for articles.
//!
//! [`ArticleStore`] is the only component that reads or writes the stored
//! article set. It tags articles with keywords on the way in and turns a
//! free-text query into a keyword-set match on the way out. The storage engine
//! itself sits behind [`ArticleBackend`], so SQLite and the in-memory backend
//! share the same gateway semantics.
//!
//! | Operation | Semantics |
//! |-----------|-----------|
//! | [`add_articles`](ArticleStore::add_articles) | tag every article, then insert the batch |
//! | [`latest_article`](ArticleStore::latest_article) | max `published_at` for one source |
//! | [`find_articles`](ArticleStore::find_articles) | all-terms keyword match, newest first, capped |
//! | [`remove_old_articles`](ArticleStore::remove_old_articles) | delete `published_at < cutoff` |

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;

use crate::config::AppConfig;
use crate::ingest::types::Article;
use crate::keywords::{DynKeywordExtractor, KeywordError, KeywordSet};

pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;

/// An article together with the keyword set computed at insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedArticle {
    pub article: Article,
    pub keywords: KeywordSet,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Not a failure for the frontier logic: the source has nothing stored yet.
    #[error("not found")]
    NotFound,

    #[error("failed to extract keywords: {0}")]
    Keywords(#[from] KeywordError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt stored row: {0}")]
    Corrupt(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("failed to extract keywords from query: {0}")]
    Keywords(#[source] KeywordError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Storage engine contract. Implementations must tolerate concurrent calls
/// from per-source tasks and the eviction step.
#[async_trait]
pub trait ArticleBackend: Send + Sync {
    /// Insert all rows; an article whose URL is already stored is skipped.
    /// Returns the number of rows actually inserted.
    async fn insert_many(&self, articles: &[TaggedArticle]) -> Result<u64, StoreError>;

    async fn latest_for_source(&self, source_name: &str) -> Result<Option<Article>, StoreError>;

    /// Articles whose keyword set contains every term of `keywords`
    /// (all articles when empty), newest first, at most `limit`.
    async fn find_by_keywords(
        &self,
        keywords: &KeywordSet,
        limit: usize,
    ) -> Result<Vec<Article>, StoreError>;

    async fn delete_published_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

pub type DynArticleBackend = Arc<dyn ArticleBackend>;

pub struct ArticleStore {
    backend: DynArticleBackend,
    keywords: DynKeywordExtractor,
    search_limit: usize,
}

impl ArticleStore {
    pub const DEFAULT_SEARCH_LIMIT: usize = 100;

    pub fn new(backend: DynArticleBackend, keywords: DynKeywordExtractor) -> Self {
        Self {
            backend,
            keywords,
            search_limit: Self::DEFAULT_SEARCH_LIMIT,
        }
    }

    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit.max(1);
        self
    }

    pub fn search_limit(&self) -> usize {
        self.search_limit
    }

    /// Tag every article first; a single extraction failure aborts the batch
    /// before anything reaches the backend.
    pub async fn add_articles(&self, articles: Vec<Article>) -> Result<u64, StoreError> {
        if articles.is_empty() {
            return Ok(0);
        }

        let mut tagged = Vec::with_capacity(articles.len());
        for article in articles {
            let keywords = self
                .keywords
                .extract_keywords(&article.keyword_text())
                .await?;
            tagged.push(TaggedArticle { article, keywords });
        }

        let inserted = self.backend.insert_many(&tagged).await?;
        let skipped = tagged.len() as u64 - inserted.min(tagged.len() as u64);
        if skipped > 0 {
            tracing::debug!(skipped, "articles already stored, skipped");
        }
        counter!("store_articles_inserted_total").increment(inserted);
        Ok(inserted)
    }

    pub async fn latest_article(&self, source_name: &str) -> Result<Article, StoreError> {
        self.backend
            .latest_for_source(source_name)
            .await?
            .ok_or(StoreError::NotFound)
    }

    /// Empty result is a normal answer; only keyword or storage failures are errors.
    pub async fn find_articles(&self, query: &str) -> Result<Vec<Article>, SearchError> {
        let keywords = self
            .keywords
            .extract_keywords(query.trim())
            .await
            .map_err(SearchError::Keywords)?;
        let found = self
            .backend
            .find_by_keywords(&keywords, self.search_limit)
            .await?;
        Ok(found)
    }

    /// Removes articles published strictly before `cutoff`.
    pub async fn remove_old_articles(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        self.backend.delete_published_before(cutoff).await
    }
}

/// Open the configured backend. `memory:` keeps everything in-process;
/// anything else is a SQLite URL. Failure here is fatal at startup.
pub async fn open_backend(cfg: &AppConfig) -> anyhow::Result<DynArticleBackend> {
    let url = cfg.database.url.trim();
    if url == "memory:" {
        tracing::warn!("using in-memory article store, nothing survives a restart");
        return Ok(Arc::new(MemoryBackend::new()));
    }
    let backend = SqliteBackend::connect(url)
        .await
        .with_context(|| format!("connecting to article store at {url}"))?;
    Ok(Arc::new(backend))
}
