// src/ingest/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One published article. `url` is unique across the whole store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Article {
    pub url: String,
    pub header: String,
    pub published_at: DateTime<Utc>,
    pub text: String,       // paragraphs joined with '\n'
    pub source_name: String, // e.g. "lenta.ru"
}

impl Article {
    /// Text handed to the keyword extractor at ingestion time.
    pub fn keyword_text(&self) -> String {
        match (self.header.is_empty(), self.text.is_empty()) {
            (true, _) => self.text.clone(),
            (false, true) => self.header.clone(),
            (false, false) => format!("{}\n{}", self.header, self.text),
        }
    }
}

/// Stable ascending order by publish time; ties keep their listing order.
pub fn sort_by_published_at(articles: &mut [Article]) {
    articles.sort_by_key(|a| a.published_at);
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Caller error: the frontier lies ahead of the adapter's clock.
    #[error("from {from} is after now {now}")]
    FromInFuture {
        from: DateTime<Utc>,
        now: DateTime<Utc>,
    },

    #[error("http request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned unexpected status {status}")]
    UnexpectedStatus { url: String, status: u16 },

    /// Malformed upstream content; the whole fetch is abandoned.
    #[error("failed to parse {what}: {reason}")]
    Parse { what: String, reason: String },
}

impl FetchError {
    pub fn parse(what: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            what: what.into(),
            reason: reason.into(),
        }
    }

    /// Transient failures heal on the next tick from the same frontier.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Http { .. } | Self::UnexpectedStatus { .. })
    }
}

/// A publisher that can list everything published since a point in time.
#[async_trait::async_trait]
pub trait Source: Send + Sync {
    /// Stable identifier, also the store partition key.
    fn name(&self) -> &str;

    /// Articles with `published_at >= from`, ascending by publish time.
    /// An upstream "nothing here" is an empty vec, not an error.
    async fn fetch(&self, from: DateTime<Utc>) -> Result<Vec<Article>, FetchError>;
}
