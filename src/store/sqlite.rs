//! SQLite [`ArticleBackend`] on sqlx.
//!
//! Keyword sets are stored denormalized as a JSON array next to each article;
//! all-terms matching runs one `json_each` probe per query term.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};

use super::{ArticleBackend, StoreError, TaggedArticle};
use crate::ingest::types::Article;
use crate::keywords::KeywordSet;

#[derive(Debug, Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Connect (creating the file and its parent directory if needed) and run migrations.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let in_memory = url.contains(":memory:");
        if !in_memory {
            if let Some(parent) = db_file_path(url).and_then(|p| p.parent().map(Path::to_path_buf)) {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(&parent).map_err(|e| {
                        StoreError::Database(sqlx::Error::Io(e))
                    })?;
                }
            }
        }

        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        // Every connection to `:memory:` is a separate database.
        let max_connections = if in_memory { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let backend = Self { pool };
        backend.run_migrations().await?;
        Ok(backend)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                url TEXT PRIMARY KEY,
                header TEXT NOT NULL,
                published_at INTEGER NOT NULL,
                text TEXT NOT NULL,
                source_name TEXT NOT NULL,
                keywords TEXT NOT NULL DEFAULT '[]'
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_articles_source_published ON articles(source_name, published_at DESC)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_articles_published ON articles(published_at DESC)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// `sqlite://data/news.sqlite?mode=rwc` -> `data/news.sqlite`
fn db_file_path(url: &str) -> Option<&Path> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() {
        return None;
    }
    Some(Path::new(path))
}

fn row_to_article(row: &SqliteRow) -> Result<Article, StoreError> {
    let secs: i64 = row.try_get("published_at")?;
    let published_at = DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| StoreError::Corrupt(format!("published_at out of range: {secs}")))?;
    Ok(Article {
        url: row.try_get("url")?,
        header: row.try_get("header")?,
        published_at,
        text: row.try_get("text")?,
        source_name: row.try_get("source_name")?,
    })
}

#[async_trait]
impl ArticleBackend for SqliteBackend {
    async fn insert_many(&self, articles: &[TaggedArticle]) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for t in articles {
            let keywords_json = serde_json::to_string(&t.keywords)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;
            let res = sqlx::query(
                r#"
                INSERT INTO articles (url, header, published_at, text, source_name, keywords)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(url) DO NOTHING
                "#,
            )
            .bind(&t.article.url)
            .bind(&t.article.header)
            .bind(t.article.published_at.timestamp())
            .bind(&t.article.text)
            .bind(&t.article.source_name)
            .bind(keywords_json)
            .execute(&mut *tx)
            .await?;
            inserted += res.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn latest_for_source(&self, source_name: &str) -> Result<Option<Article>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT url, header, published_at, text, source_name
            FROM articles
            WHERE source_name = ?
            ORDER BY published_at DESC
            LIMIT 1
            "#,
        )
        .bind(source_name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_article).transpose()
    }

    async fn find_by_keywords(
        &self,
        keywords: &KeywordSet,
        limit: usize,
    ) -> Result<Vec<Article>, StoreError> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT url, header, published_at, text, source_name FROM articles WHERE 1 = 1",
        );
        for kw in keywords {
            qb.push(" AND EXISTS (SELECT 1 FROM json_each(articles.keywords) WHERE json_each.value = ");
            qb.push_bind(kw.as_str());
            qb.push(")");
        }
        qb.push(" ORDER BY published_at DESC, url ASC LIMIT ");
        qb.push_bind(limit as i64);

        let rows = qb.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_article).collect()
    }

    async fn delete_published_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let res = sqlx::query("DELETE FROM articles WHERE published_at < ?")
            .bind(cutoff.timestamp())
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }
}
