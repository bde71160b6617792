//! JSON query surface over the article store.
//!
//! | Route | Response |
//! |-------|----------|
//! | `GET /` | 308 to `/articles` |
//! | `GET /articles?q=` | matching articles, newest first |
//! | `GET /health` | `OK` |
//! | `GET /metrics` | Prometheus exposition (when metrics are installed) |

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::ingest::types::Article;
use crate::metrics::Metrics;
use crate::store::{ArticleStore, SearchError};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<ArticleStore>,
}

pub fn router(state: AppState, metrics: Option<&Metrics>) -> Router {
    let mut app = Router::new()
        .route("/", get(|| async { Redirect::permanent("/articles") }))
        .route("/articles", get(find_articles))
        .route("/health", get(|| async { "OK" }));
    if let Some(m) = metrics {
        app = app.merge(m.router());
    }
    app.layer(CorsLayer::very_permissive()).with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArticleView {
    pub url: String,
    pub header: String,
    pub source_name: String,
    pub published_at: DateTime<Utc>,
    pub paragraphs: Vec<String>,
}

impl From<Article> for ArticleView {
    fn from(a: Article) -> Self {
        let paragraphs = a
            .text
            .split('\n')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            url: a.url,
            header: a.header,
            source_name: a.source_name,
            published_at: a.published_at,
            paragraphs,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub articles: Vec<ArticleView>,
}

async fn find_articles(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, AppError> {
    let articles = state.store.find_articles(&params.q).await.map_err(|e| {
        tracing::error!(query = %params.q, error = %e, "failed to find articles");
        AppError::from(e)
    })?;

    Ok(Json(SearchResponse {
        query: params.q,
        articles: articles.into_iter().map(ArticleView::from).collect(),
    }))
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable, e.g. `"keyword_extraction_failed"`.
    code: String,
    message: String,
}

pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl From<SearchError> for AppError {
    fn from(e: SearchError) -> Self {
        match e {
            SearchError::Keywords(_) => AppError {
                status: StatusCode::BAD_GATEWAY,
                code: "keyword_extraction_failed",
                message: e.to_string(),
            },
            SearchError::Store(_) => AppError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                code: "store_error",
                message: e.to_string(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}
