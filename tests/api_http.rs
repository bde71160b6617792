// tests/api_http.rs
mod common;

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use common::{article, memory_store, ts, BrokenExtractor};
use news_aggregator::api::{router, AppState, SearchResponse};
use news_aggregator::store::MemoryBackend;
use news_aggregator::ArticleStore;
use tower::ServiceExt; // for `oneshot`

async fn get(app: axum::Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let req = Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("failed to build request");
    let resp = app.oneshot(req).await.expect("request failed");
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap().to_vec();
    (status, headers, body)
}

async fn seeded_app() -> axum::Router {
    let (_backend, store) = memory_store();
    store
        .add_articles(vec![
            article(
                "lenta.ru",
                "https://lenta.ru/news/1/",
                ts(2024, 1, 9, 10, 0),
                "Budget approved",
                "Parliament voted.\nThe budget grows.",
            ),
            article(
                "lenta.ru",
                "https://lenta.ru/news/2/",
                ts(2024, 1, 9, 11, 0),
                "Storm warning",
                "Snow expected.",
            ),
        ])
        .await
        .unwrap();
    router(AppState { store }, None)
}

#[tokio::test]
async fn health_is_ok() {
    let (status, _, body) = get(seeded_app().await, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");
}

#[tokio::test]
async fn root_redirects_to_articles() {
    let (status, headers, _) = get(seeded_app().await, "/").await;
    assert_eq!(status, StatusCode::PERMANENT_REDIRECT);
    assert_eq!(headers.get(header::LOCATION).unwrap(), "/articles");
}

#[tokio::test]
async fn articles_without_query_lists_everything() {
    let (status, _, body) = get(seeded_app().await, "/articles").await;
    assert_eq!(status, StatusCode::OK);
    let resp: SearchResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(resp.query, "");
    assert_eq!(resp.articles.len(), 2);
    assert_eq!(resp.articles[0].url, "https://lenta.ru/news/2/");
}

#[tokio::test]
async fn articles_query_matches_and_splits_paragraphs() {
    let (status, _, body) = get(seeded_app().await, "/articles?q=budget%20parliament").await;
    assert_eq!(status, StatusCode::OK);
    let resp: SearchResponse = serde_json::from_slice(&body).unwrap();
    assert_eq!(resp.query, "budget parliament");
    assert_eq!(resp.articles.len(), 1);
    let a = &resp.articles[0];
    assert_eq!(a.header, "Budget approved");
    assert_eq!(a.source_name, "lenta.ru");
    assert_eq!(a.published_at, ts(2024, 1, 9, 10, 0));
    assert_eq!(a.paragraphs, vec!["Parliament voted.", "The budget grows."]);
}

#[tokio::test]
async fn no_match_is_empty_list() {
    let (status, _, body) = get(seeded_app().await, "/articles?q=volcano").await;
    assert_eq!(status, StatusCode::OK);
    let resp: SearchResponse = serde_json::from_slice(&body).unwrap();
    assert!(resp.articles.is_empty());
}

#[tokio::test]
async fn keyword_failure_is_bad_gateway() {
    let store = Arc::new(ArticleStore::new(
        Arc::new(MemoryBackend::new()),
        Arc::new(BrokenExtractor),
    ));
    let app = router(AppState { store }, None);
    let (status, _, body) = get(app, "/articles?q=budget").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(v["error"]["code"], "keyword_extraction_failed");
}

#[tokio::test]
async fn metrics_route_is_mounted_when_installed() {
    let metrics = news_aggregator::metrics::Metrics::init().unwrap();
    let (_backend, store) = memory_store();
    let app = router(AppState { store }, Some(&metrics));
    let (status, _, _) = get(app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
}
