//! Composition root: store, sources, scheduler and the optional web server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Mutex;

use crate::api::{self, AppState};
use crate::config::AppConfig;
use crate::ingest::providers::build_sources;
use crate::ingest::types::Source;
use crate::ingest::SyncScheduler;
use crate::keywords::build_extractor;
use crate::metrics::Metrics;
use crate::server::WebServer;
use crate::store::{open_backend, ArticleStore};

pub struct NewsAggregator {
    store: Arc<ArticleStore>,
    scheduler: SyncScheduler,
    bind_addr: Option<String>,
    grace: Duration,
    metrics: Option<Metrics>,
    web: Mutex<Option<WebServer>>,
}

impl NewsAggregator {
    /// Build everything from config. Any failure here is a startup failure.
    pub async fn from_config(cfg: &AppConfig) -> Result<Self> {
        let extractor = build_extractor(&cfg.keywords)?;
        let backend = open_backend(cfg).await?;
        let store = Arc::new(ArticleStore::new(backend, extractor).with_search_limit(cfg.search.limit));
        let sources = build_sources(&cfg.sources)?;

        let metrics = match Metrics::init() {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::warn!(error = %e, "metrics recorder not installed");
                None
            }
        };

        let mut agg = Self::with_parts(store, sources, cfg);
        agg.metrics = metrics;
        Ok(agg)
    }

    /// Assemble from already-built parts; no metrics endpoint is exposed.
    pub fn with_parts(store: Arc<ArticleStore>, sources: Vec<Arc<dyn Source>>, cfg: &AppConfig) -> Self {
        let scheduler = SyncScheduler::new(sources, store.clone(), cfg.sync);
        Self {
            store,
            scheduler,
            bind_addr: cfg.web.bind_addr.clone(),
            grace: Duration::from_secs(cfg.web.shutdown_grace_secs),
            metrics: None,
            web: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<ArticleStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &SyncScheduler {
        &self.scheduler
    }

    /// Address the web server actually bound, if it runs.
    pub async fn web_addr(&self) -> Option<std::net::SocketAddr> {
        self.web.lock().await.as_ref().map(WebServer::local_addr)
    }

    /// Start the web server (if configured) and then the sync scheduler.
    pub async fn start(&self) -> Result<()> {
        if let Some(addr) = self.bind_addr.as_deref() {
            let app = api::router(
                AppState {
                    store: self.store.clone(),
                },
                self.metrics.as_ref(),
            );
            let server = WebServer::start(addr, app, self.grace)
                .await
                .context("failed to start web server")?;
            *self.web.lock().await = Some(server);
        }

        self.scheduler
            .start()
            .context("failed to start sync scheduler")?;
        Ok(())
    }

    /// Stop the scheduler and the web server concurrently and wait for both.
    pub async fn stop(&self) {
        let web = self.web.lock().await.take();
        let web_stop = async move {
            if let Some(server) = web {
                server.stop().await;
            }
        };
        tokio::join!(self.scheduler.stop(), web_stop);
    }
}
