// src/ingest/providers/mod.rs
pub mod lentaru;
pub mod rss;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::SourceConfig;
use crate::ingest::types::Source;

pub use lentaru::LentaRuSource;
pub use rss::RssSource;

/// Build every configured source. Construction failure is fatal at startup.
pub fn build_sources(cfgs: &[SourceConfig]) -> Result<Vec<Arc<dyn Source>>> {
    let mut out: Vec<Arc<dyn Source>> = Vec::with_capacity(cfgs.len());
    for cfg in cfgs {
        let source: Arc<dyn Source> = match cfg {
            SourceConfig::LentaRu { base_url } => {
                let base = base_url.as_deref().unwrap_or(lentaru::DEFAULT_BASE_URL);
                Arc::new(LentaRuSource::new(base).context("creating lenta.ru source")?)
            }
            SourceConfig::Rss { name, url } => Arc::new(
                RssSource::from_url(name.clone(), url.clone())
                    .with_context(|| format!("creating rss source {name}"))?,
            ),
        };
        tracing::info!(source = source.name(), "source configured");
        out.push(source);
    }
    Ok(out)
}

/// Shared upstream client: no redirect following (a 302 carries meaning), bounded timeouts.
pub(crate) fn http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .connect_timeout(std::time::Duration::from_secs(10))
        .timeout(std::time::Duration::from_secs(30))
        .user_agent(concat!("news-aggregator/", env!("CARGO_PKG_VERSION")))
        .build()
}
