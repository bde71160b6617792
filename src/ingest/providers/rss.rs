use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::histogram;
use quick_xml::de::from_str;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::ingest::clean_text;
use crate::ingest::types::{sort_by_published_at, Article, FetchError, Source};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

/// Generic RSS 2.0 feed. The feed only exposes its most recent window, so
/// everything older than the frontier is filtered locally.
pub struct RssSource {
    name: String,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl RssSource {
    /// Serve a fixed document; used by tests and offline runs.
    pub fn from_fixture(name: impl Into<String>, xml: &str) -> Self {
        Self {
            name: name.into(),
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    pub fn from_url(name: impl Into<String>, url: impl Into<String>) -> reqwest::Result<Self> {
        Ok(Self {
            name: name.into(),
            mode: Mode::Http {
                url: url.into(),
                client: super::http_client()?,
            },
        })
    }

    fn parse_items_from_str(&self, s: &str) -> Result<Vec<Article>, FetchError> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean)
            .map_err(|e| FetchError::parse(format!("{} rss xml", self.name), e.to_string()))?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let url = it
                .link
                .as_deref()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .ok_or_else(|| FetchError::parse(format!("{} rss item", self.name), "missing link"))?
                .to_string();
            let published_at = it
                .pub_date
                .as_deref()
                .ok_or_else(|| FetchError::parse(format!("{} rss item", self.name), "missing pubDate"))
                .and_then(parse_rfc2822)?;

            out.push(Article {
                url,
                header: clean_text(it.title.as_deref().unwrap_or_default()),
                published_at,
                text: clean_text(it.description.as_deref().unwrap_or_default()),
                source_name: self.name.clone(),
            });
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("source_parse_ms", "source" => self.name.clone()).record(ms);
        Ok(out)
    }

    async fn load(&self) -> Result<String, FetchError> {
        match &self.mode {
            Mode::Fixture(s) => Ok(s.clone()),
            Mode::Http { url, client } => {
                let resp = client.get(url).send().await.map_err(|source| FetchError::Http {
                    url: url.clone(),
                    source,
                })?;
                let status = resp.status();
                if status != StatusCode::OK {
                    return Err(FetchError::UnexpectedStatus {
                        url: url.clone(),
                        status: status.as_u16(),
                    });
                }
                resp.text().await.map_err(|source| FetchError::Http {
                    url: url.clone(),
                    source,
                })
            }
        }
    }
}

#[async_trait]
impl Source for RssSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, from: DateTime<Utc>) -> Result<Vec<Article>, FetchError> {
        let now = Utc::now();
        if from > now {
            return Err(FetchError::FromInFuture { from, now });
        }
        let body = self.load().await?;
        let mut items = self.parse_items_from_str(&body)?;
        items.retain(|a| a.published_at >= from);
        sort_by_published_at(&mut items);
        Ok(items)
    }
}

fn parse_rfc2822(ts: &str) -> Result<DateTime<Utc>, FetchError> {
    DateTime::parse_from_rfc2822(ts.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| FetchError::parse("rss pubDate", format!("{ts:?}: {e}")))
}

/// quick-xml only knows the XML entities; feeds routinely carry HTML ones.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&laquo;", "\u{00AB}")
        .replace("&raquo;", "\u{00BB}")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
