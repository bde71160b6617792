//! lenta.ru adapter.
//!
//! The publisher has no feed with history, so the adapter walks the per-day
//! listing pages (`{base}/{yyyy}/{mm}/{dd}/`) in Moscow time and then fetches
//! each article page for its body. Listing items carry only a local `HH:MM`,
//! which is anchored to the listing's calendar day.

use std::time::Instant;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use metrics::histogram;
use once_cell::sync::OnceCell;
use regex::Regex;
use reqwest::StatusCode;

use crate::ingest::clean_text;
use crate::ingest::types::{sort_by_published_at, Article, FetchError, Source};

pub const SOURCE_NAME: &str = "lenta.ru";
pub const DEFAULT_BASE_URL: &str = "https://lenta.ru";

/// Europe/Moscow has been UTC+3 without DST since 2014.
const MOSCOW_OFFSET_SECS: i32 = 3 * 3600;

/// One listing item before its body is fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingItem {
    pub url: String,
    pub header: String,
    pub published_at: DateTime<Utc>,
}

/// What a day listing request produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DayListing {
    Articles(Vec<ListingItem>),
    /// Upstream answered 302: nothing was published that day (or it is not
    /// available yet).
    NoContent,
}

pub struct LentaRuSource {
    base_url: String,
    tz: FixedOffset,
    client: reqwest::Client,
}

impl LentaRuSource {
    pub fn new(base_url: &str) -> Result<Self> {
        let tz = FixedOffset::east_opt(MOSCOW_OFFSET_SECS)
            .ok_or_else(|| anyhow!("invalid moscow offset"))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            tz,
            client: super::http_client()?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn day_url(&self, day: NaiveDate) -> String {
        format!("{}/{}/", self.base_url, day.format("%Y/%m/%d"))
    }

    fn absolute_url(&self, href: &str) -> String {
        if href.starts_with("http://") || href.starts_with("https://") {
            href.to_string()
        } else if href.starts_with('/') {
            format!("{}{}", self.base_url, href)
        } else {
            format!("{}/{}", self.base_url, href)
        }
    }

    /// [`Source::fetch`] with an explicit clock.
    pub async fn fetch_at(
        &self,
        from: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Article>, FetchError> {
        if from > now {
            return Err(FetchError::FromInFuture { from, now });
        }

        let mut items = Vec::new();
        for day in local_days(from, now, self.tz) {
            match self.day_listing(day).await? {
                DayListing::Articles(mut v) => items.append(&mut v),
                DayListing::NoContent => {
                    tracing::debug!(source = SOURCE_NAME, %day, "no content for day");
                }
            }
        }

        // Items were listed per day; the watermark scan needs one global order.
        items.sort_by_key(|i| i.published_at);
        let items = retain_from(items, from, |i| i.published_at);

        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let text = self.article_text(&item.url).await?;
            out.push(Article {
                url: item.url,
                header: item.header,
                published_at: item.published_at,
                text,
                source_name: SOURCE_NAME.to_string(),
            });
        }
        sort_by_published_at(&mut out);

        tracing::debug!(source = SOURCE_NAME, %from, count = out.len(), "fetched articles");
        Ok(out)
    }

    /// Fetch and parse one day listing. 302 is the only "no content" signal.
    pub async fn day_listing(&self, day: NaiveDate) -> Result<DayListing, FetchError> {
        let url = self.day_url(day);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| FetchError::Http {
                url: url.clone(),
                source,
            })?;

        match resp.status() {
            StatusCode::OK => {}
            StatusCode::FOUND => return Ok(DayListing::NoContent),
            other => {
                tracing::warn!(source = SOURCE_NAME, %url, status = other.as_u16(), "unexpected listing status");
                return Err(FetchError::UnexpectedStatus {
                    url,
                    status: other.as_u16(),
                });
            }
        }

        let body = resp.text().await.map_err(|source| FetchError::Http {
            url: url.clone(),
            source,
        })?;

        let t0 = Instant::now();
        let items = parse_listing(&body, day, self.tz)?
            .into_iter()
            .map(|raw| ListingItem {
                url: self.absolute_url(&raw.href),
                header: raw.header,
                published_at: raw.published_at,
            })
            .collect();
        histogram!("source_parse_ms", "source" => SOURCE_NAME)
            .record(t0.elapsed().as_secs_f64() * 1_000.0);

        Ok(DayListing::Articles(items))
    }

    async fn article_text(&self, url: &str) -> Result<String, FetchError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Http {
                url: url.to_string(),
                source,
            })?;
        let status = resp.status();
        if status != StatusCode::OK {
            return Err(FetchError::UnexpectedStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = resp.text().await.map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })?;
        Ok(parse_article_text(&body))
    }
}

#[async_trait]
impl Source for LentaRuSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn fetch(&self, from: DateTime<Utc>) -> Result<Vec<Article>, FetchError> {
        self.fetch_at(from, Utc::now()).await
    }
}

/// Local calendar days from `from`'s day through `now`'s day, inclusive.
pub fn local_days(from: DateTime<Utc>, now: DateTime<Utc>, tz: FixedOffset) -> Vec<NaiveDate> {
    let last = now.with_timezone(&tz).date_naive();
    let mut day = from.with_timezone(&tz).date_naive();
    let mut out = Vec::new();
    while day <= last {
        out.push(day);
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }
    out
}

/// Anchor a listing `HH:MM` to `day` in `tz` and convert to UTC.
pub fn anchor_time(day: NaiveDate, hhmm: &str, tz: FixedOffset) -> Result<DateTime<Utc>, FetchError> {
    let parts: Vec<&str> = hhmm.trim().split(':').collect();
    if parts.len() != 2 {
        return Err(FetchError::parse(
            "listing time",
            format!("expected HH:MM, got {hhmm:?}"),
        ));
    }
    let hour: u32 = parts[0]
        .parse()
        .map_err(|e| FetchError::parse("listing hour", format!("{hhmm:?}: {e}")))?;
    if hour > 23 {
        return Err(FetchError::parse("listing hour", format!("{hour} is not below 24")));
    }
    let minute: u32 = parts[1]
        .parse()
        .map_err(|e| FetchError::parse("listing minute", format!("{hhmm:?}: {e}")))?;
    if minute > 59 {
        return Err(FetchError::parse("listing minute", format!("{minute} is not below 60")));
    }

    let time = NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| FetchError::parse("listing time", hhmm.to_string()))?;
    day.and_time(time)
        .and_local_timezone(tz)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| FetchError::parse("listing time", format!("{day} {hhmm} is ambiguous")))
}

/// Drop the prefix published before `from`. `items` must be ascending.
pub fn retain_from<T>(
    mut items: Vec<T>,
    from: DateTime<Utc>,
    published_at: impl Fn(&T) -> DateTime<Utc>,
) -> Vec<T> {
    match items.iter().position(|i| published_at(i) >= from) {
        Some(idx) => items.split_off(idx),
        None => Vec::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RawItem {
    href: String,
    header: String,
    published_at: DateTime<Utc>,
}

fn re(cell: &'static OnceCell<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).unwrap())
}

/// Parse the `.item.news` blocks of a day listing.
/// A block without a link or with a malformed time aborts the whole page.
fn parse_listing(html: &str, day: NaiveDate, tz: FixedOffset) -> Result<Vec<RawItem>, FetchError> {
    static RE_ITEM: OnceCell<Regex> = OnceCell::new();
    static RE_HREF: OnceCell<Regex> = OnceCell::new();
    static RE_TIME: OnceCell<Regex> = OnceCell::new();
    static RE_HEADER: OnceCell<Regex> = OnceCell::new();

    let re_item = re(&RE_ITEM, r#"(?is)<div[^>]*\bclass="[^"]*\bitem\s+news\b[^"]*"[^>]*>"#);
    let re_href = re(&RE_HREF, r#"(?is)<h3[^>]*>\s*<a[^>]*\bhref="([^"]+)""#);
    let re_time = re(&RE_TIME, r#"(?is)\bclass="[^"]*\btime\b[^"]*"[^>]*>(.*?)</"#);
    let re_header = re(&RE_HEADER, r#"(?is)<h3[^>]*>\s*<a[^>]*>\s*<span[^>]*>(.*?)</span>"#);

    let starts: Vec<usize> = re_item.find_iter(html).map(|m| m.start()).collect();
    let mut out = Vec::with_capacity(starts.len());

    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(html.len());
        let block = &html[start..end];

        let href = re_href
            .captures(block)
            .and_then(|c| c.get(1))
            .map(|m| html_escape::decode_html_entities(m.as_str().trim()).to_string())
            .filter(|h| !h.is_empty())
            .ok_or_else(|| FetchError::parse("listing item", "article link not found"))?;

        let time_str = re_time
            .captures(block)
            .and_then(|c| c.get(1))
            .map(|m| clean_text(m.as_str()))
            .unwrap_or_default();
        let published_at = anchor_time(day, &time_str, tz)?;

        let header = re_header
            .captures(block)
            .and_then(|c| c.get(1))
            .map(|m| clean_text(m.as_str()))
            .unwrap_or_default();

        out.push(RawItem {
            href,
            header,
            published_at,
        });
    }

    Ok(out)
}

/// Paragraphs that are direct children of the `.b-text` container, cleaned
/// and joined with `\n`. Nested blocks (embeds, quote boxes) are skipped.
/// A page without the container yields an empty body.
pub fn parse_article_text(html: &str) -> String {
    static RE_CONTAINER: OnceCell<Regex> = OnceCell::new();
    static RE_PARAGRAPH: OnceCell<Regex> = OnceCell::new();
    let re_container = re(&RE_CONTAINER, r#"(?is)<div[^>]*\bclass="[^"]*\bb-text\b[^"]*"[^>]*>"#);
    let re_paragraph = re(&RE_PARAGRAPH, r#"(?is)<p\b[^>]*>(.*?)</p>"#);

    let Some(open) = re_container.find(html) else {
        return String::new();
    };
    let body = container_direct_content(&html[open.end()..]);

    re_paragraph
        .captures_iter(&body)
        .filter_map(|c| c.get(1))
        .map(|m| clean_text(m.as_str()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Markup at depth one inside a container whose opening tag was already
/// consumed, up to the matching `</div>`.
fn container_direct_content(rest: &str) -> String {
    static RE_DIV: OnceCell<Regex> = OnceCell::new();
    let re_div = re(&RE_DIV, r"(?is)<div\b[^>]*>|</div\s*>");

    let mut depth = 1usize;
    let mut pos = 0;
    let mut out = String::new();
    for m in re_div.find_iter(rest) {
        if depth == 1 {
            out.push_str(&rest[pos..m.start()]);
        }
        pos = m.end();
        if m.as_str().starts_with("</") {
            depth -= 1;
            if depth == 0 {
                return out;
            }
        } else {
            depth += 1;
        }
    }
    // unterminated container: keep what follows at the top level
    if depth == 1 {
        out.push_str(&rest[pos..]);
    }
    out
}
