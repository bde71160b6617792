// src/config.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_CONFIG_PATH: &str = "NEWS_AGGREGATOR_CONFIG_PATH";
pub const ENV_DATABASE_URL: &str = "NEWS_AGGREGATOR_DATABASE_URL";
pub const ENV_MYSTEM_BIN_PATH: &str = "NEWS_AGGREGATOR_MYSTEM_BIN_PATH";
pub const ENV_WEB_BIND_ADDR: &str = "NEWS_AGGREGATOR_WEB_SERVER_BIND_ADDR";
pub const DEFAULT_CONFIG_PATH: &str = "config/news_aggregator.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub keywords: KeywordsConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default = "default_sources")]
    pub sources: Vec<SourceConfig>,
}

/// Same values an empty config file produces.
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            keywords: KeywordsConfig::default(),
            sync: SyncConfig::default(),
            search: SearchConfig::default(),
            web: WebConfig::default(),
            sources: default_sources(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `sqlite://path/to/file.sqlite` or `memory:` for a process-local store.
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite://data/news.sqlite".to_string()
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    #[default]
    Mystem,
    Tokenizer,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct KeywordsConfig {
    #[serde(default)]
    pub extractor: ExtractorKind,
    #[serde(default)]
    pub mystem_bin_path: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Frontier for a source with nothing stored yet: `now - lookback`.
    #[serde(default = "default_lookback_secs")]
    pub lookback_secs: u64,
    /// Added to the latest stored publish time; matches upstream minute granularity.
    #[serde(default = "default_frontier_stride_secs")]
    pub frontier_stride_secs: u64,
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            lookback_secs: default_lookback_secs(),
            frontier_stride_secs: default_frontier_stride_secs(),
            retention_days: default_retention_days(),
        }
    }
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.lookback_secs as i64)
    }
    pub fn frontier_stride(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.frontier_stride_secs as i64)
    }
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.retention_days as i64)
    }
}

// Upper bounds keep the chrono arithmetic in the cycle far from overflow.
pub const MAX_INTERVAL_SECS: u64 = 24 * 3600;
pub const MAX_LOOKBACK_SECS: u64 = 30 * 24 * 3600;
pub const MAX_FRONTIER_STRIDE_SECS: u64 = 24 * 3600;
pub const MAX_RETENTION_DAYS: u64 = 3650;

fn default_interval_secs() -> u64 {
    60
}
fn default_lookback_secs() -> u64 {
    24 * 3600
}
fn default_frontier_stride_secs() -> u64 {
    60
}
fn default_retention_days() -> u64 {
    7
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_limit")]
    pub limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: default_search_limit(),
        }
    }
}

fn default_search_limit() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    /// Web server is disabled when unset.
    #[serde(default)]
    pub bind_addr: Option<String>,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: None,
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind")]
pub enum SourceConfig {
    #[serde(rename = "lenta.ru")]
    LentaRu {
        #[serde(default)]
        base_url: Option<String>,
    },
    #[serde(rename = "rss")]
    Rss { name: String, url: String },
}

impl SourceConfig {
    pub fn name(&self) -> &str {
        match self {
            SourceConfig::LentaRu { .. } => crate::ingest::providers::lentaru::SOURCE_NAME,
            SourceConfig::Rss { name, .. } => name,
        }
    }
}

fn default_sources() -> Vec<SourceConfig> {
    vec![SourceConfig::LentaRu { base_url: None }]
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: AppConfig = toml::from_str(s).context("parsing news aggregator config")?;
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Resolve config the way the binary does:
    /// 1) $NEWS_AGGREGATOR_CONFIG_PATH (must exist)
    /// 2) config/news_aggregator.toml
    /// 3) built-in defaults
    ///
    /// then apply env overrides and validate.
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default_p.exists() {
                Self::load_from(&default_p)?
            } else {
                Self::default()
            }
        };
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(v) = non_empty_env(ENV_DATABASE_URL) {
            self.database.url = v;
        }
        if let Some(v) = non_empty_env(ENV_MYSTEM_BIN_PATH) {
            self.keywords.mystem_bin_path = Some(v);
        }
        if let Some(v) = non_empty_env(ENV_WEB_BIND_ADDR) {
            self.web.bind_addr = Some(v);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            bail!("database.url must not be empty");
        }
        if self.keywords.extractor == ExtractorKind::Mystem
            && self
                .keywords
                .mystem_bin_path
                .as_deref()
                .map_or(true, |p| p.trim().is_empty())
        {
            bail!("keywords.mystem_bin_path (or {ENV_MYSTEM_BIN_PATH}) is required for the mystem extractor");
        }
        self.validate_sync()?;
        if self.search.limit == 0 {
            bail!("search.limit must be >= 1");
        }

        let mut seen = HashSet::new();
        for s in &self.sources {
            let name = s.name().trim();
            if name.is_empty() {
                bail!("source name must not be empty");
            }
            if !seen.insert(name.to_string()) {
                bail!("duplicate source name: {name}");
            }
        }
        Ok(())
    }

    fn validate_sync(&self) -> Result<()> {
        let sync = &self.sync;
        if sync.interval_secs == 0 || sync.interval_secs > MAX_INTERVAL_SECS {
            bail!("sync.interval_secs must be in 1..={MAX_INTERVAL_SECS}");
        }
        if sync.frontier_stride_secs == 0 || sync.frontier_stride_secs > MAX_FRONTIER_STRIDE_SECS {
            bail!("sync.frontier_stride_secs must be in 1..={MAX_FRONTIER_STRIDE_SECS}");
        }
        if sync.lookback_secs == 0 || sync.lookback_secs > MAX_LOOKBACK_SECS {
            bail!("sync.lookback_secs must be in 1..={MAX_LOOKBACK_SECS}");
        }
        if sync.retention_days == 0 || sync.retention_days > MAX_RETENTION_DAYS {
            bail!("sync.retention_days must be in 1..={MAX_RETENTION_DAYS}");
        }
        // Eviction must never remove the newest article inside the lookback
        // window, or that source loses its frontier.
        if sync.retention() <= sync.lookback() {
            bail!(
                "sync.retention_days ({}d) must exceed sync.lookback_secs ({}s)",
                sync.retention_days,
                sync.lookback_secs
            );
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
