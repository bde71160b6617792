//! Keyword extraction: free text in, normalized term set out.
//!
//! The same extractor tags articles at ingestion and tags the search phrase
//! at query time, so both sides agree on normalization.

pub mod mystem;
pub mod stopwords;
pub mod tokenizer;

use std::collections::BTreeSet;
use std::sync::Arc;

pub use mystem::MystemExtractor;
pub use stopwords::is_stop_word;
pub use tokenizer::TokenizerExtractor;

use crate::config::{ExtractorKind, KeywordsConfig};

pub type KeywordSet = BTreeSet<String>;

#[derive(Debug, thiserror::Error)]
pub enum KeywordError {
    #[error("failed to run keyword tool {bin}: {source}")]
    Spawn {
        bin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("keyword tool {bin} exited with {status}: {stderr}")]
    Exit {
        bin: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("keyword tool produced non-UTF-8 output")]
    Encoding(#[from] std::string::FromUtf8Error),
}

#[async_trait::async_trait]
pub trait KeywordExtractor: Send + Sync {
    /// Empty input yields an empty set without touching the backend.
    async fn extract_keywords(&self, text: &str) -> Result<KeywordSet, KeywordError>;
}

pub type DynKeywordExtractor = Arc<dyn KeywordExtractor>;

/// Lowercase, trim and drop stop words / empties. Shared by every extractor.
pub(crate) fn normalize_term(raw: &str) -> Option<String> {
    let t = raw.trim().trim_end_matches('?').trim().to_lowercase();
    if t.is_empty() || is_stop_word(&t) {
        return None;
    }
    Some(t)
}

/// Build the configured extractor. A mystem extractor without a binary
/// path is rejected earlier by config validation.
pub fn build_extractor(cfg: &KeywordsConfig) -> anyhow::Result<DynKeywordExtractor> {
    match cfg.extractor {
        ExtractorKind::Mystem => {
            let bin = cfg
                .mystem_bin_path
                .clone()
                .ok_or_else(|| anyhow::anyhow!("keywords.mystem_bin_path is required for mystem"))?;
            Ok(Arc::new(MystemExtractor::new(bin)))
        }
        ExtractorKind::Tokenizer => Ok(Arc::new(TokenizerExtractor::new())),
    }
}
