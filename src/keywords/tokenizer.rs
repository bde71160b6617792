// src/keywords/tokenizer.rs
//! In-process extractor: Unicode word split, no lemmatization.
//! Useful where the mystem binary is not installed.

use once_cell::sync::OnceCell;
use regex::Regex;

use super::{normalize_term, KeywordError, KeywordExtractor, KeywordSet};

#[derive(Debug, Default, Clone)]
pub struct TokenizerExtractor;

impl TokenizerExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn tokenize(text: &str) -> KeywordSet {
        static RE_WORD: OnceCell<Regex> = OnceCell::new();
        // \w covers letters, digits and '_'; (?u) enables Unicode
        let re = RE_WORD.get_or_init(|| Regex::new(r"(?u)\b\w+\b").expect("word regex"));

        re.find_iter(text)
            .filter_map(|m| normalize_term(m.as_str()))
            .filter(|t| t.chars().count() > 1)
            .collect()
    }
}

#[async_trait::async_trait]
impl KeywordExtractor for TokenizerExtractor {
    async fn extract_keywords(&self, text: &str) -> Result<KeywordSet, KeywordError> {
        if text.is_empty() {
            return Ok(KeywordSet::new());
        }
        Ok(Self::tokenize(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_lowercases_and_drops_stop_words() {
        let kws = TokenizerExtractor::tokenize("The Budget and the ELECTION, budget again!");
        let v: Vec<_> = kws.into_iter().collect();
        assert_eq!(v, vec!["again", "budget", "election"]);
    }

    #[test]
    fn handles_cyrillic() {
        let kws = TokenizerExtractor::tokenize("Выборы и бюджет: что дальше?");
        assert!(kws.contains("выборы"));
        assert!(kws.contains("бюджет"));
        assert!(kws.contains("дальше"));
        assert!(!kws.contains("и"));
        assert!(!kws.contains("что"));
    }

    #[tokio::test]
    async fn empty_text_is_empty_set() {
        let kws = TokenizerExtractor::new().extract_keywords("").await.unwrap();
        assert!(kws.is_empty());
    }
}
