// src/keywords/mystem.rs
//! Yandex mystem lemmatizer invoked as a subprocess: `mystem -n -l`.
//! One lemma group per output line, alternatives separated by `|`,
//! uncertain guesses suffixed with `?`.

use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{normalize_term, KeywordError, KeywordExtractor, KeywordSet};

#[derive(Debug, Clone)]
pub struct MystemExtractor {
    bin_path: String,
}

impl MystemExtractor {
    pub fn new(bin_path: impl Into<String>) -> Self {
        Self {
            bin_path: bin_path.into(),
        }
    }

    pub fn bin_path(&self) -> &str {
        &self.bin_path
    }

    async fn run(&self, text: &str) -> Result<String, KeywordError> {
        let mut cmd = Command::new(&self.bin_path);
        cmd.args(["-n", "-l"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Keep terminal signals (Ctrl-C) away from the child.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| KeywordError::Spawn {
            bin: self.bin_path.clone(),
            source,
        })?;

        // Feed stdin from a separate task so a full stdout pipe cannot deadlock us.
        let writer = child.stdin.take().map(|mut stdin| {
            let input = text.to_owned();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    tracing::debug!(error = %e, "mystem stdin closed early");
                }
            })
        });

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| KeywordError::Spawn {
                bin: self.bin_path.clone(),
                source,
            })?;
        if let Some(w) = writer {
            let _ = w.await;
        }

        if !output.status.success() {
            return Err(KeywordError::Exit {
                bin: self.bin_path.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8(output.stdout)?)
    }
}

/// Parse `mystem -n -l` output into a keyword set.
pub fn parse_output(out: &str) -> KeywordSet {
    out.lines()
        .flat_map(|line| line.split('|'))
        .filter_map(normalize_term)
        .collect()
}

#[async_trait::async_trait]
impl KeywordExtractor for MystemExtractor {
    async fn extract_keywords(&self, text: &str) -> Result<KeywordSet, KeywordError> {
        if text.is_empty() {
            return Ok(KeywordSet::new());
        }
        let out = self.run(text).await?;
        Ok(parse_output(&out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_alternatives_and_guesses() {
        let out = "выборы|выбор\nбюджет??\nи\n\nпутин\n";
        let kws: Vec<_> = parse_output(out).into_iter().collect();
        assert_eq!(kws, vec!["бюджет", "выбор", "выборы", "путин"]);
    }

    #[tokio::test]
    async fn empty_text_never_spawns() {
        let ke = MystemExtractor::new("/definitely/not/here/mystem");
        let kws = ke.extract_keywords("").await.unwrap();
        assert!(kws.is_empty());
    }

    #[tokio::test]
    async fn missing_binary_is_spawn_error() {
        let ke = MystemExtractor::new("/definitely/not/here/mystem");
        let err = ke.extract_keywords("текст").await.unwrap_err();
        assert!(matches!(err, KeywordError::Spawn { .. }), "got {err:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_error() {
        let ke = MystemExtractor::new("false");
        let err = ke.extract_keywords("текст").await.unwrap_err();
        assert!(matches!(err, KeywordError::Exit { .. }), "got {err:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn silent_success_is_empty_set() {
        let ke = MystemExtractor::new("true");
        let kws = ke.extract_keywords("текст").await.unwrap();
        assert!(kws.is_empty());
    }
}
