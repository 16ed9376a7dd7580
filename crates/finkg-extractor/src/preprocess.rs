//! Text preprocessing
//!
//! Cleans raw news text and splits it into sentences suitable for
//! per-sentence extraction.

use std::path::Path;

use regex::Regex;
use tracing::{error, info};

use finkg_core::{FinkgError, PipelineConfig, Result};

/// Cleanup rules applied in order: (pattern, replacement)
const CLEANUP_RULES: &[(&str, &str)] = &[
    // URLs
    (r"(?:https?://|www\.)\S+", ""),
    // Anything but word characters, whitespace and sentence punctuation.
    // `$` and `%` survive so monetary amounts reach the extractor intact.
    (r"[^\w\s.,!?$%-]", " "),
];

/// Splits text into cleaned sentences
pub struct Preprocessor {
    max_sentences: usize,
    min_sentence_length: usize,
    batch_size: usize,
    cleanup: Vec<(Regex, &'static str)>,
}

impl Preprocessor {
    pub fn new(config: &PipelineConfig) -> Self {
        let cleanup = CLEANUP_RULES
            .iter()
            .filter_map(|(pattern, replacement)| {
                Regex::new(pattern).ok().map(|regex| (regex, *replacement))
            })
            .collect();

        Self {
            max_sentences: config.max_sentences,
            min_sentence_length: config.min_sentence_length,
            batch_size: config.batch_size.max(1),
            cleanup,
        }
    }

    /// Read and preprocess a UTF-8 text file
    pub fn preprocess_file(&self, path: &Path) -> Result<Vec<String>> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            error!(path = %path.display(), error = %e, "Failed to read input file");
            FinkgError::Input(format!("Cannot read {}: {e}", path.display()))
        })?;

        info!(path = %path.display(), chars = text.len(), "Loaded input text");
        Ok(self.preprocess_text(&text))
    }

    /// Clean text and split it into sentences
    pub fn preprocess_text(&self, text: &str) -> Vec<String> {
        let cleaned = self.clean_text(text);

        let sentences: Vec<String> = split_sentences(&cleaned)
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| s.chars().count() > self.min_sentence_length)
            .take(self.max_sentences)
            .collect();

        info!(count = sentences.len(), "Preprocessed text into sentences");
        sentences
    }

    /// Chunk sentences for extraction; `None` uses the configured size
    pub fn batch_sentences(&self, sentences: &[String], batch_size: Option<usize>) -> Vec<Vec<String>> {
        let size = batch_size.unwrap_or(self.batch_size).max(1);
        sentences.chunks(size).map(<[String]>::to_vec).collect()
    }

    fn clean_text(&self, text: &str) -> String {
        let mut text = text.to_string();
        for (regex, replacement) in &self.cleanup {
            text = regex.replace_all(&text, *replacement).into_owned();
        }
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// Split after `.`, `!` or `?` when followed by whitespace
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        if let Some(&(next_index, next)) = chars.peek() {
            if next.is_whitespace() {
                sentences.push(&text[start..next_index]);
                start = next_index;
            }
        }
    }

    if start < text.len() {
        sentences.push(&text[start..]);
    }

    sentences
}

// ============================================================================
// Tests
// ============================================================================
