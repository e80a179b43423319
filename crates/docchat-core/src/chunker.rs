//! Page text chunking
//!
//! Similarity search only works when page text is cut the same way the
//! ingestion pipeline cut it, so the policy is injected through [`Chunker`].

use serde::Deserialize;

pub trait Chunker: Send + Sync {
    fn chunk_text(&self, text: &str) -> Vec<String>;
}

/// Overlapping windows of whitespace-separated words, re-joined with
/// single spaces.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WordWindowChunker {
    pub chunk_words: usize,
    pub overlap_words: usize,
}

impl Default for WordWindowChunker {
    fn default() -> Self {
        Self {
            chunk_words: 120,
            overlap_words: 20,
        }
    }
}

impl WordWindowChunker {
    pub fn new(chunk_words: usize, overlap_words: usize) -> Self {
        Self {
            chunk_words: chunk_words.max(1),
            overlap_words,
        }
    }
}

impl Chunker for WordWindowChunker {
    fn chunk_text(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return Vec::new();
        }

        let size = self.chunk_words.max(1);
        let step = size.saturating_sub(self.overlap_words).max(1);
        let mut chunks = Vec::new();
        let mut start = 0;
        while start < words.len() {
            let end = (start + size).min(words.len());
            chunks.push(words[start..end].join(" "));
            if end == words.len() {
                break;
            }
            start += step;
        }
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunker = WordWindowChunker::default();
        assert_eq!(
            chunker.chunk_text("  Hello\n  world  "),
            vec!["Hello world".to_string()]
        );
    }

    #[test]
    fn test_windows_overlap() {
        let text = (1..=10).map(|n| format!("w{n}")).collect::<Vec<_>>().join(" ");
        let chunks = WordWindowChunker::new(4, 1).chunk_text(&text);
        assert_eq!(
            chunks,
            vec!["w1 w2 w3 w4", "w4 w5 w6 w7", "w7 w8 w9 w10"]
        );
    }

    #[test]
    fn test_overlap_not_smaller_than_window_still_advances() {
        let chunks = WordWindowChunker::new(2, 5).chunk_text("a b c");
        assert_eq!(chunks, vec!["a b", "b c"]);
    }

    #[test]
    fn test_blank_text_has_no_chunks() {
        assert!(WordWindowChunker::default().chunk_text(" \n\t ").is_empty());
    }
}
