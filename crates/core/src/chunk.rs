use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{FinError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub index: usize,
    pub text: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Chunk ids are a pure function of `(document_id, index)` so re-chunking a
/// document with the same parameters upserts over the previous entries.
pub fn chunk_id(document_id: &str, index: usize) -> String {
    format!("doc_{document_id}_chunk_{index}")
}

#[derive(Debug)]
pub struct Chunker {
    config: ChunkConfig,
}

impl Chunker {
    pub fn new(config: ChunkConfig) -> Result<Self> {
        if config.chunk_size == 0 {
            return Err(FinError::InvalidConfig(
                "chunk_size must be positive".to_string(),
            ));
        }
        if config.overlap >= config.chunk_size {
            return Err(FinError::InvalidConfig(format!(
                "overlap {} must be smaller than chunk_size {}",
                config.overlap, config.chunk_size
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> ChunkConfig {
        self.config
    }

    /// Splits `text` into overlapping windows of `chunk_size` characters,
    /// preferring to cut at a sentence boundary in the back half of the
    /// window. Whitespace-only windows are dropped.
    pub fn chunk(&self, document_id: &str, text: &str) -> Vec<Chunk> {
        let chars: Vec<char> = text.chars().collect();
        let size = self.config.chunk_size;
        if chars.len() <= size {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Vec::new();
            }
            return vec![build_chunk(document_id, 0, trimmed)];
        }

        let mut chunks = Vec::new();
        let mut start = 0usize;
        let mut index = 0usize;
        while start < chars.len() {
            let window_end = (start + size).min(chars.len());
            let mut end = window_end;
            if window_end < chars.len() {
                // Only snap back when the boundary is past the midpoint, so
                // chunks never collapse to a few characters.
                if let Some(stop) = rfind(&chars, '.', start, window_end) {
                    if stop > start + size / 2 {
                        end = stop + 1;
                    }
                }
            }
            let window: String = chars[start..end].iter().collect();
            let trimmed = window.trim();
            if !trimmed.is_empty() {
                chunks.push(build_chunk(document_id, index, trimmed));
                index += 1;
            }
            if end == chars.len() {
                break;
            }
            let next = end.saturating_sub(self.config.overlap);
            // A snapped boundary can land inside the overlap span when the
            // overlap exceeds half the window; fall forward to the unsnapped
            // end so the loop always makes progress.
            start = if next > start { next } else { end };
        }
        chunks
    }
}

fn build_chunk(document_id: &str, index: usize, text: &str) -> Chunk {
    Chunk {
        id: chunk_id(document_id, index),
        document_id: document_id.to_string(),
        index,
        text: text.to_string(),
        metadata: HashMap::new(),
    }
}

fn rfind(chars: &[char], needle: char, start: usize, end: usize) -> Option<usize> {
    chars[start..end]
        .iter()
        .rposition(|c| *c == needle)
        .map(|pos| start + pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_trimmed_chunk() {
        let chunker = Chunker::new(ChunkConfig::default()).unwrap();
        let chunks = chunker.chunk("10k", "  Revenue grew modestly.  ");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Revenue grew modestly.");
        assert_eq!(chunks[0].id, "doc_10k_chunk_0");
        assert_eq!(chunks[0].index, 0);
    }

    #[test]
    fn whitespace_only_input_yields_no_chunks() {
        let chunker = Chunker::new(ChunkConfig::default()).unwrap();
        assert!(chunker.chunk("10k", "   \n\t  ").is_empty());
    }

    #[test]
    fn overlap_ge_chunk_size_is_rejected() {
        let err = Chunker::new(ChunkConfig {
            chunk_size: 100,
            overlap: 100,
        })
        .unwrap_err();
        assert!(matches!(err, FinError::InvalidConfig(_)));
    }

    #[test]
    fn long_text_snaps_to_sentence_boundaries() {
        let sentence = "Revenue was strong this quarter and margins held. ";
        let text = sentence.repeat(40); // 2000 chars
        let chunker = Chunker::new(ChunkConfig {
            chunk_size: 300,
            overlap: 50,
        })
        .unwrap();
        let chunks = chunker.chunk("fy24", &text);
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert_eq!(chunk.id, chunk_id("fy24", i));
            assert!(!chunk.text.trim().is_empty());
        }
        // All but the final chunk should end on a sentence terminator.
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.text.ends_with('.'), "chunk ended mid-sentence");
        }
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "Net income rose. Costs fell. Guidance raised. ".repeat(60);
        let chunker = Chunker::new(ChunkConfig {
            chunk_size: 200,
            overlap: 40,
        })
        .unwrap();
        let a = chunker.chunk("d1", &text);
        let b = chunker.chunk("d1", &text);
        assert_eq!(a, b);
    }

    #[test]
    fn multibyte_text_does_not_panic() {
        let text = "Umsätze stiegen stark. ".repeat(100);
        let chunker = Chunker::new(ChunkConfig {
            chunk_size: 120,
            overlap: 30,
        })
        .unwrap();
        let chunks = chunker.chunk("de", &text);
        assert!(!chunks.is_empty());
    }
}
