//! Text chunking
//!
//! Splits document content into overlapping chunks sized by a knowledge
//! base's `chunk_size`/`chunk_overlap`, preferring paragraph, then sentence,
//! then word boundaries. Offsets are counted in characters, not bytes, so
//! `start_char..end_char` always addresses the chunk inside the original text.

mod boundaries;

pub use boundaries::*;

use crate::error::{Error, Result};
use crate::models::KnowledgeBase;

/// Chunk sizing, in characters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl ChunkSettings {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Validation("chunk_size must be positive".to_string()));
        }
        if chunk_overlap >= chunk_size {
            return Err(Error::Validation(
                "chunk_overlap must be < chunk_size".to_string(),
            ));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn for_knowledge_base(kb: &KnowledgeBase) -> Result<Self> {
        Self::new(
            usize::try_from(kb.chunk_size).unwrap_or(0),
            usize::try_from(kb.chunk_overlap).unwrap_or(usize::MAX),
        )
    }
}

/// A chunk produced by [`chunk_text`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// 0-based position within the document
    pub index: i64,
    pub start_char: i64,
    pub end_char: i64,
    pub text: String,
}

/// Split `text` into chunks. Whitespace-only windows are skipped and chunk
/// text is trimmed, with offsets adjusted to the trimmed span.
pub fn chunk_text(text: &str, settings: &ChunkSettings) -> Vec<TextChunk> {
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    if text.trim().is_empty() {
        return Vec::new();
    }

    let break_points = find_break_points(text);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < total {
        let target = start + settings.chunk_size;
        let end = if target >= total {
            total
        } else {
            find_best_break(start, target, settings.chunk_size, &break_points)
        };

        let window = &chars[start..end];
        let lead = window.iter().take_while(|c| c.is_whitespace()).count();
        let trail = window[lead..]
            .iter()
            .rev()
            .take_while(|c| c.is_whitespace())
            .count();

        if lead < window.len() {
            let span = &window[lead..window.len() - trail];
            chunks.push(TextChunk {
                index: chunks.len() as i64,
                start_char: (start + lead) as i64,
                end_char: (end - trail) as i64,
                text: span.iter().collect(),
            });
        }

        if end >= total {
            break;
        }

        let next = end.saturating_sub(settings.chunk_overlap);
        start = if next > start { next } else { end };
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(size: usize, overlap: usize) -> ChunkSettings {
        ChunkSettings::new(size, overlap).unwrap()
    }

    #[test]
    fn test_chunk_short_text() {
        let chunks = chunk_text("This is a short document.", &settings(500, 50));

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "This is a short document.");
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].start_char, 0);
        assert_eq!(chunks[0].end_char, 25);
    }

    #[test]
    fn test_chunk_empty_and_blank_text() {
        assert!(chunk_text("", &settings(100, 10)).is_empty());
        assert!(chunk_text("  \n\n\t ", &settings(100, 10)).is_empty());
    }

    #[test]
    fn test_chunk_long_text_respects_size_and_offsets() {
        let text = "Lorem ipsum dolor sit amet. ".repeat(100);
        let chunks = chunk_text(&text, &settings(300, 50));
        let chars: Vec<char> = text.chars().collect();

        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i as i64);
            assert!(chunk.text.chars().count() <= 300);
            assert!(chunk.start_char <= chunk.end_char);
            let slice: String = chars[chunk.start_char as usize..chunk.end_char as usize]
                .iter()
                .collect();
            assert_eq!(slice, chunk.text);
        }
    }

    #[test]
    fn test_chunks_overlap() {
        let text = "word ".repeat(200);
        let chunks = chunk_text(&text, &settings(100, 30));

        for pair in chunks.windows(2) {
            assert!(pair[1].start_char < pair[0].end_char);
            assert!(pair[1].start_char > pair[0].start_char);
        }
    }

    #[test]
    fn test_prefers_paragraph_break() {
        let first = "a".repeat(85);
        let text = format!("{}\n\n{}", first, "b ".repeat(100));
        let chunks = chunk_text(&text, &settings(100, 0));

        assert_eq!(chunks[0].text, first);
    }

    #[test]
    fn test_multibyte_offsets() {
        let text = "日本語のテキスト。".repeat(30);
        let chunks = chunk_text(&text, &settings(100, 10));
        let chars: Vec<char> = text.chars().collect();

        for chunk in &chunks {
            let slice: String = chars[chunk.start_char as usize..chunk.end_char as usize]
                .iter()
                .collect();
            assert_eq!(slice, chunk.text);
        }
    }

    #[test]
    fn test_invalid_settings() {
        assert!(ChunkSettings::new(0, 0).is_err());
        assert!(ChunkSettings::new(100, 100).is_err());
    }
}
