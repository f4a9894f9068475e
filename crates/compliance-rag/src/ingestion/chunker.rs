//! Overlapping character-window chunking with boundary preference
//!
//! Windows are measured in characters. A window ends at the latest paragraph
//! break that fits, otherwise the latest sentence boundary, otherwise the
//! latest word boundary, otherwise a hard cut at `chunk_size`. The next
//! window starts exactly `chunk_overlap` characters before the previous end,
//! so consecutive chunks share an identical overlap region.

use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::error::Result;
use crate::types::Chunk;

/// Text chunker with validated size and overlap
#[derive(Debug, Clone, Copy)]
pub struct TextChunker {
    /// Maximum chunk size in characters
    chunk_size: usize,
    /// Characters shared by consecutive chunks
    overlap: usize,
}

impl TextChunker {
    /// Create a chunker, rejecting `chunk_size == 0` and `overlap >= chunk_size`
    pub fn new(config: ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            chunk_size: config.chunk_size,
            overlap: config.chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Chunk `text` belonging to `document_id`
    pub fn chunk(&self, document_id: Uuid, text: &str) -> Vec<Chunk> {
        let layout = TextLayout::new(text);
        self.windows(&layout)
            .enumerate()
            .map(|(sequence_index, (start, end))| {
                let slice = layout.slice(text, start, end);
                Chunk {
                    id: Chunk::id_for(document_id, sequence_index),
                    document_id,
                    sequence_index,
                    start_offset: start,
                    end_offset: end,
                    text: slice.to_string(),
                    token_count: slice.unicode_words().count(),
                }
            })
            .collect()
    }

    /// Iterator over `(start, end)` character windows
    pub fn windows<'a>(&self, layout: &'a TextLayout) -> ChunkWindows<'a> {
        ChunkWindows {
            layout,
            chunk_size: self.chunk_size,
            overlap: self.overlap,
            next_start: if layout.char_len() == 0 { None } else { Some(0) },
        }
    }
}

/// Chunk `text` with `config`
pub fn chunk_text(document_id: Uuid, text: &str, config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    Ok(TextChunker::new(*config)?.chunk(document_id, text))
}

/// Character offsets and candidate break positions of a text
///
/// Break positions are character indices a chunk may end at.
#[derive(Debug, Clone)]
pub struct TextLayout {
    /// Byte offset of every character, plus the total byte length
    byte_offsets: Vec<usize>,
    paragraph_breaks: Vec<usize>,
    sentence_breaks: Vec<usize>,
    word_breaks: Vec<usize>,
}

impl TextLayout {
    pub fn new(text: &str) -> Self {
        let byte_offsets: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();

        let to_char = |byte: usize| byte_offsets.binary_search(&byte).ok();

        let paragraph_breaks = text
            .match_indices("\n\n")
            .filter_map(|(i, sep)| to_char(i + sep.len()))
            .collect();
        let sentence_breaks = text
            .split_sentence_bound_indices()
            .filter_map(|(i, _)| to_char(i))
            .collect();
        let word_breaks = text
            .split_word_bound_indices()
            .filter_map(|(i, _)| to_char(i))
            .collect();

        Self {
            byte_offsets,
            paragraph_breaks,
            sentence_breaks,
            word_breaks,
        }
    }

    /// Number of characters
    pub fn char_len(&self) -> usize {
        self.byte_offsets.len() - 1
    }

    fn slice<'t>(&self, text: &'t str, start: usize, end: usize) -> &'t str {
        &text[self.byte_offsets[start]..self.byte_offsets[end]]
    }

    /// Latest break in `[min, max]`, by preference
    fn best_break(&self, min: usize, max: usize) -> Option<usize> {
        [&self.paragraph_breaks, &self.sentence_breaks, &self.word_breaks]
            .into_iter()
            .find_map(|breaks| {
                let idx = breaks.partition_point(|&p| p <= max);
                idx.checked_sub(1)
                    .map(|i| breaks[i])
                    .filter(|&p| p >= min)
            })
    }
}

/// Iterator returned by [`TextChunker::windows`]
#[derive(Debug, Clone)]
pub struct ChunkWindows<'a> {
    layout: &'a TextLayout,
    chunk_size: usize,
    overlap: usize,
    next_start: Option<usize>,
}

impl Iterator for ChunkWindows<'_> {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.next_start?;
        let len = self.layout.char_len();
        let hard_end = (start + self.chunk_size).min(len);

        if hard_end == len {
            self.next_start = None;
            return Some((start, len));
        }

        // Never end before start + overlap + 1 so every window advances,
        // and avoid windows much shorter than half the target size.
        let min_end = (start + (self.overlap + 1).max(self.chunk_size / 2)).min(hard_end);
        let end = self
            .layout
            .best_break(min_end, hard_end)
            .unwrap_or(hard_end);

        self.next_start = Some(end - self.overlap);
        Some((start, end))
    }
}
