//! Deterministic segmentation of extracted rulebook text.
//!
//! The chunker slides a fixed-size window over the text, preferring to cut
//! at sentence terminators, then at whitespace, then at a hard character
//! boundary. Consecutive chunks share the trailing `overlap` characters of
//! the previous chunk so no statement is lost at a window edge.


use crate::config::ChunkerConfig;

/// Form feed marks a page break in extracted PDF text.
const FORM_FEED: char = '\u{0C}';

/// Fraction of the window scanned backwards for a preferred boundary.
const BOUNDARY_SEARCH_FRACTION: usize = 5;

/// A windowed substring of a document, with offset and page metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    /// Inclusive character offset of the first character.
    pub char_start: usize,
    /// Exclusive character offset one past the last character.
    pub char_end: usize,
    /// Estimated 1-based page number of the chunk start.
    pub page: i32,
    /// Position of this chunk within the document.
    pub index: usize,
}

/// Splits text into overlapping search windows.
#[derive(Debug, Clone)]
pub struct TextChunker {
    chunk_size: usize,
    overlap: usize,
    chars_per_page: usize,
}

impl TextChunker {
    /// Builds a chunker from validated configuration.
    ///
    /// `config.overlap` must be strictly smaller than `config.chunk_size`
    /// (enforced by [`crate::config::Config::validate`]).
    pub fn new(config: &ChunkerConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            overlap: config.overlap.min(config.chunk_size.saturating_sub(1)),
            chars_per_page: config.chars_per_page.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Lazily yields the chunks of `text`.
    ///
    /// Empty text yields nothing; text shorter than the chunk size yields a
    /// single chunk. A trailing window that is entirely whitespace is
    /// dropped.
    pub fn prepare(&self, text: &str) -> ChunkIter {
        let chars: Vec<char> = text.chars().collect();
        let form_feeds: Vec<usize> = chars
            .iter()
            .enumerate()
            .filter(|(_, c)| **c == FORM_FEED)
            .map(|(i, _)| i)
            .collect();

        ChunkIter {
            chars,
            form_feeds,
            chunk_size: self.chunk_size,
            overlap: self.overlap,
            chars_per_page: self.chars_per_page,
            pos: 0,
            index: 0,
            done: false,
        }
    }
}

/// Iterator state for [`TextChunker::prepare`].
#[derive(Debug)]
pub struct ChunkIter {
    chars: Vec<char>,
    form_feeds: Vec<usize>,
    chunk_size: usize,
    overlap: usize,
    chars_per_page: usize,
    pos: usize,
    index: usize,
    done: bool,
}

impl ChunkIter {
    /// 1-based page estimate for a character offset.
    fn page_for(&self, char_start: usize) -> i32 {
        if self.form_feeds.is_empty() {
            (char_start / self.chars_per_page) as i32 + 1
        } else {
            self.form_feeds.partition_point(|&ff| ff < char_start) as i32 + 1
        }
    }

    /// Picks the cut point for a window ending at `hard_end`.
    ///
    /// Preference order: sentence terminator, whitespace, hard boundary.
    /// The scan covers only the tail of the window and never produces a
    /// chunk shorter than the overlap.
    fn select_end(&self, start: usize, hard_end: usize) -> usize {
        let window = self.chunk_size / BOUNDARY_SEARCH_FRACTION;
        let floor = hard_end.saturating_sub(window.max(1)).max(start);
        let min_end = start + self.overlap + 1;

        let sentence_end = (floor..hard_end)
            .rev()
            .find(|&i| matches!(self.chars[i], '.' | '!' | '?'))
            .map(|i| i + 1);

        let end = sentence_end
            .or_else(|| {
                (floor..hard_end)
                    .rev()
                    .find(|&i| self.chars[i].is_whitespace())
                    .map(|i| i + 1)
            })
            .unwrap_or(hard_end);

        if end < min_end { hard_end } else { end }
    }
}

impl Iterator for ChunkIter {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.done || self.pos >= self.chars.len() {
            return None;
        }

        let start = self.pos;
        let hard_end = (start + self.chunk_size).min(self.chars.len());
        let end = if hard_end == self.chars.len() {
            self.done = true;
            hard_end
        } else {
            self.select_end(start, hard_end)
        };

        let slice = &self.chars[start..end];

        // Trailing whitespace-only windows carry no searchable content.
        if self.done && slice.iter().all(|c| c.is_whitespace()) {
            return None;
        }

        let chunk = Chunk {
            text: slice.iter().collect(),
            char_start: start,
            char_end: end,
            page: self.page_for(start),
            index: self.index,
        };

        self.index += 1;
        self.pos = if self.done { end } else { end - self.overlap };

        Some(chunk)
    }
}
