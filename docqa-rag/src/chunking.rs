//! Text chunking.
//!
//! [`RecursiveChunker`] cuts text into windows of at most `chunk_size`
//! characters. Consecutive windows share exactly `chunk_overlap` characters.
//! Each window's end is snapped to the last paragraph break it contains,
//! falling back to the last sentence end, then the last whitespace, and
//! finally a hard cut.
//!
//! Lengths are counted in `char`s, so multi-byte text is never split inside a
//! code point.

use crate::error::{RagError, Result};

/// A strategy for splitting text into segments.
pub trait Chunker: Send + Sync {
    /// Split `text` into ordered, non-empty chunks.
    ///
    /// Returns an empty `Vec` for empty text.
    fn chunk(&self, text: &str) -> Vec<String>;
}

/// Splits text on the best available boundary: paragraphs, then sentences,
/// then words, then a hard character cut.
///
/// # Example
///
/// ```rust
/// use docqa_rag::{Chunker, RecursiveChunker};
///
/// let chunker = RecursiveChunker::new(12, 2)?;
/// let chunks = chunker.chunk("alpha beta gamma delta");
/// assert_eq!(chunks, ["alpha beta ", "a gamma ", "a delta"]);
/// # Ok::<(), docqa_rag::RagError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` - maximum number of characters per chunk
    /// * `chunk_overlap` - number of characters shared by consecutive chunks
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidInput`] if `chunk_overlap >= chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_overlap >= chunk_size {
            return Err(RagError::InvalidInput(format!(
                "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self { chunk_size, chunk_overlap })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }
}

/// Split `text` with a one-off [`RecursiveChunker`].
///
/// # Errors
///
/// Returns [`RagError::InvalidInput`] if `overlap >= chunk_size`.
pub fn chunk(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<String>> {
    Ok(RecursiveChunker::new(chunk_size, overlap)?.chunk(text))
}

/// Places a window may end, highest preference first.
#[derive(Debug, Clone, Copy)]
enum Boundary {
    Paragraph,
    Sentence,
    Word,
}

const BOUNDARIES: [Boundary; 3] = [Boundary::Paragraph, Boundary::Sentence, Boundary::Word];

impl Boundary {
    /// Whether a chunk starting at `start` may end just before `chars[end]`.
    ///
    /// A paragraph break is a line break followed by a blank line, where the
    /// blank line may hold `\r`, spaces or tabs.
    fn ends_at(self, chars: &[char], start: usize, end: usize) -> bool {
        match self {
            Self::Paragraph => {
                end > start
                    && chars[end - 1] == '\n'
                    && chars[start..end - 1]
                        .iter()
                        .rev()
                        .find(|c| !matches!(c, '\r' | ' ' | '\t'))
                        == Some(&'\n')
            }
            Self::Sentence => {
                end >= start + 2
                    && matches!(chars[end - 2], '.' | '!' | '?')
                    && chars[end - 1].is_whitespace()
            }
            Self::Word => end > start && chars[end - 1].is_whitespace(),
        }
    }
}

/// Pick the exclusive end of the window `[start, highest]`, never below `lowest`.
fn split_point(chars: &[char], start: usize, lowest: usize, highest: usize) -> usize {
    BOUNDARIES
        .iter()
        .find_map(|boundary| {
            (lowest..=highest)
                .rev()
                .find(|&end| !inside_crlf(chars, end) && boundary.ends_at(chars, start, end))
        })
        .unwrap_or(highest)
}

/// Whether ending at `end` would separate a `\r\n` pair.
fn inside_crlf(chars: &[char], end: usize) -> bool {
    end > 0 && chars[end - 1] == '\r' && chars.get(end) == Some(&'\n')
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < chars.len() {
            if chars.len() - start <= self.chunk_size {
                chunks.push(chars[start..].iter().collect());
                break;
            }

            // The lower bound keeps every window longer than the overlap so
            // the next start always moves forward.
            let end = split_point(
                &chars,
                start,
                start + self.chunk_overlap + 1,
                start + self.chunk_size,
            );
            chunks.push(chars[start..end].iter().collect());
            start = end - self.chunk_overlap;
        }

        chunks
    }
}
