//! Deterministic, boundary-aware chunking of cleaned document text.
//!
//! The chunker walks the text with a fixed-size window and prefers to cut at
//! a paragraph break, then at a sentence break, before falling back to a hard
//! cut. Identical input and parameters always produce identical boundaries;
//! idempotent re-ingestion depends on that.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{Chunk, Document, RagError};

static CODE_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[\s\S]*?```").unwrap());
static INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`[^`]+`").unwrap());
static IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[.*?\]\(.*?\)").unwrap());
static LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]\([^\)]+\)").unwrap());
static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());
static FRONTMATTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^---[\s\S]*?---").unwrap());
static EXTRA_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());
static TITLE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#\s+(.+)$").unwrap());

/// Splits cleaned text into overlapping, boundary-aware chunks.
#[derive(Clone, Copy, Debug)]
pub struct ChunkingEngine {
    chunk_size: usize,
    overlap: usize,
}

impl Default for ChunkingEngine {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}

impl ChunkingEngine {
    /// Creates an engine with the given window size and overlap.
    /// Requires `0 <= overlap < chunk_size` and a non-zero window.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, RagError> {
        if chunk_size == 0 {
            return Err(RagError::Chunking("chunk_size must be non-zero".into()));
        }
        if overlap >= chunk_size {
            return Err(RagError::Chunking(format!(
                "overlap ({overlap}) must be smaller than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Splits `text` into ordered, trimmed, non-empty chunks.
    ///
    /// Offsets are byte positions snapped down to `char` boundaries so
    /// multi-byte text can never be split mid code point. Consecutive chunks
    /// overlap by at most `overlap` bytes.
    pub fn split(&self, text: &str) -> Vec<String> {
        let len = text.len();
        let mut chunks = Vec::new();
        let mut start = 0usize;

        while start < len {
            let mut end = char_floor(text, (start + self.chunk_size).min(len));

            if end < len {
                let half = char_floor(text, start + self.chunk_size / 2);
                let window = &text[start..end];
                if let Some(cut) = window
                    .rfind("\n\n")
                    .map(|pos| start + pos)
                    .filter(|&pos| pos > half)
                {
                    end = cut;
                } else if let Some(cut) = window
                    .rfind(". ")
                    .map(|pos| start + pos)
                    .filter(|&pos| pos > half)
                {
                    // Keep the period with the chunk it terminates.
                    end = cut + 1;
                }
            }

            // Non-termination guard: the window must always move forward.
            if end <= start {
                end = len;
            }

            let piece = text[start..end].trim();
            if !piece.is_empty() {
                chunks.push(piece.to_string());
            }

            if end >= len {
                break;
            }
            let mut next = char_floor(text, end.saturating_sub(self.overlap));
            if next <= start {
                next = end;
            }
            start = next;
        }

        chunks
    }

    /// Cleans and chunks a whole document, assigning dense indices and the
    /// shared total so every chunk knows its place in the source.
    pub fn chunk_document(&self, document: &Document) -> Vec<Chunk> {
        let title = extract_title(&document.text)
            .or_else(|| file_stem(&document.source_path));
        let cleaned = clean_markdown(&document.text);
        let pieces = self.split(&cleaned);
        let total = pieces.len();
        pieces
            .into_iter()
            .enumerate()
            .map(|(index, text)| Chunk {
                text,
                source_file: document.source_path.clone(),
                title: title.clone(),
                chunk_index: index,
                total_chunks: total,
            })
            .collect()
    }
}

/// Strips markdown syntax that adds noise to embeddings: fenced code blocks,
/// inline code, images, link targets (text kept), HTML tags, and YAML
/// frontmatter. Runs of three or more newlines collapse to a paragraph break.
pub fn clean_markdown(text: &str) -> String {
    let text = CODE_BLOCK.replace_all(text, "");
    let text = INLINE_CODE.replace_all(&text, "");
    let text = IMAGE.replace_all(&text, "");
    let text = LINK.replace_all(&text, "$1");
    let text = HTML_TAG.replace_all(&text, "");
    let text = FRONTMATTER.replace(&text, "");
    let text = EXTRA_NEWLINES.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// First level-one heading of the raw document, if any.
pub fn extract_title(raw: &str) -> Option<String> {
    TITLE_HEADING
        .captures(raw)
        .map(|caps| caps[1].trim().to_string())
}

fn file_stem(path: &str) -> Option<String> {
    std::path::Path::new(path)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
}

/// Largest char boundary at or below `index`.
fn char_floor(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}
