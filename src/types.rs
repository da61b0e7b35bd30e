//! Core data model shared across the pipeline, plus the crate error type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Maximum number of characters kept in a display snippet before truncation.
pub const SNIPPET_MAX_CHARS: usize = 100;

/// Errors produced anywhere in the retrieval-augmented pipeline.
#[derive(Debug, Error)]
pub enum RagError {
    /// Missing or invalid credential, endpoint, or setting. Raised once at
    /// startup and never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Invalid chunking parameters or a document that cannot be chunked.
    #[error("chunking error: {0}")]
    Chunking(String),

    /// Embedding provider call failure.
    #[error("embedding provider error: {0}")]
    Embedding(String),

    /// Generation provider call failure.
    #[error("generation provider error: {0}")]
    Generation(String),

    /// Vector index failure (missing collection, dimension mismatch, transport).
    #[error("vector index error: {0}")]
    Index(String),

    /// The supplied corpus location is missing or unreadable.
    #[error("corpus error: {0}")]
    Corpus(String),

    /// Audit log persistence failure. Reported operationally, never surfaced
    /// to a chat caller.
    #[error("audit log error: {0}")]
    Audit(String),

    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for RagError {
    fn from(err: std::io::Error) -> Self {
        RagError::Io(err.to_string())
    }
}

/// A source document as read from the corpus. Transient; exists only while an
/// ingestion run is processing it.
#[derive(Clone, Debug)]
pub struct Document {
    /// Raw file contents before markdown cleanup.
    pub text: String,
    /// Path relative to the corpus root, used as the citation key.
    pub source_path: String,
}

/// A bounded, contiguous slice of a document's cleaned text; the unit of
/// embedding and indexing. Immutable once produced by the chunker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub source_file: String,
    /// Document title (first heading), if one was found.
    pub title: Option<String>,
    /// Dense 0-based position within the source document.
    pub chunk_index: usize,
    /// Shared by every chunk of the same document.
    pub total_chunks: usize,
}

/// A retrieval hit mapped back to chunk fields. Carries the full stored text
/// for the synthesizer; display truncation happens in [`SourceReference`].
#[derive(Clone, Debug)]
pub struct RetrievedPassage {
    pub source_file: String,
    pub header_path: Option<String>,
    pub text: String,
    pub score: f32,
}

impl RetrievedPassage {
    /// Derives the caller-facing citation with a truncated snippet.
    pub fn reference(&self) -> SourceReference {
        SourceReference {
            source_file: self.source_file.clone(),
            header_path: self.header_path.clone(),
            snippet: truncate_snippet(&self.text, SNIPPET_MAX_CHARS),
            score: self.score,
        }
    }
}

/// Provenance of a retrieval hit: source file, optional header path, display
/// snippet, and similarity score. Produced fresh per query; only ever
/// persisted as text inside an interaction log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceReference {
    pub source_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_path: Option<String>,
    pub snippet: String,
    pub score: f32,
}

/// Append-only audit record of one chat turn. Written exactly once, after the
/// answer stream has concluded (successfully or not), and never mutated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InteractionLog {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub user_query: String,
    pub bot_response: String,
    pub selected_text: Option<String>,
    pub latency_ms: i64,
    pub successful: bool,
}

impl InteractionLog {
    pub fn new(
        user_query: impl Into<String>,
        bot_response: impl Into<String>,
        selected_text: Option<String>,
        latency_ms: i64,
        successful: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            user_query: user_query.into(),
            bot_response: bot_response.into(),
            selected_text,
            latency_ms,
            successful,
        }
    }
}

/// Truncates `text` to at most `max` characters, appending an ellipsis when
/// anything was cut. Operates on characters, not bytes.
pub fn truncate_snippet(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("...");
    out
}
