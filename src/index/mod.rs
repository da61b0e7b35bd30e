//! Vector index capability: stores chunk vectors with payload and serves
//! nearest-neighbor search.
//!
//! The [`VectorIndex`] trait abstracts over backends so the pipeline and the
//! retrieval engine never depend on a concrete store. Production runs use
//! [`QdrantIndex`]; tests and corpus-less development use [`MemoryIndex`].

mod memory;
mod qdrant;

pub use memory::MemoryIndex;
pub use qdrant::QdrantIndex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{Chunk, RagError};

/// Similarity metric a collection is created with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Metric {
    Cosine,
    Dot,
    Euclid,
}

/// Chunk metadata stored alongside each vector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub text: String,
    pub source_file: String,
    #[serde(default)]
    pub title: Option<String>,
    pub chunk_index: usize,
    pub total_chunks: usize,
}

impl From<Chunk> for ChunkPayload {
    fn from(chunk: Chunk) -> Self {
        Self {
            text: chunk.text,
            source_file: chunk.source_file,
            title: chunk.title,
            chunk_index: chunk.chunk_index,
            total_chunks: chunk.total_chunks,
        }
    }
}

/// One vector plus payload, addressed by a caller-chosen id.
#[derive(Clone, Debug)]
pub struct IndexedPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

/// A search hit: point id, similarity score, stored payload.
#[derive(Clone, Debug)]
pub struct ScoredHit {
    pub id: String,
    pub score: f32,
    pub payload: ChunkPayload,
}

/// Capability interface over a named-collection vector store.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Creates the collection if it does not exist. Returns `true` when this
    /// call created it. The existence-check-then-create pair is not atomic
    /// against concurrent ingestion triggers; that race is accepted because
    /// ingestion is an infrequent operator action.
    async fn ensure_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: Metric,
    ) -> Result<bool, RagError>;

    /// Drops the collection if present, then creates it fresh.
    async fn recreate_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: Metric,
    ) -> Result<(), RagError>;

    /// Inserts or overwrites points by id.
    async fn upsert(&self, name: &str, points: Vec<IndexedPoint>) -> Result<(), RagError>;

    /// Nearest-neighbor search. Returns at most `top_k` hits with
    /// `score >= score_threshold`, in descending score order; hits below the
    /// threshold are discarded, never padded back.
    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredHit>, RagError>;

    /// Number of points currently stored in the collection.
    async fn count(&self, name: &str) -> Result<usize, RagError>;
}
