//! Ingestion pipeline: corpus scan → chunking → batched embedding → indexing.
//!
//! The pipeline operates in one explicit collection mode and one explicit
//! batch-failure policy; neither is ever inferred. Embedding happens before
//! the collection is touched, so an aborted run leaves the index as it was.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::chunking::ChunkingEngine;
use crate::embedding::{EmbeddingGateway, EmbeddingMode};
use crate::index::{IndexedPoint, Metric, VectorIndex};
use crate::types::{Chunk, Document, RagError};

/// How the pipeline treats an existing collection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CollectionMode {
    /// Reuse the collection; content-derived point ids make re-ingesting
    /// unchanged chunks overwrite themselves.
    #[default]
    IdempotentRefresh,
    /// Drop and recreate the collection, with fresh ids per run.
    FullRebuild,
}

/// What happens when one embedding batch fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BatchFailurePolicy {
    /// Abort the run and surface the provider error. Because embedding runs
    /// before any index write, an aborted run commits nothing.
    #[default]
    Abort,
    /// Substitute zero vectors for the failed batch and continue, yielding a
    /// degraded-but-complete index. Each substitution is logged at WARN.
    ZeroVectorFallback,
}

/// Tunables for one ingestion run.
#[derive(Clone, Copy, Debug)]
pub struct IngestOptions {
    pub mode: CollectionMode,
    pub failure_policy: BatchFailurePolicy,
    /// Upper bound on texts per embedding call; also capped by the provider.
    pub embed_batch_limit: usize,
    /// Points per index upsert request.
    pub upsert_batch_size: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            mode: CollectionMode::default(),
            failure_policy: BatchFailurePolicy::default(),
            embed_batch_limit: crate::embedding::DEFAULT_EMBED_BATCH_LIMIT,
            upsert_batch_size: 64,
        }
    }
}

/// Outcome of an ingestion run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct IngestionReport {
    pub documents: usize,
    pub chunks_indexed: usize,
    /// Batches that fell back to zero vectors (always 0 under `Abort`).
    pub degraded_batches: usize,
}

/// Drives corpus → index.
pub struct IngestionPipeline {
    embedder: Arc<dyn EmbeddingGateway>,
    index: Arc<dyn VectorIndex>,
    collection: String,
    chunker: ChunkingEngine,
    options: IngestOptions,
}

impl IngestionPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingGateway>,
        index: Arc<dyn VectorIndex>,
        collection: impl Into<String>,
        chunker: ChunkingEngine,
        options: IngestOptions,
    ) -> Self {
        Self {
            embedder,
            index,
            collection: collection.into(),
            chunker,
            options,
        }
    }

    /// Ingests every markdown document under `corpus_dir`.
    #[instrument(skip(self), err)]
    pub async fn run(&self, corpus_dir: &Path) -> Result<IngestionReport, RagError> {
        let documents = scan_corpus(corpus_dir).await?;
        info!(documents = documents.len(), "scanned corpus");

        let mut chunks: Vec<Chunk> = Vec::new();
        for document in &documents {
            let document_chunks = self.chunker.chunk_document(document);
            debug!(
                source = %document.source_path,
                chunks = document_chunks.len(),
                "chunked document"
            );
            chunks.extend(document_chunks);
        }

        let (vectors, degraded_batches) = self.embed_all(&chunks).await?;

        let dimension = self.embedder.output_dimension();
        match self.options.mode {
            CollectionMode::IdempotentRefresh => {
                self.index
                    .ensure_collection(&self.collection, dimension, Metric::Cosine)
                    .await?;
            }
            CollectionMode::FullRebuild => {
                self.index
                    .recreate_collection(&self.collection, dimension, Metric::Cosine)
                    .await?;
            }
        }

        let points: Vec<IndexedPoint> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexedPoint {
                id: self.point_id(&chunk),
                vector,
                payload: chunk.into(),
            })
            .collect();
        let chunks_indexed = points.len();

        for batch in points.chunks(self.options.upsert_batch_size.max(1)) {
            self.index.upsert(&self.collection, batch.to_vec()).await?;
        }

        info!(chunks_indexed, degraded_batches, "ingestion complete");
        Ok(IngestionReport {
            documents: documents.len(),
            chunks_indexed,
            degraded_batches,
        })
    }

    /// Embeds every chunk text in bounded batches, index-aligned with the
    /// input. Applies the configured failure policy per batch.
    async fn embed_all(&self, chunks: &[Chunk]) -> Result<(Vec<Vec<f32>>, usize), RagError> {
        let limit = self
            .options
            .embed_batch_limit
            .min(self.embedder.max_batch_len())
            .max(1);
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();

        let mut vectors = Vec::with_capacity(texts.len());
        let mut degraded = 0usize;
        for batch in texts.chunks(limit) {
            match self
                .embedder
                .embed_batch(batch, EmbeddingMode::Document)
                .await
            {
                Ok(batch_vectors) => {
                    if batch_vectors.len() != batch.len() {
                        return Err(RagError::Embedding(format!(
                            "provider returned {} vectors for {} inputs",
                            batch_vectors.len(),
                            batch.len()
                        )));
                    }
                    vectors.extend(batch_vectors);
                }
                Err(err) => match self.options.failure_policy {
                    BatchFailurePolicy::Abort => return Err(err),
                    BatchFailurePolicy::ZeroVectorFallback => {
                        warn!(
                            error = %err,
                            batch_len = batch.len(),
                            "embedding batch failed, substituting zero vectors"
                        );
                        degraded += 1;
                        let dimension = self.embedder.output_dimension();
                        vectors.extend(
                            std::iter::repeat_with(|| vec![0.0f32; dimension]).take(batch.len()),
                        );
                    }
                },
            }
        }
        Ok((vectors, degraded))
    }

    fn point_id(&self, chunk: &Chunk) -> String {
        match self.options.mode {
            CollectionMode::IdempotentRefresh => Uuid::new_v5(
                &Uuid::NAMESPACE_DNS,
                format!("{}{}", chunk.text, chunk.source_file).as_bytes(),
            )
            .to_string(),
            CollectionMode::FullRebuild => Uuid::new_v4().to_string(),
        }
    }
}

/// Reads every `.md`/`.mdx` file under `corpus_dir`, in sorted path order so
/// runs are deterministic. Paths in [`Document::source_path`] are relative to
/// the corpus root.
pub async fn scan_corpus(corpus_dir: &Path) -> Result<Vec<Document>, RagError> {
    if !corpus_dir.is_dir() {
        return Err(RagError::Corpus(format!(
            "corpus directory '{}' does not exist",
            corpus_dir.display()
        )));
    }

    let mut paths: Vec<PathBuf> = WalkDir::new(corpus_dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            matches!(
                path.extension().and_then(|ext| ext.to_str()),
                Some("md") | Some("mdx")
            )
        })
        .collect();
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let text = tokio::fs::read_to_string(&path).await?;
        let source_path = path
            .strip_prefix(corpus_dir)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");
        documents.push(Document { text, source_path });
    }
    Ok(documents)
}
