//! Retrieval engine: query embedding → similarity search → thresholding.

use std::sync::Arc;

use tracing::instrument;

use crate::embedding::{EmbeddingGateway, EmbeddingMode};
use crate::index::{Metric, VectorIndex};
use crate::types::{RagError, RetrievedPassage};

/// Drives one retrieval per chat turn.
pub struct RetrievalEngine {
    embedder: Arc<dyn EmbeddingGateway>,
    index: Arc<dyn VectorIndex>,
    collection: String,
    top_k: usize,
    score_threshold: f32,
}

impl RetrievalEngine {
    pub fn new(
        embedder: Arc<dyn EmbeddingGateway>,
        index: Arc<dyn VectorIndex>,
        collection: impl Into<String>,
        top_k: usize,
        score_threshold: f32,
    ) -> Self {
        Self {
            embedder,
            index,
            collection: collection.into(),
            top_k,
            score_threshold,
        }
    }

    /// Retrieves the passages most similar to the query. A focus excerpt, when
    /// present, is prepended to the query so its terms dominate the shared
    /// embedding space. Querying an empty or never-ingested corpus returns an
    /// empty list, not an error: the collection is lazily created first.
    #[instrument(skip(self, query, focus), err)]
    pub async fn retrieve(
        &self,
        query: &str,
        focus: Option<&str>,
    ) -> Result<Vec<RetrievedPassage>, RagError> {
        self.index
            .ensure_collection(
                &self.collection,
                self.embedder.output_dimension(),
                Metric::Cosine,
            )
            .await?;

        let search_text = match focus {
            Some(focus) => format!("{focus}\n\n{query}"),
            None => query.to_string(),
        };
        let vector = self
            .embedder
            .embed_text(&search_text, EmbeddingMode::Query)
            .await?;

        let hits = self
            .index
            .search(&self.collection, &vector, self.top_k, self.score_threshold)
            .await?;

        Ok(hits
            .into_iter()
            .map(|hit| RetrievedPassage {
                source_file: hit.payload.source_file,
                header_path: hit.payload.title,
                text: hit.payload.text,
                score: hit.score,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbedder;
    use crate::index::{ChunkPayload, IndexedPoint, MemoryIndex};

    async fn seeded_engine(threshold: f32) -> RetrievalEngine {
        let embedder = Arc::new(MockEmbedder::default());
        let index = Arc::new(MemoryIndex::new());
        index
            .ensure_collection("corpus", embedder.output_dimension(), Metric::Cosine)
            .await
            .unwrap();

        let texts = [
            ("ros2.md", "ROS2 is a robotics middleware framework"),
            ("baking.md", "sourdough bread needs a healthy starter"),
        ];
        let mut points = Vec::new();
        for (file, text) in texts {
            let vector = embedder
                .embed_text(text, EmbeddingMode::Document)
                .await
                .unwrap();
            points.push(IndexedPoint {
                id: file.to_string(),
                vector,
                payload: ChunkPayload {
                    text: text.to_string(),
                    source_file: file.to_string(),
                    title: None,
                    chunk_index: 0,
                    total_chunks: 1,
                },
            });
        }
        index.upsert("corpus", points).await.unwrap();

        RetrievalEngine::new(embedder, index, "corpus", 5, threshold)
    }

    #[tokio::test]
    async fn matching_vocabulary_ranks_first() {
        let engine = seeded_engine(0.1).await;
        let passages = engine.retrieve("what is ROS2", None).await.unwrap();
        assert!(!passages.is_empty());
        assert_eq!(passages[0].source_file, "ros2.md");
    }

    #[tokio::test]
    async fn no_passage_scores_below_the_threshold() {
        let engine = seeded_engine(0.2).await;
        let passages = engine.retrieve("what is ROS2", None).await.unwrap();
        assert!(passages.iter().all(|p| p.score >= 0.2));
    }

    #[tokio::test]
    async fn querying_before_ingestion_returns_empty_not_error() {
        let embedder: Arc<MockEmbedder> = Arc::new(MockEmbedder::default());
        let index = Arc::new(MemoryIndex::new());
        let engine = RetrievalEngine::new(embedder, index.clone(), "fresh", 5, 0.3);

        let passages = engine.retrieve("anything at all", None).await.unwrap();
        assert!(passages.is_empty());
        // The lazy ensure created the collection as a side effect.
        assert_eq!(index.count("fresh").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn focus_text_steers_the_search() {
        let engine = seeded_engine(0.05).await;
        let passages = engine
            .retrieve(
                "tell me more about this",
                Some("sourdough starter feeding schedule"),
            )
            .await
            .unwrap();
        assert!(!passages.is_empty());
        assert_eq!(passages[0].source_file, "baking.md");
    }
}
