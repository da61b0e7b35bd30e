//! In-process vector index with exact cosine search.
//!
//! Backs tests and corpus-less development; the trait contract matches the
//! Qdrant implementation, including dimension checks on upsert and search.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{IndexedPoint, Metric, ScoredHit, VectorIndex};
use crate::types::RagError;

#[derive(Debug)]
struct MemoryCollection {
    dimension: usize,
    points: HashMap<String, IndexedPoint>,
}

/// Exact-search in-memory index keyed by collection name.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    collections: RwLock<HashMap<String, MemoryCollection>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn ensure_collection(
        &self,
        name: &str,
        dimension: usize,
        _metric: Metric,
    ) -> Result<bool, RagError> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            return Ok(false);
        }
        collections.insert(
            name.to_string(),
            MemoryCollection {
                dimension,
                points: HashMap::new(),
            },
        );
        Ok(true)
    }

    async fn recreate_collection(
        &self,
        name: &str,
        dimension: usize,
        _metric: Metric,
    ) -> Result<(), RagError> {
        let mut collections = self.collections.write().await;
        collections.insert(
            name.to_string(),
            MemoryCollection {
                dimension,
                points: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn upsert(&self, name: &str, points: Vec<IndexedPoint>) -> Result<(), RagError> {
        let mut collections = self.collections.write().await;
        let collection = collections
            .get_mut(name)
            .ok_or_else(|| RagError::Index(format!("collection '{name}' does not exist")))?;
        for point in points {
            if point.vector.len() != collection.dimension {
                return Err(RagError::Index(format!(
                    "vector dimension {} does not match collection dimension {}",
                    point.vector.len(),
                    collection.dimension
                )));
            }
            collection.points.insert(point.id.clone(), point);
        }
        Ok(())
    }

    async fn search(
        &self,
        name: &str,
        vector: &[f32],
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<ScoredHit>, RagError> {
        let collections = self.collections.read().await;
        let collection = collections
            .get(name)
            .ok_or_else(|| RagError::Index(format!("collection '{name}' does not exist")))?;
        if vector.len() != collection.dimension {
            return Err(RagError::Index(format!(
                "query dimension {} does not match collection dimension {}",
                vector.len(),
                collection.dimension
            )));
        }

        let mut hits: Vec<ScoredHit> = collection
            .points
            .values()
            .map(|point| ScoredHit {
                id: point.id.clone(),
                score: cosine_similarity(vector, &point.vector),
                payload: point.payload.clone(),
            })
            .filter(|hit| hit.score >= score_threshold)
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn count(&self, name: &str) -> Result<usize, RagError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(name)
            .map(|collection| collection.points.len())
            .unwrap_or(0))
    }
}

/// Cosine similarity in `[-1, 1]`; `0.0` for mismatched or empty inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::ChunkPayload;

    fn point(id: &str, vector: Vec<f32>) -> IndexedPoint {
        IndexedPoint {
            id: id.to_string(),
            vector,
            payload: ChunkPayload {
                text: format!("text for {id}"),
                source_file: format!("{id}.md"),
                title: None,
                chunk_index: 0,
                total_chunks: 1,
            },
        }
    }

    #[tokio::test]
    async fn ensure_reports_whether_it_created() {
        let index = MemoryIndex::new();
        assert!(index.ensure_collection("c", 3, Metric::Cosine).await.unwrap());
        assert!(!index.ensure_collection("c", 3, Metric::Cosine).await.unwrap());
    }

    #[tokio::test]
    async fn upsert_overwrites_by_id() {
        let index = MemoryIndex::new();
        index.ensure_collection("c", 2, Metric::Cosine).await.unwrap();
        index
            .upsert("c", vec![point("a", vec![1.0, 0.0])])
            .await
            .unwrap();
        index
            .upsert("c", vec![point("a", vec![0.0, 1.0])])
            .await
            .unwrap();
        assert_eq!(index.count("c").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn dimension_mismatch_fails_the_operation() {
        let index = MemoryIndex::new();
        index.ensure_collection("c", 3, Metric::Cosine).await.unwrap();
        let err = index
            .upsert("c", vec![point("a", vec![1.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Index(_)));

        let err = index.search("c", &[1.0, 0.0], 5, 0.0).await.unwrap_err();
        assert!(matches!(err, RagError::Index(_)));
    }

    #[tokio::test]
    async fn search_orders_by_score_and_applies_the_threshold() {
        let index = MemoryIndex::new();
        index.ensure_collection("c", 2, Metric::Cosine).await.unwrap();
        index
            .upsert(
                "c",
                vec![
                    point("exact", vec![1.0, 0.0]),
                    point("close", vec![0.9, 0.1]),
                    point("orthogonal", vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let hits = index.search("c", &[1.0, 0.0], 5, 0.3).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "exact");
        assert_eq!(hits[1].id, "close");
        assert!(hits.iter().all(|hit| hit.score >= 0.3));
    }

    #[tokio::test]
    async fn top_k_limits_survivors_without_padding() {
        let index = MemoryIndex::new();
        index.ensure_collection("c", 2, Metric::Cosine).await.unwrap();
        let points = (0..10)
            .map(|i| point(&format!("p{i}"), vec![1.0, i as f32 * 0.01]))
            .collect();
        index.upsert("c", points).await.unwrap();

        let hits = index.search("c", &[1.0, 0.0], 3, 0.0).await.unwrap();
        assert_eq!(hits.len(), 3);

        // Threshold above every score: nothing comes back, nothing is padded.
        let hits = index.search("c", &[0.0, 1.0], 3, 0.99).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn recreate_drops_existing_points() {
        let index = MemoryIndex::new();
        index.ensure_collection("c", 2, Metric::Cosine).await.unwrap();
        index
            .upsert("c", vec![point("a", vec![1.0, 0.0])])
            .await
            .unwrap();
        index.recreate_collection("c", 2, Metric::Cosine).await.unwrap();
        assert_eq!(index.count("c").await.unwrap(), 0);
    }

    #[test]
    fn cosine_basics() {
        assert!((cosine_similarity(&[1.0, 2.0], &[1.0, 2.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }
}
