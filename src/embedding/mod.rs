//! Embedding gateway: converts text into fixed-dimension vectors.
//!
//! One concrete provider is active per deployment, selected in
//! [`crate::config::Settings`]. Providers must report their output dimension;
//! the index uses it when a collection is created for the first time.

mod cohere;
mod gemini;

pub use cohere::CohereEmbedder;
pub use gemini::GeminiEmbedder;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::types::RagError;

/// Retry on rate limits and server errors; fail immediately on other 4xx.
pub(crate) fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Exponential backoff, capped at 2^5 steps.
pub(crate) fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

/// Largest batch any provider accepts in a single request.
pub const DEFAULT_EMBED_BATCH_LIMIT: usize = 96;

/// Whether a text is being embedded as a stored passage or a search query.
/// Providers map this onto their asymmetric task types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingMode {
    Query,
    Document,
}

/// Capability interface for embedding backends.
#[async_trait]
pub trait EmbeddingGateway: Send + Sync {
    /// Model identifier, for logs and diagnostics.
    fn model_name(&self) -> &str;

    /// Output vector dimensionality. Fixed per model; collections are created
    /// with this size.
    fn output_dimension(&self) -> usize;

    /// Largest batch this provider accepts per call.
    fn max_batch_len(&self) -> usize {
        DEFAULT_EMBED_BATCH_LIMIT
    }

    /// Embeds a batch of texts. The result preserves index-to-index
    /// correspondence with the input: `result[i]` embeds `texts[i]`.
    async fn embed_batch(
        &self,
        texts: &[String],
        mode: EmbeddingMode,
    ) -> Result<Vec<Vec<f32>>, RagError>;

    /// Embeds a single text (e.g. a search query).
    async fn embed_text(&self, text: &str, mode: EmbeddingMode) -> Result<Vec<f32>, RagError> {
        let mut vectors = self.embed_batch(&[text.to_string()], mode).await?;
        if vectors.len() != 1 {
            return Err(RagError::Embedding(format!(
                "provider returned {} vectors for a single input",
                vectors.len()
            )));
        }
        Ok(vectors.remove(0))
    }
}

/// Deterministic offline embedder for tests and local development.
///
/// Texts are reduced to a bag of lowercased alphanumeric tokens, each token
/// hashed into a fixed-size bucket, and the counts L2-normalized. Texts that
/// share vocabulary land close together under cosine similarity, which is
/// enough to exercise retrieval end to end without a provider.
#[derive(Clone, Debug)]
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(32)
    }
}

#[async_trait]
impl EmbeddingGateway for MockEmbedder {
    fn model_name(&self) -> &str {
        "mock-bag-of-words"
    }

    fn output_dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        _mode: EmbeddingMode,
    ) -> Result<Vec<Vec<f32>>, RagError> {
        Ok(texts
            .iter()
            .map(|text| bag_of_words_vector(text, self.dimension))
            .collect())
    }
}

fn bag_of_words_vector(text: &str, dimension: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dimension];
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let mut hasher = DefaultHasher::new();
        token.to_lowercase().hash(&mut hasher);
        let bucket = (hasher.finish() as usize) % dimension;
        vector[bucket] += 1.0;
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for value in &mut vector {
            *value /= norm;
        }
    }
    vector
}
