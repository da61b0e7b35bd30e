//! Cohere embedding provider, speaking the v2 embed API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{EmbeddingGateway, EmbeddingMode, retry_backoff, should_retry};
use crate::types::RagError;

pub(crate) const COHERE_API_BASE: &str = "https://api.cohere.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: usize = 3;

/// Embedding client for Cohere's asymmetric embed models.
#[derive(Clone, Debug)]
pub struct CohereEmbedder {
    client: Client,
    api_key: String,
    model: String,
    dimension: usize,
    base_url: String,
}

impl CohereEmbedder {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
    ) -> Result<Self, RagError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(RagError::Configuration("missing Cohere API key".into()));
        }
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| RagError::Configuration(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            api_key,
            model: model.into(),
            dimension,
            base_url: COHERE_API_BASE.to_string(),
        })
    }

    /// Overrides the API base URL. Intended for tests against a local mock.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl EmbeddingGateway for CohereEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn output_dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(
        &self,
        texts: &[String],
        mode: EmbeddingMode,
    ) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.len() > self.max_batch_len() {
            return Err(RagError::Embedding(format!(
                "batch of {} exceeds provider limit {}",
                texts.len(),
                self.max_batch_len()
            )));
        }

        let body = EmbedRequest {
            model: &self.model,
            texts,
            input_type: match mode {
                EmbeddingMode::Query => "search_query",
                EmbeddingMode::Document => "search_document",
            },
            embedding_types: &["float"],
        };
        let url = format!("{}/v2/embed", self.base_url);

        let mut last_err = None;
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                tokio::time::sleep(retry_backoff(attempt)).await;
            }

            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let parsed: EmbedResponse = response.json().await.map_err(|err| {
                            RagError::Embedding(format!("failed to parse Cohere response: {err}"))
                        })?;
                        return validate(parsed, texts.len(), self.dimension);
                    }
                    let text = response.text().await.unwrap_or_default();
                    if should_retry(status) {
                        last_err = Some(RagError::Embedding(format!(
                            "Cohere embed error {status}: {text}"
                        )));
                        continue;
                    }
                    return Err(RagError::Embedding(format!(
                        "Cohere embed error {status}: {text}"
                    )));
                }
                Err(err) => {
                    last_err = Some(RagError::Embedding(format!("Cohere request failed: {err}")));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| RagError::Embedding("Cohere embed failed after retries".into())))
    }
}

fn validate(
    parsed: EmbedResponse,
    expected: usize,
    dimension: usize,
) -> Result<Vec<Vec<f32>>, RagError> {
    let vectors = parsed.embeddings.float;
    if vectors.len() != expected {
        return Err(RagError::Embedding(format!(
            "Cohere returned {} embeddings for {expected} inputs",
            vectors.len()
        )));
    }
    for vector in &vectors {
        if vector.len() != dimension {
            return Err(RagError::Embedding(format!(
                "Cohere returned dimension {}, expected {dimension}",
                vector.len()
            )));
        }
    }
    Ok(vectors)
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    texts: &'a [String],
    input_type: &'static str,
    embedding_types: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: EmbedVectors,
}

#[derive(Deserialize)]
struct EmbedVectors {
    #[serde(default)]
    float: Vec<Vec<f32>>,
}
