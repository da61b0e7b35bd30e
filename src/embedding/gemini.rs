//! Gemini embedding provider, speaking `batchEmbedContents`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{EmbeddingGateway, EmbeddingMode, retry_backoff, should_retry};
use crate::types::RagError;

pub(crate) const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: usize = 3;

/// Embedding client for Google's Gemini embedding models.
#[derive(Clone, Debug)]
pub struct GeminiEmbedder {
    client: Client,
    api_key: String,
    model: String,
    dimension: usize,
    base_url: String,
}

impl GeminiEmbedder {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        dimension: usize,
    ) -> Result<Self, RagError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(RagError::Configuration("missing Gemini API key".into()));
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
            base_url: GEMINI_API_BASE.to_string(),
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
impl EmbeddingGateway for GeminiEmbedder {
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

        let task_type = match mode {
            EmbeddingMode::Query => "RETRIEVAL_QUERY",
            EmbeddingMode::Document => "RETRIEVAL_DOCUMENT",
        };
        let qualified_model = format!("models/{}", self.model);
        let body = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedContentRequest {
                    model: &qualified_model,
                    content: ContentParts {
                        parts: vec![TextPart { text }],
                    },
                    task_type,
                })
                .collect(),
        };
        let url = format!("{}/models/{}:batchEmbedContents", self.base_url, self.model);

        let mut last_err = None;
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                tokio::time::sleep(retry_backoff(attempt)).await;
            }

            let response = self
                .client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
                .send()
                .await;

            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let parsed: BatchEmbedResponse = response.json().await.map_err(|err| {
                            RagError::Embedding(format!("failed to parse Gemini response: {err}"))
                        })?;
                        return self.validate(parsed, texts.len());
                    }
                    let text = response.text().await.unwrap_or_default();
                    if should_retry(status) {
                        last_err = Some(RagError::Embedding(format!(
                            "Gemini embed error {status}: {text}"
                        )));
                        continue;
                    }
                    return Err(RagError::Embedding(format!(
                        "Gemini embed error {status}: {text}"
                    )));
                }
                Err(err) => {
                    last_err = Some(RagError::Embedding(format!("Gemini request failed: {err}")));
                    continue;
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| RagError::Embedding("Gemini embed failed after retries".into())))
    }
}

impl GeminiEmbedder {
    fn validate(
        &self,
        parsed: BatchEmbedResponse,
        expected: usize,
    ) -> Result<Vec<Vec<f32>>, RagError> {
        if parsed.embeddings.len() != expected {
            return Err(RagError::Embedding(format!(
                "Gemini returned {} embeddings for {} inputs",
                parsed.embeddings.len(),
                expected
            )));
        }
        let vectors: Vec<Vec<f32>> = parsed
            .embeddings
            .into_iter()
            .map(|embedding| embedding.values)
            .collect();
        for vector in &vectors {
            if vector.len() != self.dimension {
                return Err(RagError::Embedding(format!(
                    "Gemini returned dimension {}, expected {}",
                    vector.len(),
                    self.dimension
                )));
            }
        }
        Ok(vectors)
    }
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: ContentParts<'a>,
    task_type: &'static str,
}

#[derive(Serialize)]
struct ContentParts<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}
