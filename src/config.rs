//! Environment-backed settings.
//!
//! Every required credential and endpoint is validated up front so that a
//! misconfigured process fails at startup rather than on the first request.
//! Provider selection happens here, once; callers receive an already-chosen
//! gateway and never branch on provider names.

use std::collections::HashMap;

use crate::types::RagError;

/// Which embedding backend a deployment uses. Exactly one is active.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingProviderKind {
    Gemini,
    Cohere,
}

impl EmbeddingProviderKind {
    fn parse(value: &str) -> Result<Self, RagError> {
        match value.to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "cohere" => Ok(Self::Cohere),
            other => Err(RagError::Configuration(format!(
                "unknown embedding provider '{other}' (expected 'gemini' or 'cohere')"
            ))),
        }
    }

    fn default_model(self) -> &'static str {
        match self {
            Self::Gemini => "text-embedding-004",
            Self::Cohere => "embed-english-v3.0",
        }
    }
}

/// Resolved process configuration.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Shared secret required by the ingestion trigger endpoint.
    pub api_secret: String,
    pub embedding_provider: EmbeddingProviderKind,
    pub google_api_key: String,
    pub cohere_api_key: Option<String>,
    pub qdrant_url: String,
    pub qdrant_api_key: Option<String>,
    pub database_url: String,
    pub collection: String,
    pub bind_addr: String,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub generation_model: String,
    pub top_k: usize,
    pub score_threshold: f32,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Settings {
    /// Loads settings from the process environment (after `.env`, if present).
    pub fn from_env() -> Result<Self, RagError> {
        dotenvy::dotenv().ok();
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_vars(&vars)
    }

    /// Builds settings from an explicit variable map. Split out from
    /// [`Settings::from_env`] so tests never mutate process environment.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, RagError> {
        let require = |key: &str| -> Result<String, RagError> {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| {
                    RagError::Configuration(format!("required environment variable {key} is not set"))
                })
        };
        let optional = |key: &str| -> Option<String> {
            vars.get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let embedding_provider =
            EmbeddingProviderKind::parse(optional("EMBEDDING_PROVIDER").as_deref().unwrap_or("gemini"))?;

        // Generation always runs on Gemini, so the Google key is required
        // regardless of the embedding provider.
        let google_api_key = require("GOOGLE_API_KEY")?;
        let cohere_api_key = optional("COHERE_API_KEY");
        if embedding_provider == EmbeddingProviderKind::Cohere && cohere_api_key.is_none() {
            return Err(RagError::Configuration(
                "COHERE_API_KEY is required when EMBEDDING_PROVIDER=cohere".into(),
            ));
        }

        let embedding_model = optional("EMBEDDING_MODEL")
            .unwrap_or_else(|| embedding_provider.default_model().to_string());
        let embedding_dimension = match optional("EMBEDDING_DIMENSION") {
            Some(raw) => parse_number(&raw, "EMBEDDING_DIMENSION")?,
            None => default_dimension(&embedding_model).ok_or_else(|| {
                RagError::Configuration(format!(
                    "unknown embedding model '{embedding_model}': set EMBEDDING_DIMENSION explicitly"
                ))
            })?,
        };

        let chunk_size = match optional("CHUNK_SIZE") {
            Some(raw) => parse_number(&raw, "CHUNK_SIZE")?,
            None => 1000,
        };
        let chunk_overlap = match optional("CHUNK_OVERLAP") {
            Some(raw) => parse_number(&raw, "CHUNK_OVERLAP")?,
            None => 200,
        };
        if chunk_overlap >= chunk_size {
            return Err(RagError::Configuration(format!(
                "CHUNK_OVERLAP ({chunk_overlap}) must be smaller than CHUNK_SIZE ({chunk_size})"
            )));
        }

        let top_k = match optional("RETRIEVAL_TOP_K") {
            Some(raw) => parse_number(&raw, "RETRIEVAL_TOP_K")?,
            None => 5,
        };
        let score_threshold = match optional("SCORE_THRESHOLD") {
            Some(raw) => raw.parse::<f32>().map_err(|_| {
                RagError::Configuration(format!("SCORE_THRESHOLD must be a number, got '{raw}'"))
            })?,
            None => 0.3,
        };

        Ok(Self {
            api_secret: require("API_SECRET")?,
            embedding_provider,
            google_api_key,
            cohere_api_key,
            qdrant_url: require("QDRANT_URL")?,
            qdrant_api_key: optional("QDRANT_API_KEY"),
            database_url: require("DATABASE_URL")?,
            collection: optional("QDRANT_COLLECTION").unwrap_or_else(|| "corpus_chunks".to_string()),
            bind_addr: optional("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8000".to_string()),
            embedding_model,
            embedding_dimension,
            generation_model: optional("GENERATION_MODEL")
                .unwrap_or_else(|| "gemini-2.5-flash".to_string()),
            top_k,
            score_threshold,
            chunk_size,
            chunk_overlap,
        })
    }
}

fn parse_number(raw: &str, key: &str) -> Result<usize, RagError> {
    raw.parse::<usize>()
        .map_err(|_| RagError::Configuration(format!("{key} must be a positive integer, got '{raw}'")))
}

fn default_dimension(model: &str) -> Option<usize> {
    match model {
        "text-embedding-004" => Some(768),
        "gemini-embedding-001" => Some(3072),
        "embed-english-v3.0" | "embed-multilingual-v3.0" => Some(1024),
        "embed-english-light-v3.0" => Some(384),
        _ => None,
    }
}
