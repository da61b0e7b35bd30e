use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use ragline::audit::{InteractionLogger, PostgresLogStore, RelationalLogStore};
use ragline::chat::ChatService;
use ragline::chunking::ChunkingEngine;
use ragline::config::{EmbeddingProviderKind, Settings};
use ragline::embedding::{CohereEmbedder, EmbeddingGateway, GeminiEmbedder};
use ragline::generation::{GeminiGenerator, GenerativeGateway};
use ragline::index::{QdrantIndex, VectorIndex};
use ragline::ingestion::{IngestOptions, IngestionPipeline};
use ragline::retrieval::RetrievalEngine;
use ragline::server::{self, AppState};
use ragline::synthesis::AnswerSynthesizer;
use ragline::types::RagError;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Arc::new(Settings::from_env()?);

    let embedder: Arc<dyn EmbeddingGateway> = match settings.embedding_provider {
        EmbeddingProviderKind::Gemini => Arc::new(GeminiEmbedder::new(
            settings.google_api_key.clone(),
            settings.embedding_model.clone(),
            settings.embedding_dimension,
        )?),
        EmbeddingProviderKind::Cohere => {
            let api_key = settings.cohere_api_key.clone().ok_or_else(|| {
                RagError::Configuration("COHERE_API_KEY is required for the cohere provider".into())
            })?;
            Arc::new(CohereEmbedder::new(
                api_key,
                settings.embedding_model.clone(),
                settings.embedding_dimension,
            )?)
        }
    };
    let generator: Arc<dyn GenerativeGateway> = Arc::new(GeminiGenerator::new(
        settings.google_api_key.clone(),
        settings.generation_model.clone(),
    )?);
    let index: Arc<dyn VectorIndex> = Arc::new(QdrantIndex::connect(
        &settings.qdrant_url,
        settings.qdrant_api_key.clone(),
    )?);
    let store: Arc<dyn RelationalLogStore> =
        Arc::new(PostgresLogStore::connect(&settings.database_url).await?);

    let chunker = ChunkingEngine::new(settings.chunk_size, settings.chunk_overlap)?;
    let retrieval = RetrievalEngine::new(
        Arc::clone(&embedder),
        Arc::clone(&index),
        settings.collection.clone(),
        settings.top_k,
        settings.score_threshold,
    );
    let synthesizer = AnswerSynthesizer::new(generator);
    let logger = InteractionLogger::new(store);
    let chat = Arc::new(ChatService::new(retrieval, synthesizer, logger));
    let pipeline = Arc::new(IngestionPipeline::new(
        embedder,
        index,
        settings.collection.clone(),
        chunker,
        IngestOptions::default(),
    ));

    let app = server::router(AppState {
        settings: Arc::clone(&settings),
        chat,
        pipeline,
    });

    let listener = TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!(
        addr = %settings.bind_addr,
        collection = %settings.collection,
        embedding_model = %settings.embedding_model,
        generation_model = %settings.generation_model,
        "ragline listening"
    );
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("shutdown signal received");
    }
}
