#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ragline::audit::{InteractionLogger, MemoryLogStore};
use ragline::chat::ChatService;
use ragline::chunking::ChunkingEngine;
use ragline::embedding::MockEmbedder;
use ragline::generation::MockGenerator;
use ragline::index::MemoryIndex;
use ragline::ingestion::{IngestOptions, IngestionPipeline};
use ragline::retrieval::RetrievalEngine;
use ragline::synthesis::AnswerSynthesizer;
use ragline::types::InteractionLog;

pub const COLLECTION: &str = "test_corpus";

/// Everything a test needs to drive the full pipeline offline.
pub struct TestHarness {
    pub embedder: Arc<MockEmbedder>,
    pub index: Arc<MemoryIndex>,
    pub log_store: Arc<MemoryLogStore>,
    pub chat: Arc<ChatService>,
    pub pipeline: Arc<IngestionPipeline>,
}

/// Builds a harness around mock gateways and the in-memory index.
pub fn harness(generator: MockGenerator) -> TestHarness {
    harness_with_options(generator, IngestOptions::default())
}

pub fn harness_with_options(generator: MockGenerator, options: IngestOptions) -> TestHarness {
    let embedder = Arc::new(MockEmbedder::default());
    let index = Arc::new(MemoryIndex::new());
    let log_store = Arc::new(MemoryLogStore::new());

    let retrieval = RetrievalEngine::new(
        embedder.clone(),
        index.clone(),
        COLLECTION,
        5,
        0.1,
    );
    let synthesizer = AnswerSynthesizer::new(Arc::new(generator));
    let logger = InteractionLogger::new(log_store.clone());
    let chat = Arc::new(ChatService::new(retrieval, synthesizer, logger));

    let pipeline = Arc::new(IngestionPipeline::new(
        embedder.clone(),
        index.clone(),
        COLLECTION,
        ChunkingEngine::default(),
        options,
    ));

    TestHarness {
        embedder,
        index,
        log_store,
        chat,
        pipeline,
    }
}

/// Writes a small fixed corpus: two topical documents plus a nested one.
pub async fn write_corpus(dir: &Path) {
    tokio::fs::write(
        dir.join("ros2.md"),
        "# ROS2\n\nROS2 is a robotics middleware framework for building robot applications. \
         It provides publish subscribe messaging, lifecycle nodes, and tooling.",
    )
    .await
    .unwrap();
    tokio::fs::write(
        dir.join("baking.md"),
        "# Baking\n\nSourdough bread needs a healthy starter and patient fermentation. \
         Steam in the oven gives the crust its shine.",
    )
    .await
    .unwrap();
    tokio::fs::create_dir_all(dir.join("guides")).await.unwrap();
    tokio::fs::write(
        dir.join("guides/dds.md"),
        "# DDS\n\nDDS handles discovery and transport underneath ROS2 topics.",
    )
    .await
    .unwrap();
}

/// Polls the memory log store until a record shows up or the timeout passes.
pub async fn wait_for_log(store: &MemoryLogStore) -> InteractionLog {
    for _ in 0..200 {
        let records = store.records().await;
        if let Some(record) = records.first() {
            return record.clone();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("no interaction was logged within the timeout");
}
