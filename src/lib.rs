//! ```text
//! Corpus dir ──► ingestion::scan_corpus ──► chunking::ChunkingEngine ──► chunks
//!                                                      │
//!                          embedding::EmbeddingGateway (document mode, ≤96/batch)
//!                                                      │
//!                                 index::VectorIndex::upsert (batched points)
//!
//! query(+focus) ──► retrieval::RetrievalEngine ──► ranked passages
//!                                │
//!              synthesis::AnswerSynthesizer ──► fragment stream ──► caller
//!                                │
//!                   audit::InteractionLogger (one record per turn)
//! ```

pub mod audit;
pub mod chat;
pub mod chunking;
pub mod config;
pub mod embedding;
pub mod generation;
pub mod index;
pub mod ingestion;
pub mod retrieval;
pub mod server;
pub mod synthesis;
pub mod types;

pub use chunking::ChunkingEngine;
pub use types::{Chunk, Document, InteractionLog, RagError, RetrievedPassage, SourceReference};
