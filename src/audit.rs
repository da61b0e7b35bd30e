//! Per-turn interaction audit logging.
//!
//! Persistence is best-effort by contract: a chat turn's user-visible outcome
//! is decided by the synthesis stream alone, so store failures are reported
//! to the operational log and swallowed.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use tokio::sync::Mutex;
use tracing::instrument;

use crate::types::{InteractionLog, RagError};

/// Capability interface for the relational audit store.
#[async_trait]
pub trait RelationalLogStore: Send + Sync {
    /// Appends exactly one record. Must never mutate existing rows.
    async fn insert_interaction(&self, record: &InteractionLog) -> Result<(), RagError>;
}

/// Postgres-backed store, one row per chat turn.
pub struct PostgresLogStore {
    pool: PgPool,
}

impl PostgresLogStore {
    /// Connects and applies the embedded migrations (idempotent).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> Result<Self, RagError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|err| RagError::Audit(format!("connect error: {err}")))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|err| RagError::Audit(format!("migration failure: {err}")))?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl RelationalLogStore for PostgresLogStore {
    async fn insert_interaction(&self, record: &InteractionLog) -> Result<(), RagError> {
        sqlx::query(
            r#"
            INSERT INTO interactions (
                id,
                timestamp,
                user_query,
                bot_response,
                selected_text,
                latency_ms,
                successful
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(record.timestamp)
        .bind(&record.user_query)
        .bind(&record.bot_response)
        .bind(&record.selected_text)
        .bind(record.latency_ms)
        .bind(record.successful)
        .execute(&self.pool)
        .await
        .map_err(|err| RagError::Audit(format!("insert interaction: {err}")))?;
        Ok(())
    }
}

/// In-memory store for tests and store-less development.
#[derive(Default)]
pub struct MemoryLogStore {
    records: Mutex<Vec<InteractionLog>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything logged so far.
    pub async fn records(&self) -> Vec<InteractionLog> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl RelationalLogStore for MemoryLogStore {
    async fn insert_interaction(&self, record: &InteractionLog) -> Result<(), RagError> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}

/// Best-effort logger wrapping a [`RelationalLogStore`].
pub struct InteractionLogger {
    store: Arc<dyn RelationalLogStore>,
}

impl InteractionLogger {
    pub fn new(store: Arc<dyn RelationalLogStore>) -> Self {
        Self { store }
    }

    /// Persists one turn. Failures are reported operationally and never
    /// propagated to the caller.
    pub async fn log_turn(
        &self,
        user_query: &str,
        bot_response: &str,
        selected_text: Option<&str>,
        latency_ms: i64,
        successful: bool,
    ) {
        let record = InteractionLog::new(
            user_query,
            bot_response,
            selected_text.map(str::to_string),
            latency_ms,
            successful,
        );
        if let Err(err) = self.store.insert_interaction(&record).await {
            tracing::error!(error = %err, "failed to log interaction");
        }
    }
}
