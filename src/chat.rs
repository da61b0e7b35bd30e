//! Chat turn orchestration.
//!
//! Each turn runs as one spawned task that retrieves context, emits the
//! sources, streams answer fragments, closes the stream with a terminal
//! marker, and then writes exactly one audit record. Events travel through a
//! bounded channel; when the consumer goes away (client disconnect) the task
//! observes the send failure, stops pulling the generation stream, logs the
//! partial response, and exits.

use std::sync::Arc;
use std::time::Instant;

use futures_util::StreamExt;
use serde::Deserialize;
use tracing::debug;

use crate::audit::InteractionLogger;
use crate::retrieval::RetrievalEngine;
use crate::synthesis::{AnswerSynthesizer, SynthesisEvent};
use crate::types::SourceReference;

/// Capacity of the per-turn event channel.
const TURN_EVENT_BUFFER: usize = 32;

/// One caller message in the (unused) conversation history.
#[derive(Clone, Debug, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// A chat turn request as received at the boundary.
#[derive(Clone, Debug, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    #[serde(default)]
    pub selected_text: Option<String>,
    /// Accepted for contract compatibility; the prompt is built from the
    /// current turn only.
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

/// Events produced by one chat turn, in emission order: one `Sources`, zero
/// or more `Token`s, then exactly one `Done` or `Error`. A fatal failure
/// before any token replaces the whole sequence with a single `Error`.
#[derive(Clone, Debug, PartialEq)]
pub enum ChatEvent {
    Sources(Vec<SourceReference>),
    Token(String),
    Done,
    Error(String),
}

/// How a turn ended, for audit purposes.
enum TurnOutcome {
    Completed,
    Failed,
    Cancelled,
}

/// Ties retrieval, synthesis, and audit logging into per-turn tasks.
pub struct ChatService {
    retrieval: RetrievalEngine,
    synthesizer: AnswerSynthesizer,
    logger: InteractionLogger,
}

impl ChatService {
    pub fn new(
        retrieval: RetrievalEngine,
        synthesizer: AnswerSynthesizer,
        logger: InteractionLogger,
    ) -> Self {
        Self {
            retrieval,
            synthesizer,
            logger,
        }
    }

    /// Starts one turn on its own task and returns the event receiver.
    /// Dropping the receiver cancels the turn at the next fragment boundary.
    pub fn spawn_turn(self: Arc<Self>, request: ChatRequest) -> flume::Receiver<ChatEvent> {
        let (tx, rx) = flume::bounded(TURN_EVENT_BUFFER);
        tokio::spawn(async move {
            self.run_turn(request, tx).await;
        });
        rx
    }

    async fn run_turn(&self, request: ChatRequest, tx: flume::Sender<ChatEvent>) {
        let started = Instant::now();
        let focus = request.selected_text.as_deref();

        let passages = match self.retrieval.retrieve(&request.query, focus).await {
            Ok(passages) => passages,
            Err(err) => {
                let _ = tx.send_async(ChatEvent::Error(err.to_string())).await;
                self.log(&request, "", started, false).await;
                return;
            }
        };

        let sources: Vec<SourceReference> =
            passages.iter().map(|passage| passage.reference()).collect();
        if tx.send_async(ChatEvent::Sources(sources)).await.is_err() {
            self.log(&request, "", started, false).await;
            return;
        }

        let mut answer = String::new();
        let mut stream = self
            .synthesizer
            .stream_answer(&passages, &request.query, focus)
            .await;

        let outcome = loop {
            match stream.next().await {
                Some(SynthesisEvent::Fragment(fragment)) => {
                    answer.push_str(&fragment);
                    if tx.send_async(ChatEvent::Token(fragment)).await.is_err() {
                        break TurnOutcome::Cancelled;
                    }
                }
                Some(SynthesisEvent::Done) => {
                    let _ = tx.send_async(ChatEvent::Done).await;
                    break TurnOutcome::Completed;
                }
                Some(SynthesisEvent::Error(message)) => {
                    let _ = tx.send_async(ChatEvent::Error(message)).await;
                    break TurnOutcome::Failed;
                }
                // The synthesizer always terminates with a marker; an
                // unmarked end still must not leave the turn unlogged.
                None => break TurnOutcome::Failed,
            }
        };
        // Dropping the stream releases the upstream generation immediately;
        // on cancellation nothing pulls it further.
        drop(stream);

        if matches!(outcome, TurnOutcome::Cancelled) {
            debug!("chat turn cancelled by consumer, logging partial response");
        }
        let successful = matches!(outcome, TurnOutcome::Completed);
        self.log(&request, &answer, started, successful).await;
    }

    async fn log(&self, request: &ChatRequest, answer: &str, started: Instant, successful: bool) {
        self.logger
            .log_turn(
                &request.query,
                answer,
                request.selected_text.as_deref(),
                started.elapsed().as_millis() as i64,
                successful,
            )
            .await;
    }
}
