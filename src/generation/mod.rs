//! Generation gateway: turns a grounded prompt into answer text.
//!
//! The primary interface is a lazy stream of text fragments; each fragment is
//! an incremental append to the final answer. A collected convenience method
//! exists for callers that do not stream.

mod gemini;

pub use gemini::GeminiGenerator;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};

use crate::types::RagError;

/// Lazy, single-pass sequence of answer fragments. Ends when the provider
/// finishes; a mid-stream item of `Err` means generation failed after the
/// preceding fragments were already produced.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, RagError>> + Send>>;

/// Capability interface for generation backends.
#[async_trait]
pub trait GenerativeGateway: Send + Sync {
    /// Model identifier, for logs and diagnostics.
    fn model_name(&self) -> &str;

    /// Starts a streaming generation. The returned stream is one-directional
    /// and not restartable.
    async fn stream_generate(
        &self,
        prompt: &str,
        system_instruction: &str,
    ) -> Result<FragmentStream, RagError>;

    /// Runs a generation to completion and returns the full text.
    async fn generate(&self, prompt: &str, system_instruction: &str) -> Result<String, RagError> {
        let mut fragments = self.stream_generate(prompt, system_instruction).await?;
        let mut answer = String::new();
        while let Some(fragment) = fragments.next().await {
            answer.push_str(&fragment?);
        }
        Ok(answer)
    }
}

/// Scripted generator for tests: replays a fixed fragment sequence, optionally
/// failing after a set number of fragments.
#[derive(Clone, Debug)]
pub struct MockGenerator {
    fragments: Vec<String>,
    fail_after: Option<usize>,
}

impl MockGenerator {
    pub fn new(fragments: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            fail_after: None,
        }
    }

    /// Makes the stream fail after emitting `count` fragments.
    #[must_use]
    pub fn failing_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }
}

#[async_trait]
impl GenerativeGateway for MockGenerator {
    fn model_name(&self) -> &str {
        "mock-generator"
    }

    async fn stream_generate(
        &self,
        _prompt: &str,
        _system_instruction: &str,
    ) -> Result<FragmentStream, RagError> {
        let fragments = self.fragments.clone();
        let fail_after = self.fail_after;
        let stream = async_stream::stream! {
            for (index, fragment) in fragments.into_iter().enumerate() {
                if fail_after == Some(index) {
                    yield Err(RagError::Generation("mock generation failure".into()));
                    return;
                }
                yield Ok(fragment);
            }
            if fail_after.is_some() {
                yield Err(RagError::Generation("mock generation failure".into()));
            }
        };
        Ok(Box::pin(stream))
    }
}
