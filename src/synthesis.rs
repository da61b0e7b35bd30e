//! Grounded answer synthesis: prompt construction plus a terminated stream.
//!
//! The synthesizer's output is a single-pass lazy sequence of
//! [`SynthesisEvent`]s: zero or more `Fragment`s followed by exactly one
//! terminal marker, `Done` or `Error`. Because the transport downstream is
//! append-only, a failure after fragments have been flushed is delivered as a
//! marker rather than re-raised.

use std::pin::Pin;
use std::sync::Arc;

use futures_util::{Stream, StreamExt};

use crate::generation::GenerativeGateway;
use crate::types::RetrievedPassage;

/// One item of the synthesized answer stream.
#[derive(Clone, Debug, PartialEq)]
pub enum SynthesisEvent {
    /// Incremental append to the final answer.
    Fragment(String),
    /// Generation finished; no further events follow.
    Done,
    /// Generation failed; no further events follow. Fragments already
    /// emitted remain valid prefix output.
    Error(String),
}

/// Terminated event stream for one answer.
pub type SynthesisStream = Pin<Box<dyn Stream<Item = SynthesisEvent> + Send>>;

/// Builds grounded prompts and streams generated answers.
pub struct AnswerSynthesizer {
    generator: Arc<dyn GenerativeGateway>,
}

impl AnswerSynthesizer {
    pub fn new(generator: Arc<dyn GenerativeGateway>) -> Self {
        Self { generator }
    }

    /// System instruction constraining the model to the supplied context.
    pub fn system_instruction(focus: Option<&str>) -> String {
        let mut instruction = String::from(
            "You are an expert assistant answering questions about a documentation corpus.\n\
             Answer the user's question based ONLY on the provided context.\n\
             If the answer is not in the context, say you don't know.\n\
             Cite the source file if possible.\n",
        );
        if let Some(focus) = focus {
            instruction.push_str(&format!(
                "\nThe user has selected the following text for specific context:\n\"{focus}\"\nFocus your answer on this text if relevant.\n"
            ));
        }
        instruction
    }

    /// User-facing prompt: one source block per passage, then the question.
    /// The synthesizer always receives the full stored text, not the display
    /// snippet.
    pub fn context_prompt(passages: &[RetrievedPassage], query: &str) -> String {
        let context: Vec<String> = passages
            .iter()
            .map(|passage| {
                format!(
                    "Source: {}\nContent: {}",
                    passage.source_file, passage.text
                )
            })
            .collect();
        format!("Context:\n{}\n\nQuestion: {}\n", context.join("\n\n"), query)
    }

    /// Streams the answer for `query` grounded in `passages`.
    pub async fn stream_answer(
        &self,
        passages: &[RetrievedPassage],
        query: &str,
        focus: Option<&str>,
    ) -> SynthesisStream {
        let system = Self::system_instruction(focus);
        let prompt = Self::context_prompt(passages, query);
        let generator = Arc::clone(&self.generator);

        Box::pin(async_stream::stream! {
            match generator.stream_generate(&prompt, &system).await {
                Err(err) => {
                    yield SynthesisEvent::Error(err.to_string());
                }
                Ok(mut fragments) => {
                    loop {
                        match fragments.next().await {
                            Some(Ok(fragment)) => yield SynthesisEvent::Fragment(fragment),
                            Some(Err(err)) => {
                                yield SynthesisEvent::Error(err.to_string());
                                return;
                            }
                            None => {
                                yield SynthesisEvent::Done;
                                return;
                            }
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::MockGenerator;

    fn passages() -> Vec<RetrievedPassage> {
        vec![
            RetrievedPassage {
                source_file: "ros2.md".into(),
                header_path: None,
                text: "ROS2 is a robotics middleware.".into(),
                score: 0.9,
            },
            RetrievedPassage {
                source_file: "dds.md".into(),
                header_path: Some("Transport".into()),
                text: "DDS handles discovery and transport.".into(),
                score: 0.7,
            },
        ]
    }

    #[test]
    fn prompt_interleaves_source_blocks_and_question() {
        let prompt = AnswerSynthesizer::context_prompt(&passages(), "What is ROS2?");
        assert!(prompt.starts_with("Context:\n"));
        assert!(prompt.contains("Source: ros2.md\nContent: ROS2 is a robotics middleware."));
        assert!(prompt.contains("Source: dds.md\nContent: DDS handles discovery and transport."));
        assert!(prompt.ends_with("Question: What is ROS2?\n"));
        let ros2_block = prompt.find("Source: ros2.md").unwrap();
        let dds_block = prompt.find("Source: dds.md").unwrap();
        assert!(ros2_block < dds_block);
    }

    #[test]
    fn system_instruction_mentions_focus_only_when_present() {
        let plain = AnswerSynthesizer::system_instruction(None);
        assert!(plain.contains("ONLY on the provided context"));
        assert!(!plain.contains("selected the following text"));

        let focused = AnswerSynthesizer::system_instruction(Some("lifecycle nodes"));
        assert!(focused.contains("\"lifecycle nodes\""));
        assert!(focused.contains("Focus your answer on this text"));
    }

    #[tokio::test]
    async fn successful_stream_ends_with_done() {
        let synthesizer =
            AnswerSynthesizer::new(Arc::new(MockGenerator::new(["ROS2 ", "is ", "middleware."])));
        let mut stream = synthesizer.stream_answer(&passages(), "What is ROS2?", None).await;

        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                SynthesisEvent::Fragment("ROS2 ".into()),
                SynthesisEvent::Fragment("is ".into()),
                SynthesisEvent::Fragment("middleware.".into()),
                SynthesisEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn mid_generation_failure_terminates_with_error_marker() {
        let generator = MockGenerator::new(["partial ", "answer "]).failing_after(2);
        let synthesizer = AnswerSynthesizer::new(Arc::new(generator));
        let mut stream = synthesizer.stream_answer(&passages(), "q", None).await;

        let mut events = Vec::new();
        while let Some(event) = stream.next().await {
            events.push(event);
        }
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], SynthesisEvent::Fragment(_)));
        assert!(matches!(events[1], SynthesisEvent::Fragment(_)));
        assert!(matches!(events[2], SynthesisEvent::Error(_)));
    }

    #[tokio::test]
    async fn empty_context_still_streams_an_answer() {
        let synthesizer =
            AnswerSynthesizer::new(Arc::new(MockGenerator::new(["I don't know."])));
        let mut stream = synthesizer.stream_answer(&[], "Unknown topic?", None).await;

        assert_eq!(
            stream.next().await,
            Some(SynthesisEvent::Fragment("I don't know.".into()))
        );
        assert_eq!(stream.next().await, Some(SynthesisEvent::Done));
        assert_eq!(stream.next().await, None);
    }
}
