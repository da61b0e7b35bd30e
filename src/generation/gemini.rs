//! Gemini generation provider, speaking `streamGenerateContent` over SSE.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{FragmentStream, GenerativeGateway};
use crate::types::RagError;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// End-to-end budget for one generation, including the streamed body.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Streaming generation client for Google's Gemini models.
#[derive(Clone, Debug)]
pub struct GeminiGenerator {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiGenerator {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, RagError> {
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
impl GenerativeGateway for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn stream_generate(
        &self,
        prompt: &str,
        system_instruction: &str,
    ) -> Result<FragmentStream, RagError> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        );
        let body = GenerateRequest {
            system_instruction: InstructionParts {
                parts: vec![TextPart {
                    text: system_instruction,
                }],
            },
            contents: vec![TurnContent {
                role: "user",
                parts: vec![TextPart { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| RagError::Generation(format!("Gemini request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RagError::Generation(format!(
                "Gemini generate error {status}: {text}"
            )));
        }

        let mut bytes = response.bytes_stream();
        let stream = async_stream::try_stream! {
            // Byte buffer, not String: a multi-byte character may straddle two
            // transport chunks and must not be decoded until its line is whole.
            let mut buffer: Vec<u8> = Vec::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = chunk
                    .map_err(|err| RagError::Generation(format!("stream transport error: {err}")))?;
                buffer.extend_from_slice(&chunk);

                while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=newline).collect();
                    let line = String::from_utf8_lossy(&line);
                    if let Some(fragment) = parse_sse_line(line.trim_end())? {
                        yield fragment;
                    }
                }
            }
            // A final data line without a trailing newline still counts.
            let tail = String::from_utf8_lossy(&buffer);
            if let Some(fragment) = parse_sse_line(tail.trim_end())? {
                yield fragment;
            }
        };
        Ok(Box::pin(stream))
    }
}

/// Extracts the text delta from one SSE line, if it carries one.
fn parse_sse_line(line: &str) -> Result<Option<String>, RagError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(None);
    }
    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|err| RagError::Generation(format!("malformed stream payload: {err}")))?;
    let text: String = chunk
        .candidates
        .into_iter()
        .flat_map(|candidate| candidate.content.map(|c| c.parts).unwrap_or_default())
        .filter_map(|part| part.text)
        .collect();
    if text.is_empty() {
        Ok(None)
    } else {
        Ok(Some(text))
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    system_instruction: InstructionParts<'a>,
    contents: Vec<TurnContent<'a>>,
}

#[derive(Serialize)]
struct InstructionParts<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Serialize)]
struct TurnContent<'a> {
    role: &'static str,
    parts: Vec<TextPart<'a>>,
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_lines_yield_their_text_delta() {
        let line = r#"data: {"candidates":[{"content":{"parts":[{"text":"Hello"}]}}]}"#;
        assert_eq!(parse_sse_line(line).unwrap(), Some("Hello".to_string()));
    }

    #[test]
    fn non_data_lines_are_ignored() {
        assert_eq!(parse_sse_line("").unwrap(), None);
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), None);
        assert_eq!(parse_sse_line("event: ping").unwrap(), None);
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), None);
    }

    #[test]
    fn empty_candidate_payloads_yield_nothing() {
        let line = r#"data: {"candidates":[{"content":{"parts":[]}}]}"#;
        assert_eq!(parse_sse_line(line).unwrap(), None);
        let line = r#"data: {"candidates":[]}"#;
        assert_eq!(parse_sse_line(line).unwrap(), None);
    }

    #[test]
    fn malformed_payloads_surface_as_generation_errors() {
        let err = parse_sse_line("data: {not json").unwrap_err();
        assert!(matches!(err, RagError::Generation(_)));
    }
}
