//! Mapping between the service and the upstream generative-text API.
//!
//! Each supported envelope version lives behind [`UpstreamAdapter`], so a schema
//! change upstream only touches this module.

use crate::domain::model::{Credential, UpstreamSchema};
use crate::utils::error::Result;
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONTENTS_ENDPOINT: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-flash:generateContent";

pub trait UpstreamAdapter: Send + Sync {
    fn schema(&self) -> UpstreamSchema;

    /// Single-turn generation request carrying `prompt` as its only content.
    fn request_body(&self, prompt: &str) -> serde_json::Value;

    fn authorize(&self, request: RequestBuilder, credential: &Credential) -> RequestBuilder;

    /// Pulls the generated text out of a 2xx response body. A well-formed
    /// envelope without any text yields `""`; a malformed one is an error.
    fn extract_text(&self, body: &[u8]) -> Result<String>;
}

pub fn adapter_for(schema: UpstreamSchema) -> Box<dyn UpstreamAdapter> {
    match schema {
        UpstreamSchema::Contents => Box::new(ContentsAdapter),
        UpstreamSchema::Prompt => Box::new(PromptAdapter),
    }
}

// contents/parts shape

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: [RequestContent<'a>; 1],
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: [RequestPart<'a>; 1],
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<ContentCandidate>>,
}

#[derive(Deserialize)]
struct ContentCandidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Option<Vec<CandidatePart>>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ContentsAdapter;

impl UpstreamAdapter for ContentsAdapter {
    fn schema(&self) -> UpstreamSchema {
        UpstreamSchema::Contents
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        let request = GenerateContentRequest {
            contents: [RequestContent {
                parts: [RequestPart { text: prompt }],
            }],
        };
        serde_json::to_value(request).unwrap_or(serde_json::Value::Null)
    }

    fn authorize(&self, request: RequestBuilder, credential: &Credential) -> RequestBuilder {
        request.header("x-goog-api-key", credential.expose())
    }

    fn extract_text(&self, body: &[u8]) -> Result<String> {
        let envelope: GenerateContentResponse = serde_json::from_slice(body)?;

        let text = envelope
            .candidates
            .and_then(|candidates| candidates.into_iter().next())
            .and_then(|candidate| candidate.content)
            .and_then(|content| content.parts)
            .and_then(|parts| parts.into_iter().next())
            .and_then(|part| part.text)
            .unwrap_or_default();

        Ok(text)
    }
}

// legacy prompt/output shape

#[derive(Serialize)]
struct GenerateTextRequest<'a> {
    prompt: TextPrompt<'a>,
}

#[derive(Serialize)]
struct TextPrompt<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateTextResponse {
    candidates: Option<Vec<TextCandidate>>,
}

#[derive(Deserialize)]
struct TextCandidate {
    output: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PromptAdapter;

impl UpstreamAdapter for PromptAdapter {
    fn schema(&self) -> UpstreamSchema {
        UpstreamSchema::Prompt
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        let request = GenerateTextRequest {
            prompt: TextPrompt { text: prompt },
        };
        serde_json::to_value(request).unwrap_or(serde_json::Value::Null)
    }

    fn authorize(&self, request: RequestBuilder, credential: &Credential) -> RequestBuilder {
        request.query(&[("key", credential.expose())])
    }

    fn extract_text(&self, body: &[u8]) -> Result<String> {
        let envelope: GenerateTextResponse = serde_json::from_slice(body)?;

        let text = envelope
            .candidates
            .and_then(|candidates| candidates.into_iter().next())
            .and_then(|candidate| candidate.output)
            .unwrap_or_default();

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::EnhanceError;
    use serde_json::json;

    #[test]
    fn test_contents_request_body_shape() {
        let body = ContentsAdapter.request_body("fix this");
        assert_eq!(
            body,
            json!({"contents": [{"parts": [{"text": "fix this"}]}]})
        );
    }

    #[test]
    fn test_contents_extracts_first_candidate_first_part() {
        let body = json!({
            "candidates": [
                {"content": {"parts": [{"text": "Hello there."}, {"text": "ignored"}], "role": "model"},
                 "finishReason": "STOP"},
                {"content": {"parts": [{"text": "second candidate"}]}}
            ],
            "usageMetadata": {"promptTokenCount": 42}
        });

        let text = ContentsAdapter
            .extract_text(body.to_string().as_bytes())
            .unwrap();
        assert_eq!(text, "Hello there.");
    }

    #[test]
    fn test_contents_missing_paths_degrade_to_empty() {
        let envelopes = [
            json!({}),
            json!({"candidates": []}),
            json!({"candidates": [{}]}),
            json!({"candidates": [{"content": {}}]}),
            json!({"candidates": [{"content": {"parts": []}}]}),
            json!({"candidates": [{"content": {"parts": [{}]}}]}),
            json!({"candidates": [{"finishReason": "SAFETY"}]}),
        ];

        for envelope in envelopes {
            let text = ContentsAdapter
                .extract_text(envelope.to_string().as_bytes())
                .unwrap();
            assert_eq!(text, "", "envelope {} should yield empty text", envelope);
        }
    }

    #[test]
    fn test_contents_malformed_envelope_is_error() {
        let bodies: [&[u8]; 3] = [
            b"<html>502 Bad Gateway</html>",
            br#"{"candidates": "oops"}"#,
            br#"{"candidates": [{"content": {"parts": [{"text": 7}]}}]}"#,
        ];

        for body in bodies {
            let err = ContentsAdapter.extract_text(body).unwrap_err();
            assert!(matches!(err, EnhanceError::SerializationError(_)));
        }
    }

    #[test]
    fn test_prompt_request_body_shape() {
        let body = PromptAdapter.request_body("fix this");
        assert_eq!(body, json!({"prompt": {"text": "fix this"}}));
    }

    #[test]
    fn test_prompt_extracts_first_output() {
        let body = json!({"candidates": [{"output": "Fixed."}, {"output": "Other"}]});
        let text = PromptAdapter.extract_text(body.to_string().as_bytes()).unwrap();
        assert_eq!(text, "Fixed.");

        let empty = PromptAdapter.extract_text(br#"{"candidates": []}"#).unwrap();
        assert_eq!(empty, "");
    }

    #[test]
    fn test_adapter_for_schema() {
        assert_eq!(
            adapter_for(UpstreamSchema::Contents).schema(),
            UpstreamSchema::Contents
        );
        assert_eq!(
            adapter_for(UpstreamSchema::Prompt).schema(),
            UpstreamSchema::Prompt
        );
    }
}
