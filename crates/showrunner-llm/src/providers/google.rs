//! Google-style generative content adapter
//!
//! Google signals content policy refusals three different ways: an empty
//! candidate list with a prompt-feedback block reason, a candidate finish
//! reason of SAFETY/RECITATION/PROHIBITED_CONTENT, or a candidate with no
//! parts at all. All three translate to `ContentBlocked` so the router can
//! fall back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use showrunner_core::{ProviderConfig, ProviderKind, ShowrunnerError, ShowrunnerResult};

use crate::provider::{
    classify_status, classify_transport, effective_timeout, resolve_credential, GenerateRequest,
    Generation, Provider,
};

const GENERATE_URL_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

const BLOCKING_FINISH_REASONS: &[&str] = &["SAFETY", "RECITATION", "PROHIBITED_CONTENT"];

/// Adapter for the Google generative content endpoint
pub struct GoogleProvider {
    config: ProviderConfig,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: usize,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    total_token_count: usize,
}

impl GoogleProvider {
    /// Create an adapter, resolving the credential from the environment
    pub fn new(config: ProviderConfig) -> Self {
        let api_key = resolve_credential(&config);
        Self {
            config,
            api_key,
            client: reqwest::Client::new(),
        }
    }

    async fn call(&self, request: &GenerateRequest) -> ShowrunnerResult<Generation> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ShowrunnerError::provider(&self.config.name, "no API key configured")
        })?;

        let system_instruction = if request.system.is_empty() {
            None
        } else {
            Some(Content {
                role: None,
                parts: vec![Part {
                    text: &request.system,
                }],
            })
        };

        let body = GenerateBody {
            system_instruction,
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part {
                    text: &request.prompt,
                }],
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature.unwrap_or(self.config.temperature),
                max_output_tokens: request.max_tokens.unwrap_or(self.config.max_tokens),
            },
        };

        let url = format!(
            "{}/{}:generateContent?key={}",
            GENERATE_URL_BASE, self.config.model, api_key
        );

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(&self.config.name, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            // Some block reasons surface as a 400 with PROHIBITED_CONTENT in the body
            if text.contains("PROHIBITED_CONTENT") || text.contains("blockReason") {
                return Err(ShowrunnerError::content_blocked(&self.config.name, text));
            }
            return Err(classify_status(&self.config.name, status, &text));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ShowrunnerError::provider(&self.config.name, e.to_string()))?;

        let tokens_used = parsed
            .usage_metadata
            .as_ref()
            .map(|usage| usage.total_token_count);

        let Some(candidate) = parsed.candidates.first() else {
            let block_reason = parsed
                .prompt_feedback
                .and_then(|feedback| feedback.block_reason)
                .unwrap_or_else(|| "UNKNOWN".to_string());
            tracing::warn!(provider = %self.config.name, %block_reason, "content blocked");
            return Err(ShowrunnerError::content_blocked(
                &self.config.name,
                format!("block_reason: {}", block_reason),
            ));
        };

        if let Some(ref finish_reason) = candidate.finish_reason {
            if BLOCKING_FINISH_REASONS.contains(&finish_reason.as_str()) {
                tracing::warn!(provider = %self.config.name, %finish_reason, "content blocked");
                return Err(ShowrunnerError::content_blocked(
                    &self.config.name,
                    format!("finish_reason: {}", finish_reason),
                ));
            }
        }

        let text: String = candidate
            .content
            .as_ref()
            .map(|content| {
                content
                    .parts
                    .iter()
                    .map(|part| part.text.as_str())
                    .collect()
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ShowrunnerError::content_blocked(
                &self.config.name,
                format!(
                    "empty content with finish_reason={:?}",
                    candidate.finish_reason
                ),
            ));
        }

        Ok(Generation { text, tokens_used })
    }
}

#[async_trait]
impl Provider for GoogleProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn generate(&self, request: &GenerateRequest) -> ShowrunnerResult<Generation> {
        let deadline = effective_timeout(&self.config, request);
        match tokio::time::timeout(deadline, self.call(request)).await {
            Ok(result) => result,
            Err(_) => Err(ShowrunnerError::timeout(
                &self.config.name,
                deadline.as_secs(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_uses_camel_case() {
        let body = GenerateBody {
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part { text: "system" }],
            }),
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: "prompt" }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.5,
                max_output_tokens: 2048,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "system");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 2048);
        assert_eq!(json["contents"][0]["role"], "user");
    }

    #[test]
    fn test_empty_candidates_parsed() {
        let raw = r#"{"candidates": [], "promptFeedback": {"blockReason": "SAFETY"}}"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert!(parsed.candidates.is_empty());
        assert_eq!(
            parsed.prompt_feedback.unwrap().block_reason.as_deref(),
            Some("SAFETY")
        );
    }

    #[test]
    fn test_blocking_finish_reasons() {
        for reason in BLOCKING_FINISH_REASONS {
            let raw = format!(
                r#"{{"candidates": [{{"content": {{"parts": [{{"text": "x"}}]}}, "finishReason": "{}"}}]}}"#,
                reason
            );
            let parsed: GenerateResponse = serde_json::from_str(&raw).unwrap();
            assert_eq!(
                parsed.candidates[0].finish_reason.as_deref(),
                Some(*reason)
            );
        }
    }

    #[test]
    fn test_normal_response_parsed() {
        let raw = r#"{
            "candidates": [{
                "content": {"parts": [{"text": "a quiet "}, {"text": "alley"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"totalTokenCount": 17}
        }"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        let candidate = &parsed.candidates[0];
        let text: String = candidate
            .content
            .as_ref()
            .unwrap()
            .parts
            .iter()
            .map(|p| p.text.as_str())
            .collect();
        assert_eq!(text, "a quiet alley");
        assert_eq!(parsed.usage_metadata.unwrap().total_token_count, 17);
    }
}
