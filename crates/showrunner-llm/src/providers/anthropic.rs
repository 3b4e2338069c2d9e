//! Anthropic-style messages adapter

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use showrunner_core::{ProviderConfig, ProviderKind, ShowrunnerError, ShowrunnerResult};

use crate::provider::{
    classify_status, classify_transport, effective_timeout, resolve_credential, GenerateRequest,
    Generation, Provider,
};

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Adapter for the Anthropic messages endpoint
pub struct AnthropicProvider {
    config: ProviderConfig,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    max_tokens: usize,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: Vec<Message<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: usize,
    #[serde(default)]
    output_tokens: usize,
}

impl AnthropicProvider {
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

        let body = MessagesBody {
            model: &self.config.model,
            max_tokens: request.max_tokens.unwrap_or(self.config.max_tokens),
            system: &request.system,
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature.unwrap_or(self.config.temperature),
        };

        let response = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(&self.config.name, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(&self.config.name, status, &text));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ShowrunnerError::provider(&self.config.name, e.to_string()))?;

        if parsed.stop_reason.as_deref() == Some("refusal") {
            return Err(ShowrunnerError::content_blocked(
                &self.config.name,
                "stop_reason: refusal",
            ));
        }

        let text: String = parsed
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .map(|block| block.text.as_str())
            .collect();

        if text.is_empty() {
            return Err(ShowrunnerError::provider(
                &self.config.name,
                format!("empty response (stop_reason: {:?})", parsed.stop_reason),
            ));
        }

        let tokens_used = parsed
            .usage
            .map(|usage| usage.input_tokens + usage.output_tokens);

        Ok(Generation { text, tokens_used })
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
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

    fn test_config() -> ProviderConfig {
        ProviderConfig {
            name: "claude".to_string(),
            provider_kind: ProviderKind::Anthropic,
            model: "claude-sonnet-4-20250514".to_string(),
            credential_env_var: "SR_TEST_ANTHROPIC_KEY".to_string(),
            temperature: 0.7,
            max_tokens: 4096,
            timeout_secs: 60,
        }
    }

    #[test]
    fn test_unavailable_without_key() {
        std::env::remove_var("SR_TEST_ANTHROPIC_KEY");
        let provider = AnthropicProvider::new(test_config());
        assert!(!provider.available());
        assert_eq!(provider.kind(), ProviderKind::Anthropic);
        assert_eq!(provider.model(), "claude-sonnet-4-20250514");
    }

    #[test]
    fn test_body_shape() {
        let body = MessagesBody {
            model: "claude-sonnet-4-20250514",
            max_tokens: 1024,
            system: "You are a director.",
            messages: vec![Message {
                role: "user",
                content: "Compose a frame.",
            }],
            temperature: 0.3,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "claude-sonnet-4-20250514");
        assert_eq!(json["system"], "You are a director.");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["temperature"], 0.3);
    }

    #[test]
    fn test_empty_system_omitted() {
        let body = MessagesBody {
            model: "m",
            max_tokens: 1,
            system: "",
            messages: vec![],
            temperature: 0.0,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("system").is_none());
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{
            "content": [{"type": "text", "text": "a sweeping crane shot"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 12, "output_tokens": 8}
        }"#;
        let parsed: MessagesResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.content[0].text, "a sweeping crane shot");
        assert_eq!(parsed.stop_reason.as_deref(), Some("end_turn"));
        let usage = parsed.usage.unwrap();
        assert_eq!(usage.input_tokens + usage.output_tokens, 20);
    }
}
