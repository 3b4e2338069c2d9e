//! OpenAI-style chat completions adapter

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use showrunner_core::{ProviderConfig, ProviderKind, ShowrunnerError, ShowrunnerResult};

use crate::provider::{
    classify_status, classify_transport, effective_timeout, resolve_credential, GenerateRequest,
    Generation, Provider,
};

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Adapter for the OpenAI chat completions endpoint
pub struct OpenAiProvider {
    config: ProviderConfig,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Serialize)]
pub(crate) struct ChatBody<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
    pub max_tokens: usize,
    pub temperature: f32,
}

#[derive(Serialize)]
pub(crate) struct ChatMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

#[derive(Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
pub(crate) struct ChatChoice {
    pub message: ChatChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct ChatChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct ChatUsage {
    #[serde(default)]
    pub total_tokens: usize,
}

/// Build the chat messages array for a request
pub(crate) fn chat_messages(request: &GenerateRequest) -> Vec<ChatMessage<'_>> {
    let mut messages = Vec::with_capacity(2);
    if !request.system.is_empty() {
        messages.push(ChatMessage {
            role: "system",
            content: &request.system,
        });
    }
    messages.push(ChatMessage {
        role: "user",
        content: &request.prompt,
    });
    messages
}

impl OpenAiProvider {
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

        let body = ChatBody {
            model: &self.config.model,
            messages: chat_messages(request),
            max_tokens: request.max_tokens.unwrap_or(self.config.max_tokens),
            temperature: request.temperature.unwrap_or(self.config.temperature),
        };

        let response = self
            .client
            .post(CHAT_COMPLETIONS_URL)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(&self.config.name, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(&self.config.name, status, &text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ShowrunnerError::provider(&self.config.name, e.to_string()))?;

        let choice = parsed.choices.into_iter().next().ok_or_else(|| {
            ShowrunnerError::provider(&self.config.name, "response contained no choices")
        })?;

        if choice.finish_reason.as_deref() == Some("content_filter") {
            return Err(ShowrunnerError::content_blocked(
                &self.config.name,
                "finish_reason: content_filter",
            ));
        }

        let text = choice.message.content.unwrap_or_default();
        if text.is_empty() {
            return Err(ShowrunnerError::provider(
                &self.config.name,
                format!("empty response (finish_reason: {:?})", choice.finish_reason),
            ));
        }

        Ok(Generation {
            text,
            tokens_used: parsed.usage.map(|usage| usage.total_tokens),
        })
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
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
    fn test_messages_include_system_when_present() {
        let request = GenerateRequest::new("be terse", "hello");
        let messages = chat_messages(&request);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
    }

    #[test]
    fn test_messages_omit_empty_system() {
        let request = GenerateRequest::new("", "hello");
        let messages = chat_messages(&request);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
    }

    #[test]
    fn test_content_filter_detection() {
        let raw = r#"{
            "choices": [{"message": {"content": null}, "finish_reason": "content_filter"}]
        }"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(
            parsed.choices[0].finish_reason.as_deref(),
            Some("content_filter")
        );
    }

    #[test]
    fn test_response_parsing_with_usage() {
        let raw = r#"{
            "choices": [{"message": {"content": "done"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8}
        }"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.usage.unwrap().total_tokens, 8);
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("done")
        );
    }
}
