//! xAI-style chat completions adapter
//!
//! Wire-compatible with the OpenAI chat format but served from the x.ai
//! endpoint. This family does not emit content-policy refusals, which is
//! what makes it the usual fallback target for blocked content.

use async_trait::async_trait;

use showrunner_core::{ProviderConfig, ProviderKind, ShowrunnerError, ShowrunnerResult};

use crate::provider::{
    classify_status, classify_transport, effective_timeout, resolve_credential, GenerateRequest,
    Generation, Provider,
};

use super::openai::{chat_messages, ChatBody, ChatResponse};

const CHAT_COMPLETIONS_URL: &str = "https://api.x.ai/v1/chat/completions";

/// Adapter for the xAI chat completions endpoint
pub struct XaiProvider {
    config: ProviderConfig,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl XaiProvider {
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

        let text = choice.message.content.unwrap_or_default();
        if text.is_empty() {
            return Err(ShowrunnerError::provider(
                &self.config.name,
                "empty response",
            ));
        }

        Ok(Generation {
            text,
            tokens_used: parsed.usage.map(|usage| usage.total_tokens),
        })
    }
}

#[async_trait]
impl Provider for XaiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Xai
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
