//! Provider abstraction
//!
//! A provider exposes exactly one operation: generate text for a
//! `{system, prompt, temperature, max_tokens}` request, bounded by a
//! deadline, failing with a classified error. Adapters translate
//! provider-specific refusal signals into `ContentBlocked` so the router
//! can apply its fallback policy; everything else about a provider is
//! opaque to the engine.

use async_trait::async_trait;
use std::time::Duration;

use showrunner_core::{ProviderConfig, ProviderKind, ShowrunnerError, ShowrunnerResult};

/// A single text-generation request
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    /// System prompt; empty string means none
    pub system: String,

    /// User prompt
    pub prompt: String,

    /// Sampling temperature override
    pub temperature: Option<f32>,

    /// Max output tokens override
    pub max_tokens: Option<usize>,

    /// Deadline override in seconds; defaults to the provider's timeout
    pub timeout_secs: Option<u64>,
}

impl GenerateRequest {
    /// Build a request from prompt and system text
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            ..Default::default()
        }
    }
}

/// A completed generation
#[derive(Debug, Clone)]
pub struct Generation {
    /// Full response text; never partial
    pub text: String,

    /// Tokens consumed, when the provider reports usage
    pub tokens_used: Option<usize>,
}

/// Contract every provider adapter implements
#[async_trait]
pub trait Provider: Send + Sync {
    /// Provider family of this adapter
    fn kind(&self) -> ProviderKind;

    /// Model identifier sent to the endpoint
    fn model(&self) -> &str;

    /// False when credentials are absent; an unavailable provider is never called
    fn available(&self) -> bool;

    /// Generate text for the request, bounded by the effective deadline
    async fn generate(&self, request: &GenerateRequest) -> ShowrunnerResult<Generation>;
}

/// Resolve the credential env var for a provider config.
/// Missing credentials are reported at call sites through `available()`.
pub(crate) fn resolve_credential(config: &ProviderConfig) -> Option<String> {
    match std::env::var(&config.credential_env_var) {
        Ok(key) if !key.trim().is_empty() => Some(key),
        _ => {
            tracing::warn!(
                provider = %config.name,
                env_var = %config.credential_env_var,
                "API key not found; provider unavailable"
            );
            None
        }
    }
}

/// Effective deadline for a request against a provider config
pub(crate) fn effective_timeout(config: &ProviderConfig, request: &GenerateRequest) -> Duration {
    Duration::from_secs(request.timeout_secs.unwrap_or(config.timeout_secs))
}

/// Classify a non-success HTTP status into the error taxonomy
pub(crate) fn classify_status(
    provider: &str,
    status: reqwest::StatusCode,
    body: &str,
) -> ShowrunnerError {
    let message = format!("HTTP {}: {}", status.as_u16(), truncate(body, 300));
    match status.as_u16() {
        408 => ShowrunnerError::timeout(provider, 0),
        429 => ShowrunnerError::rate_limit(provider, message),
        500 | 502 | 503 | 504 | 529 => ShowrunnerError::transient(provider, message),
        _ => ShowrunnerError::provider(provider, message),
    }
}

/// Map a reqwest transport failure into the taxonomy
pub(crate) fn classify_transport(provider: &str, err: reqwest::Error) -> ShowrunnerError {
    if err.is_timeout() {
        ShowrunnerError::timeout(provider, 0)
    } else if err.is_connect() {
        ShowrunnerError::transient(provider, format!("connection failed: {}", err))
    } else {
        ShowrunnerError::provider(provider, err.to_string())
    }
}

pub(crate) fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        let status = reqwest::StatusCode::from_u16(429).unwrap();
        assert!(classify_status("openai", status, "slow down").is_transient());

        let status = reqwest::StatusCode::from_u16(503).unwrap();
        assert!(classify_status("google", status, "overloaded").is_transient());

        let status = reqwest::StatusCode::from_u16(400).unwrap();
        let err = classify_status("xai", status, "bad request");
        assert!(!err.is_transient());
        assert!(!err.is_content_block());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("abcdef", 3), "abc");
        assert_eq!(truncate("ab", 10), "ab");
        // multi-byte characters must not be split
        assert_eq!(truncate("héllo wörld", 4), "héll");
    }

    #[test]
    fn test_request_builder() {
        let request = GenerateRequest::new("be brief", "summarize this");
        assert_eq!(request.system, "be brief");
        assert_eq!(request.prompt, "summarize this");
        assert!(request.temperature.is_none());
        assert!(request.timeout_secs.is_none());
    }
}
