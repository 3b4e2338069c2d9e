//! Agent configuration and response types
//!
//! An agent is a named unit owning a prompt recipe and a parsing contract.
//! The runtime crate binds these configs to a router and a parser; the types
//! here are plain data so workflow manifests can carry them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::ErrorKind;

/// Configuration for one agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent name, unique within a pool
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Logical function id used for provider routing
    pub function: String,

    /// System prompt sent with every call
    #[serde(default)]
    pub system_prompt: String,

    /// Inline prompt template with `{variable}` placeholders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    /// Path to a prompt template file, loaded lazily on first use
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_path: Option<PathBuf>,

    /// Sampling temperature override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Max output tokens override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,

    /// Number of router invocations allowed for transient failures
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Per-call deadline override, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

fn default_retry_count() -> u32 {
    3
}

impl AgentConfig {
    /// Create a config with required fields and defaults for the rest
    pub fn new(name: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            function: function.into(),
            system_prompt: String::new(),
            template: None,
            template_path: None,
            temperature: None,
            max_tokens: None,
            retry_count: default_retry_count(),
            timeout_secs: None,
        }
    }

    /// Set the system prompt
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Set an inline prompt template
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Set a template file path
    pub fn with_template_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.template_path = Some(path.into());
        self
    }

    /// Set the retry count (clamped to at least 1)
    pub fn with_retry_count(mut self, count: u32) -> Self {
        self.retry_count = count.max(1);
        self
    }

    /// Set the sampling temperature override
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Result of a single agent execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    /// True when parsed content is present and no error was recorded
    pub success: bool,

    /// Parsed content; shape is the agent's contract, opaque to the engine
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,

    /// Raw provider text, preserved even when parsing fails
    #[serde(default)]
    pub raw_response: String,

    /// Tokens consumed, when the provider reports them
    #[serde(default)]
    pub tokens_used: usize,

    /// Wall time of the execution in milliseconds
    #[serde(default)]
    pub execution_time_ms: u64,

    /// Free-form execution metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,

    /// Error message when the execution failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Classified kind of the failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl AgentResponse {
    /// Build a successful response
    pub fn success_response(content: serde_json::Value) -> Self {
        Self {
            success: true,
            content: Some(content),
            raw_response: String::new(),
            tokens_used: 0,
            execution_time_ms: 0,
            metadata: HashMap::new(),
            error: None,
            error_kind: None,
        }
    }

    /// Build a failed response
    pub fn error_response(error: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            success: false,
            content: None,
            raw_response: String::new(),
            tokens_used: 0,
            execution_time_ms: 0,
            metadata: HashMap::new(),
            error: Some(error.into()),
            error_kind: Some(kind),
        }
    }

    /// Attach the raw provider text
    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw_response = raw.into();
        self
    }

    /// Attach token usage
    pub fn with_tokens(mut self, tokens: usize) -> Self {
        self.tokens_used = tokens;
        self
    }

    /// Attach wall time
    pub fn with_execution_time_ms(mut self, millis: u64) -> Self {
        self.execution_time_ms = millis;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_agent_config_defaults() {
        let config = AgentConfig::new("frame-composer", "director");
        assert_eq!(config.name, "frame-composer");
        assert_eq!(config.function, "director");
        assert_eq!(config.retry_count, 3);
        assert!(config.template.is_none());
        assert!(config.temperature.is_none());
    }

    #[test]
    fn test_retry_count_clamped() {
        let config = AgentConfig::new("a", "f").with_retry_count(0);
        assert_eq!(config.retry_count, 1);
    }

    #[test]
    fn test_agent_config_json_roundtrip() {
        let config = AgentConfig::new("tagger", "tag_validation")
            .with_system_prompt("You extract tags.")
            .with_template("Extract tags from:\n{source_text}")
            .with_temperature(0.2);

        let json = serde_json::to_string(&config).unwrap();
        let back: AgentConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(back.name, "tagger");
        assert_eq!(back.system_prompt, "You extract tags.");
        assert_eq!(back.temperature, Some(0.2));
        assert_eq!(back.template.as_deref(), Some("Extract tags from:\n{source_text}"));
    }

    #[test]
    fn test_success_response() {
        let response = AgentResponse::success_response(json!({"tags": ["CHAR_MEI"]}))
            .with_raw("[CHAR_MEI]")
            .with_tokens(42);

        assert!(response.success);
        assert_eq!(response.tokens_used, 42);
        assert_eq!(response.raw_response, "[CHAR_MEI]");
        assert!(response.error.is_none());
    }

    #[test]
    fn test_error_response_preserves_raw() {
        let response = AgentResponse::error_response("not valid JSON", ErrorKind::ParseFailed)
            .with_raw("some malformed output");

        assert!(!response.success);
        assert!(response.content.is_none());
        assert_eq!(response.error_kind, Some(ErrorKind::ParseFailed));
        assert_eq!(response.raw_response, "some malformed output");
    }
}
