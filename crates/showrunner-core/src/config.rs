//! Engine configuration
//!
//! A single JSON document describes the provider endpoints, the mapping of
//! logical functions to providers, and the execution defaults. The document
//! is loaded once at startup and is immutable for the lifetime of a run;
//! credential values themselves are resolved from the environment at
//! provider construction, never stored here.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ShowrunnerError, ShowrunnerResult};

/// Supported provider families
///
/// Each kind differs only in how the adapter maps the request fields and
/// translates provider-specific failures into the error taxonomy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Anthropic-style messages endpoint
    Anthropic,
    /// OpenAI-style chat completions endpoint
    OpenAi,
    /// Google-style generative content endpoint
    Google,
    /// xAI-style chat completions endpoint
    Xai,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Google => "google",
            Self::Xai => "xai",
        };
        write!(f, "{}", name)
    }
}

/// Configuration for one named provider endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique name referenced by function mappings
    pub name: String,

    /// Provider family
    pub provider_kind: ProviderKind,

    /// Model identifier sent to the endpoint
    pub model: String,

    /// Environment variable holding the API key
    pub credential_env_var: String,

    /// Default sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Default maximum output tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Wall-clock deadline for a single call, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> usize {
    4096
}

fn default_timeout_secs() -> u64 {
    60
}

/// Mapping of a logical function to its providers
///
/// The function id is an opaque string chosen by the caller; typical ids are
/// "tag_validation", "story_generation", "director", "assistant_reasoning".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionMapping {
    /// Logical function id
    pub function: String,

    /// Name of the primary provider config
    pub primary: String,

    /// Name of the fallback provider config, consulted only on content block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

/// Execution defaults applied where agents and pools do not override
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionDefaults {
    /// Pool concurrency limit C
    #[serde(default = "default_parallel_agents")]
    pub parallel_agents: usize,

    /// Default threshold for majority consensus
    #[serde(default = "default_consensus_threshold")]
    pub consensus_threshold: f64,

    /// Default agent retry count
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Advisory chunking hint for callers; not consumed by the engine
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Advisory chunking hint for callers; not consumed by the engine
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_parallel_agents() -> usize {
    5
}

fn default_consensus_threshold() -> f64 {
    0.8
}

fn default_max_retries() -> u32 {
    3
}

fn default_chunk_size() -> usize {
    2000
}

fn default_chunk_overlap() -> usize {
    200
}

impl Default for ExecutionDefaults {
    fn default() -> Self {
        Self {
            parallel_agents: default_parallel_agents(),
            consensus_threshold: default_consensus_threshold(),
            max_retries: default_max_retries(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

/// Top-level engine configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShowrunnerConfig {
    /// Named provider endpoints, in priority order
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    /// Logical function routes
    #[serde(default)]
    pub function_mappings: Vec<FunctionMapping>,

    /// Execution defaults
    #[serde(default)]
    pub defaults: ExecutionDefaults,
}

impl ShowrunnerConfig {
    /// Parse a configuration document from JSON
    pub fn from_json(json: &str) -> ShowrunnerResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| ShowrunnerError::config(format!("failed to parse config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration document from a file
    pub fn from_file(path: impl AsRef<Path>) -> ShowrunnerResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ShowrunnerError::config(format!("failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// Look up a provider config by name
    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }

    /// Look up the mapping for a logical function
    pub fn mapping_for(&self, function: &str) -> Option<&FunctionMapping> {
        self.function_mappings.iter().find(|m| m.function == function)
    }

    /// Validate internal consistency
    pub fn validate(&self) -> ShowrunnerResult<()> {
        let mut names = std::collections::HashSet::new();
        for provider in &self.providers {
            if !names.insert(provider.name.as_str()) {
                return Err(ShowrunnerError::config(format!(
                    "duplicate provider name: {}",
                    provider.name
                )));
            }
            if provider.timeout_secs == 0 {
                return Err(ShowrunnerError::config(format!(
                    "provider '{}' has zero timeout",
                    provider.name
                )));
            }
        }

        for mapping in &self.function_mappings {
            let primary = self.provider(&mapping.primary).ok_or_else(|| {
                ShowrunnerError::config(format!(
                    "function '{}' references unknown primary provider '{}'",
                    mapping.function, mapping.primary
                ))
            })?;

            if let Some(ref fallback_name) = mapping.fallback {
                let fallback = self.provider(fallback_name).ok_or_else(|| {
                    ShowrunnerError::config(format!(
                        "function '{}' references unknown fallback provider '{}'",
                        mapping.function, fallback_name
                    ))
                })?;
                if fallback.provider_kind == primary.provider_kind {
                    return Err(ShowrunnerError::config(format!(
                        "function '{}' fallback must differ in provider kind from primary ({})",
                        mapping.function, primary.provider_kind
                    )));
                }
            }
        }

        if self.defaults.max_retries == 0 {
            return Err(ShowrunnerError::config("max_retries must be at least 1"));
        }
        if self.defaults.consensus_threshold <= 0.0 || self.defaults.consensus_threshold > 1.0 {
            return Err(ShowrunnerError::config(
                "consensus_threshold must be in (0, 1]",
            ));
        }
        if self.defaults.parallel_agents == 0 {
            return Err(ShowrunnerError::config("parallel_agents must be at least 1"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> &'static str {
        r#"{
            "providers": [
                {
                    "name": "gemini-flash",
                    "provider_kind": "google",
                    "model": "gemini-2.0-flash",
                    "credential_env_var": "GOOGLE_API_KEY",
                    "temperature": 0.7,
                    "max_tokens": 8192,
                    "timeout_secs": 90
                },
                {
                    "name": "grok",
                    "provider_kind": "xai",
                    "model": "grok-2-latest",
                    "credential_env_var": "XAI_API_KEY"
                }
            ],
            "function_mappings": [
                {"function": "tag_validation", "primary": "gemini-flash", "fallback": "grok"},
                {"function": "story_generation", "primary": "gemini-flash"}
            ],
            "defaults": {
                "parallel_agents": 5,
                "consensus_threshold": 0.8,
                "max_retries": 3
            }
        }"#
    }

    #[test]
    fn test_parse_full_config() {
        let config = ShowrunnerConfig::from_json(sample_config()).unwrap();

        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.function_mappings.len(), 2);

        let gemini = config.provider("gemini-flash").unwrap();
        assert_eq!(gemini.provider_kind, ProviderKind::Google);
        assert_eq!(gemini.max_tokens, 8192);
        assert_eq!(gemini.timeout_secs, 90);

        let grok = config.provider("grok").unwrap();
        assert_eq!(grok.temperature, 0.7); // default
        assert_eq!(grok.max_tokens, 4096); // default
        assert_eq!(grok.timeout_secs, 60); // default

        let mapping = config.mapping_for("tag_validation").unwrap();
        assert_eq!(mapping.primary, "gemini-flash");
        assert_eq!(mapping.fallback.as_deref(), Some("grok"));
    }

    #[test]
    fn test_defaults_block() {
        let config = ShowrunnerConfig::from_json(r#"{"providers": []}"#).unwrap();
        assert_eq!(config.defaults.parallel_agents, 5);
        assert_eq!(config.defaults.consensus_threshold, 0.8);
        assert_eq!(config.defaults.max_retries, 3);
        assert_eq!(config.defaults.chunk_size, 2000);
        assert_eq!(config.defaults.chunk_overlap, 200);
    }

    #[test]
    fn test_unknown_primary_rejected() {
        let json = r#"{
            "providers": [],
            "function_mappings": [{"function": "director", "primary": "missing"}]
        }"#;
        let err = ShowrunnerConfig::from_json(json).unwrap_err();
        assert!(err.to_string().contains("unknown primary provider"));
    }

    #[test]
    fn test_fallback_must_differ_in_kind() {
        let json = r#"{
            "providers": [
                {"name": "a", "provider_kind": "google", "model": "m", "credential_env_var": "K1"},
                {"name": "b", "provider_kind": "google", "model": "m2", "credential_env_var": "K2"}
            ],
            "function_mappings": [{"function": "director", "primary": "a", "fallback": "b"}]
        }"#;
        let err = ShowrunnerConfig::from_json(json).unwrap_err();
        assert!(err.to_string().contains("differ in provider kind"));
    }

    #[test]
    fn test_duplicate_provider_names_rejected() {
        let json = r#"{
            "providers": [
                {"name": "a", "provider_kind": "google", "model": "m", "credential_env_var": "K"},
                {"name": "a", "provider_kind": "xai", "model": "m2", "credential_env_var": "K2"}
            ]
        }"#;
        assert!(ShowrunnerConfig::from_json(json).is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let json = r#"{
            "providers": [
                {"name": "a", "provider_kind": "google", "model": "m",
                 "credential_env_var": "K", "timeout_secs": 0}
            ]
        }"#;
        assert!(ShowrunnerConfig::from_json(json).is_err());
    }

    #[test]
    fn test_provider_kind_serialization() {
        let kind: ProviderKind = serde_json::from_str("\"anthropic\"").unwrap();
        assert_eq!(kind, ProviderKind::Anthropic);
        assert_eq!(serde_json::to_string(&ProviderKind::Xai).unwrap(), "\"xai\"");
    }
}
