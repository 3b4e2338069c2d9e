//! Error taxonomy for the orchestration engine
//!
//! Every failure in the engine is classified into one of the kinds below.
//! The kind drives policy: agents retry transient kinds, the router falls
//! back on content blocks, and everything else propagates unchanged.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used throughout the workspace
pub type ShowrunnerResult<T> = Result<T, ShowrunnerError>;

/// Classified engine error
#[derive(Debug, Error)]
pub enum ShowrunnerError {
    /// Invalid configuration: bad mapping, missing provider, wrong step arity.
    /// Fatal at workflow start.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Missing template variable or required collaboration key.
    /// Fatal to the step.
    #[error("bad input: {0}")]
    BadInput(String),

    /// No available provider for the requested function. Fatal.
    #[error("no available provider for function '{0}'")]
    NoProvider(String),

    /// Provider refused the content for policy reasons.
    /// Triggers router-level fallback exactly once.
    #[error("content blocked by {provider}: {reason}")]
    ContentBlocked { provider: String, reason: String },

    /// Provider call exceeded its deadline. Transient.
    #[error("provider '{provider}' timed out after {seconds}s")]
    Timeout { provider: String, seconds: u64 },

    /// Provider rate limit hit. Transient.
    #[error("provider '{provider}' rate limited: {message}")]
    RateLimit { provider: String, message: String },

    /// Recoverable provider failure (5xx, overloaded). Transient.
    #[error("transient failure from provider '{provider}': {message}")]
    Transient { provider: String, message: String },

    /// Non-transient provider failure. Propagated without retry.
    #[error("provider '{provider}' error: {message}")]
    Provider { provider: String, message: String },

    /// Raw text did not satisfy the agent's declared output shape.
    #[error("response parsing failed: {0}")]
    ParseFailed(String),

    /// Pipeline cancellation observed between steps.
    #[error("execution cancelled")]
    Cancelled,
}

impl ShowrunnerError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a bad-input error
    pub fn bad_input(message: impl Into<String>) -> Self {
        Self::BadInput(message.into())
    }

    /// Create a content-blocked error
    pub fn content_blocked(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ContentBlocked {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(provider: impl Into<String>, seconds: u64) -> Self {
        Self::Timeout {
            provider: provider.into(),
            seconds,
        }
    }

    /// Create a rate-limit error
    pub fn rate_limit(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RateLimit {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a transient provider error
    pub fn transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a non-transient provider error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a parse-failed error
    pub fn parse_failed(message: impl Into<String>) -> Self {
        Self::ParseFailed(message.into())
    }

    /// The classified kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::BadInput(_) => ErrorKind::BadInput,
            Self::NoProvider(_) => ErrorKind::NoProvider,
            Self::ContentBlocked { .. } => ErrorKind::ContentBlocked,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::RateLimit { .. } => ErrorKind::RateLimit,
            Self::Transient { .. } => ErrorKind::Transient,
            Self::Provider { .. } => ErrorKind::Provider,
            Self::ParseFailed(_) => ErrorKind::ParseFailed,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether an agent may retry after this error
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::RateLimit { .. } | Self::Transient { .. }
        )
    }

    /// Whether this error is a content-policy refusal
    pub fn is_content_block(&self) -> bool {
        matches!(self, Self::ContentBlocked { .. })
    }
}

/// Lightweight error classification, recorded in agent responses and results
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    BadInput,
    NoProvider,
    ContentBlocked,
    Timeout,
    RateLimit,
    Transient,
    Provider,
    ParseFailed,
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Configuration => "configuration",
            Self::BadInput => "bad_input",
            Self::NoProvider => "no_provider",
            Self::ContentBlocked => "content_blocked",
            Self::Timeout => "timeout",
            Self::RateLimit => "rate_limit",
            Self::Transient => "transient",
            Self::Provider => "provider",
            Self::ParseFailed => "parse_failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", name)
    }
}
