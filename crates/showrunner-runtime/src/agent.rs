//! Bound agents
//!
//! An `Agent` is an `AgentConfig` bound to a router and a parse function.
//! Execution renders the prompt, calls through the router with the agent's
//! retry policy, and parses the final text. Agents are constructed once and
//! shared across pattern invocations.

use parking_lot::RwLock;
use rand::Rng;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use showrunner_core::{template, AgentConfig, AgentResponse, ShowrunnerError, ShowrunnerResult};
use showrunner_llm::{FunctionRouter, GenerateRequest};

use crate::parsers::{raw_text, ParseFn};

/// Base delay for the retry back-off; doubles per attempt with jitter
const RETRY_BACKOFF_BASE_MS: u64 = 200;

/// A configured agent bound to a router and parser
pub struct Agent {
    config: AgentConfig,
    router: Arc<FunctionRouter>,
    parser: ParseFn,
    /// Lazily loaded template file content. Duplicate concurrent loads are
    /// idempotent; one winner's value is retained.
    template_cache: RwLock<Option<String>>,
}

impl Agent {
    /// Bind a config to a router with the raw-text parser
    pub fn new(config: AgentConfig, router: Arc<FunctionRouter>) -> Self {
        Self::with_parser(config, router, raw_text())
    }

    /// Bind a config to a router with an explicit parser
    pub fn with_parser(config: AgentConfig, router: Arc<FunctionRouter>, parser: ParseFn) -> Self {
        Self {
            config,
            router,
            parser,
            template_cache: RwLock::new(None),
        }
    }

    /// Agent name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Agent configuration
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Execute the agent against an input map.
    ///
    /// Failures never panic out; every outcome is an `AgentResponse` with a
    /// classified error kind, so pattern aggregation stays uniform.
    pub async fn execute(&self, input: &HashMap<String, Value>) -> AgentResponse {
        let start = Instant::now();

        let prompt = match self.render_prompt(input) {
            Ok(prompt) => prompt,
            Err(err) => {
                warn!(agent = %self.config.name, %err, "prompt rendering failed");
                return AgentResponse::error_response(err.to_string(), err.kind())
                    .with_execution_time_ms(start.elapsed().as_millis() as u64);
            }
        };

        let request = GenerateRequest {
            system: self.config.system_prompt.clone(),
            prompt,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            timeout_secs: self.config.timeout_secs,
        };

        let generation = match self.call_with_retries(&request).await {
            Ok(generation) => generation,
            Err(err) => {
                return AgentResponse::error_response(err.to_string(), err.kind())
                    .with_execution_time_ms(start.elapsed().as_millis() as u64);
            }
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        let tokens = generation.tokens_used.unwrap_or(0);

        match (self.parser)(&generation.text) {
            Ok(content) => {
                debug!(
                    agent = %self.config.name,
                    elapsed_ms,
                    tokens,
                    "agent execution complete"
                );
                AgentResponse::success_response(content)
                    .with_raw(generation.text)
                    .with_tokens(tokens)
                    .with_execution_time_ms(elapsed_ms)
            }
            Err(err) => {
                warn!(agent = %self.config.name, %err, "response parsing failed");
                AgentResponse::error_response(err.to_string(), err.kind())
                    .with_raw(generation.text)
                    .with_tokens(tokens)
                    .with_execution_time_ms(elapsed_ms)
            }
        }
    }

    /// Invoke the router up to `retry_count` times. Only transient kinds are
    /// retried; everything else ends the call immediately.
    async fn call_with_retries(
        &self,
        request: &GenerateRequest,
    ) -> ShowrunnerResult<showrunner_llm::Generation> {
        let attempts = self.config.retry_count.max(1);
        let mut last_err = None;

        for attempt in 1..=attempts {
            match self.router.route(&self.config.function, request).await {
                Ok(generation) => return Ok(generation),
                Err(err) if err.is_transient() && attempt < attempts => {
                    let delay = backoff_delay(attempt);
                    warn!(
                        agent = %self.config.name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %err,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_err.unwrap_or_else(|| {
            ShowrunnerError::provider(&self.config.function, "retry loop exhausted")
        }))
    }

    /// Render the prompt from the template and input map. Without a template
    /// the input's `prompt` key is used verbatim.
    fn render_prompt(&self, input: &HashMap<String, Value>) -> ShowrunnerResult<String> {
        if let Some(ref inline) = self.config.template {
            return template::render(inline, input);
        }

        if self.config.template_path.is_some() {
            let loaded = self.load_template()?;
            return template::render(&loaded, input);
        }

        match input.get("prompt") {
            Some(Value::String(prompt)) => Ok(prompt.clone()),
            Some(other) => Ok(other.to_string()),
            None => Err(ShowrunnerError::bad_input(format!(
                "agent '{}' has no template and input has no 'prompt' key",
                self.config.name
            ))),
        }
    }

    fn load_template(&self) -> ShowrunnerResult<String> {
        if let Some(ref cached) = *self.template_cache.read() {
            return Ok(cached.clone());
        }

        let path = self.config.template_path.as_ref().ok_or_else(|| {
            ShowrunnerError::config(format!("agent '{}' has no template path", self.config.name))
        })?;

        let content = std::fs::read_to_string(path).map_err(|e| {
            ShowrunnerError::bad_input(format!(
                "failed to load template {}: {}",
                path.display(),
                e
            ))
        })?;

        let mut cache = self.template_cache.write();
        if cache.is_none() {
            *cache = Some(content.clone());
        }
        Ok(content)
    }
}

/// Exponential back-off with jitter: 200ms, 400ms, 800ms, ... plus 0-100ms
fn backoff_delay(attempt: u32) -> Duration {
    let base = RETRY_BACKOFF_BASE_MS.saturating_mul(1 << (attempt - 1).min(6));
    let jitter = rand::thread_rng().gen_range(0..100);
    Duration::from_millis(base + jitter)
}

/// Reference-counted agent handle
pub type AgentRef = Arc<Agent>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows() {
        let first = backoff_delay(1);
        let third = backoff_delay(3);
        assert!(first.as_millis() >= 200 && first.as_millis() < 300);
        assert!(third.as_millis() >= 800 && third.as_millis() < 900);
    }

    #[test]
    fn test_backoff_capped() {
        // attempt numbers beyond the cap must not overflow the shift
        let huge = backoff_delay(40);
        assert!(huge.as_millis() >= 200 * 64);
        assert!(huge.as_millis() < 200 * 64 + 100);
    }
}
