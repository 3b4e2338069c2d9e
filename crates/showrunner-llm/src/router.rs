//! Function router
//!
//! Maps logical function ids to providers and applies the content-block
//! fallback policy. The router never rewrites prompts: a fallback provider
//! sees exactly the request the primary saw. Per-function statistics are
//! kept off the provider call path in a concurrent map.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use showrunner_core::{ShowrunnerConfig, ShowrunnerError, ShowrunnerResult};

use crate::provider::{GenerateRequest, Generation, Provider};
use crate::providers::create_provider;

/// Per-function routing statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct RoutingStats {
    /// Primary provider name configured for the function
    pub provider: String,

    /// Number of primary calls made
    pub call_count: u64,

    /// Number of calls that ended in an error
    pub error_count: u64,

    /// Number of content-block fallback attempts
    pub fallback_count: u64,

    /// Cumulative wall time across calls, in milliseconds
    pub total_time_ms: u64,

    /// When the function was last routed
    pub last_used: Option<DateTime<Utc>>,
}

impl RoutingStats {
    /// Mean wall time per call in milliseconds
    pub fn avg_time_ms(&self) -> f64 {
        if self.call_count == 0 {
            return 0.0;
        }
        self.total_time_ms as f64 / self.call_count as f64
    }

    /// Fraction of calls that ended in an error
    pub fn error_rate(&self) -> f64 {
        if self.call_count == 0 {
            return 0.0;
        }
        self.error_count as f64 / self.call_count as f64
    }
}

#[derive(Debug, Clone)]
struct FunctionRoute {
    primary: String,
    fallback: Option<String>,
}

/// Routes logical function calls to providers
pub struct FunctionRouter {
    /// Providers in configuration order; order decides availability fallthrough
    providers: Vec<(String, Arc<dyn Provider>)>,

    /// Function id -> provider route
    routes: HashMap<String, FunctionRoute>,

    /// Observable per-function statistics
    stats: DashMap<String, RoutingStats>,
}

impl FunctionRouter {
    /// Build a router from configuration, constructing one adapter per provider
    pub fn from_config(config: &ShowrunnerConfig) -> ShowrunnerResult<Self> {
        config.validate()?;

        let providers: Vec<(String, Arc<dyn Provider>)> = config
            .providers
            .iter()
            .map(|p| (p.name.clone(), create_provider(p.clone())))
            .collect();

        let routes: HashMap<String, FunctionRoute> = config
            .function_mappings
            .iter()
            .map(|m| {
                (
                    m.function.clone(),
                    FunctionRoute {
                        primary: m.primary.clone(),
                        fallback: m.fallback.clone(),
                    },
                )
            })
            .collect();

        let stats = DashMap::new();
        for (function, route) in &routes {
            stats.insert(
                function.clone(),
                RoutingStats {
                    provider: route.primary.clone(),
                    ..Default::default()
                },
            );
        }

        Ok(Self {
            providers,
            routes,
            stats,
        })
    }

    /// An empty router; providers are added with `with_provider`
    pub fn empty() -> Self {
        Self {
            providers: Vec::new(),
            routes: HashMap::new(),
            stats: DashMap::new(),
        }
    }

    /// Register or replace a provider under a name
    pub fn with_provider(mut self, name: impl Into<String>, provider: Arc<dyn Provider>) -> Self {
        let name = name.into();
        if let Some(entry) = self.providers.iter_mut().find(|(n, _)| *n == name) {
            warn!(provider = %name, "replacing existing provider");
            entry.1 = provider;
        } else {
            self.providers.push((name, provider));
        }
        self
    }

    /// Register or replace a function route
    pub fn with_route(
        mut self,
        function: impl Into<String>,
        primary: impl Into<String>,
        fallback: Option<String>,
    ) -> Self {
        let function = function.into();
        let primary = primary.into();
        self.stats.insert(
            function.clone(),
            RoutingStats {
                provider: primary.clone(),
                ..Default::default()
            },
        );
        self.routes.insert(function, FunctionRoute { primary, fallback });
        self
    }

    /// Route a function call to its provider.
    ///
    /// Selection: the mapped primary if available, else the first configured
    /// available provider. On `ContentBlocked` the configured fallback is
    /// tried exactly once with the identical request; every other error
    /// propagates so the agent's own retry policy can act on it.
    pub async fn route(
        &self,
        function: &str,
        request: &GenerateRequest,
    ) -> ShowrunnerResult<Generation> {
        let route = self.routes.get(function);
        let provider = self.select_provider(function, route)?;

        debug!(function, provider = %provider.0, model = provider.1.model(), "routing call");
        let start = Instant::now();
        let result = provider.1.generate(request).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(generation) => {
                self.record_call(function, &provider.0, elapsed_ms, false);
                info!(
                    function,
                    provider = %provider.0,
                    elapsed_ms,
                    chars = generation.text.len(),
                    "call completed"
                );
                Ok(generation)
            }
            Err(err) if err.is_content_block() => {
                self.record_call(function, &provider.0, elapsed_ms, true);
                warn!(function, provider = %provider.0, %err, "content blocked");
                self.try_fallback(function, route, &provider, request, err)
                    .await
            }
            Err(err) => {
                self.record_call(function, &provider.0, elapsed_ms, true);
                warn!(function, provider = %provider.0, %err, "call failed");
                Err(err)
            }
        }
    }

    /// Make exactly one fallback attempt after a content block
    async fn try_fallback(
        &self,
        function: &str,
        route: Option<&FunctionRoute>,
        primary: &(String, Arc<dyn Provider>),
        request: &GenerateRequest,
        original: ShowrunnerError,
    ) -> ShowrunnerResult<Generation> {
        let Some(fallback_name) = route.and_then(|r| r.fallback.as_deref()) else {
            warn!(function, "no fallback configured for blocked content");
            return Err(original);
        };

        let Some(fallback) = self.provider(fallback_name) else {
            warn!(function, fallback = fallback_name, "fallback provider not registered");
            return Err(original);
        };

        if !fallback.available() {
            warn!(function, fallback = fallback_name, "fallback provider unavailable");
            return Err(original);
        }

        if fallback.kind() == primary.1.kind() {
            warn!(
                function,
                fallback = fallback_name,
                "fallback shares the blocking provider kind; not retrying"
            );
            return Err(original);
        }

        info!(function, fallback = fallback_name, "retrying blocked content on fallback");
        let start = Instant::now();
        let result = fallback.generate(request).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        if let Some(mut stats) = self.stats.get_mut(function) {
            stats.fallback_count += 1;
            stats.total_time_ms += elapsed_ms;
        }

        match result {
            Ok(generation) => {
                info!(
                    function,
                    fallback = fallback_name,
                    chars = generation.text.len(),
                    "fallback processed blocked content"
                );
                Ok(generation)
            }
            Err(fallback_err) => {
                warn!(function, fallback = fallback_name, %fallback_err, "fallback also failed");
                if let Some(mut stats) = self.stats.get_mut(function) {
                    stats.error_count += 1;
                }
                Err(fallback_err)
            }
        }
    }

    /// Pick the provider for a function: mapped primary if available, else
    /// the first configured provider that is available.
    fn select_provider(
        &self,
        function: &str,
        route: Option<&FunctionRoute>,
    ) -> ShowrunnerResult<(String, Arc<dyn Provider>)> {
        if let Some(route) = route {
            if let Some(provider) = self.provider(&route.primary) {
                if provider.available() {
                    return Ok((route.primary.clone(), provider));
                }
                warn!(
                    function,
                    primary = %route.primary,
                    "primary provider unavailable; falling through"
                );
            }
        }

        self.providers
            .iter()
            .find(|(_, provider)| provider.available())
            .map(|(name, provider)| (name.clone(), Arc::clone(provider)))
            .ok_or_else(|| ShowrunnerError::NoProvider(function.to_string()))
    }

    fn provider(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, provider)| Arc::clone(provider))
    }

    fn record_call(&self, function: &str, provider: &str, elapsed_ms: u64, errored: bool) {
        let mut stats = self
            .stats
            .entry(function.to_string())
            .or_insert_with(|| RoutingStats {
                provider: provider.to_string(),
                ..Default::default()
            });
        stats.call_count += 1;
        stats.total_time_ms += elapsed_ms;
        stats.last_used = Some(Utc::now());
        if errored {
            stats.error_count += 1;
        }
    }

    /// Whether any provider is currently available
    pub fn any_available(&self) -> bool {
        self.providers.iter().any(|(_, provider)| provider.available())
    }

    /// Registered provider names with their availability, in config order
    pub fn provider_availability(&self) -> Vec<(String, bool)> {
        self.providers
            .iter()
            .map(|(name, provider)| (name.clone(), provider.available()))
            .collect()
    }

    /// Configured routes as (function, primary, fallback), sorted by function
    pub fn routes(&self) -> Vec<(String, String, Option<String>)> {
        let mut routes: Vec<(String, String, Option<String>)> = self
            .routes
            .iter()
            .map(|(function, route)| {
                (function.clone(), route.primary.clone(), route.fallback.clone())
            })
            .collect();
        routes.sort_by(|a, b| a.0.cmp(&b.0));
        routes
    }

    /// Statistics for one function
    pub fn stats(&self, function: &str) -> Option<RoutingStats> {
        self.stats.get(function).map(|entry| entry.clone())
    }

    /// Statistics for every function, sorted by function id
    pub fn all_stats(&self) -> Vec<(String, RoutingStats)> {
        let mut all: Vec<(String, RoutingStats)> = self
            .stats
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}
