//! Shared test fixtures: scripted in-memory providers wired into a router
//! so patterns run without any network.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use showrunner_core::{AgentConfig, ProviderKind, ShowrunnerError, ShowrunnerResult};
use showrunner_llm::{FunctionRouter, GenerateRequest, Generation, Provider};
use showrunner_runtime::{Agent, AgentPool, ParseFn};

pub type Behavior =
    Arc<dyn Fn(&GenerateRequest, usize) -> ShowrunnerResult<Generation> + Send + Sync>;

/// Counters shared across scripted providers to observe scheduling
#[derive(Default)]
pub struct Gauge {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Gauge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn max(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Deterministic in-memory provider
pub struct ScriptedProvider {
    kind: ProviderKind,
    available: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
    behavior: Behavior,
    gauge: Option<Arc<Gauge>>,
    event_log: Option<(String, Arc<Mutex<Vec<String>>>)>,
}

impl ScriptedProvider {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            kind: ProviderKind::Xai,
            available: true,
            delay: None,
            calls: AtomicUsize::new(0),
            behavior,
            gauge: None,
            event_log: None,
        }
    }

    /// Always returns the same text
    pub fn ok(text: &str) -> Self {
        let text = text.to_string();
        Self::new(Arc::new(move |_, _| {
            Ok(Generation {
                text: text.clone(),
                tokens_used: Some(10),
            })
        }))
    }

    /// Returns the nth entry per call, repeating the last
    pub fn sequence(outputs: Vec<&str>) -> Self {
        let outputs: Vec<String> = outputs.into_iter().map(String::from).collect();
        Self::new(Arc::new(move |_, call| {
            let index = call.min(outputs.len() - 1);
            Ok(Generation {
                text: outputs[index].clone(),
                tokens_used: Some(10),
            })
        }))
    }

    /// Always fails with the given error
    pub fn failing(err: impl Fn() -> ShowrunnerError + Send + Sync + 'static) -> Self {
        Self::new(Arc::new(move |_, _| Err(err())))
    }

    /// Echoes the prompt it received
    pub fn echo() -> Self {
        Self::new(Arc::new(|request, _| {
            Ok(Generation {
                text: request.prompt.clone(),
                tokens_used: Some(request.prompt.len()),
            })
        }))
    }

    pub fn with_kind(mut self, kind: ProviderKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_gauge(mut self, gauge: Arc<Gauge>) -> Self {
        self.gauge = Some(gauge);
        self
    }

    pub fn with_event_log(mut self, name: &str, log: Arc<Mutex<Vec<String>>>) -> Self {
        self.event_log = Some((name.to_string(), log));
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn model(&self) -> &str {
        "scripted"
    }

    fn available(&self) -> bool {
        self.available
    }

    async fn generate(&self, request: &GenerateRequest) -> ShowrunnerResult<Generation> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(ref gauge) = self.gauge {
            gauge.enter();
        }
        if let Some((ref name, ref log)) = self.event_log {
            log.lock().unwrap().push(format!("start:{}", name));
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some((ref name, ref log)) = self.event_log {
            log.lock().unwrap().push(format!("end:{}", name));
        }
        if let Some(ref gauge) = self.gauge {
            gauge.exit();
        }

        (self.behavior)(request, call)
    }
}

/// Build a router where each entry is a provider routed from a function id
/// of the same name.
pub fn scripted_router(entries: Vec<(&str, Arc<ScriptedProvider>)>) -> Arc<FunctionRouter> {
    let mut router = FunctionRouter::empty();
    for (name, provider) in entries {
        router = router
            .with_provider(name, provider as Arc<dyn Provider>)
            .with_route(name, name, None);
    }
    Arc::new(router)
}

/// Agent whose function id matches its name, with the default raw parser
pub fn agent(name: &str, router: &Arc<FunctionRouter>) -> Agent {
    Agent::new(AgentConfig::new(name, name), Arc::clone(router))
}

/// Agent with an explicit parser
pub fn agent_with_parser(name: &str, router: &Arc<FunctionRouter>, parser: ParseFn) -> Agent {
    Agent::with_parser(AgentConfig::new(name, name), Arc::clone(router), parser)
}

/// Pool preloaded with the given agents
pub fn pool_of(agents: Vec<Agent>, max_concurrent: usize) -> AgentPool {
    let mut pool = AgentPool::new(max_concurrent);
    pool.register_many(agents);
    pool
}

pub fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}
