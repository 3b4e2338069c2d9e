//! Agent pool
//!
//! Registry of bound agents plus the bounded-concurrency fan-out and
//! ordered sequential primitives the execution patterns are built from.
//! The pool is read-only after registration; one semaphore of size C caps
//! concurrent executions across every parallel invocation on the pool.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use showrunner_core::{
    AgentResponse, ErrorKind, PoolResult, PooledExecution, CHAIN_KEY,
};

use crate::agent::{Agent, AgentRef};

/// Pool of agents with a shared concurrency bound
pub struct AgentPool {
    agents: HashMap<String, AgentRef>,
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl AgentPool {
    /// Create a pool with concurrency limit C (clamped to at least 1)
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            agents: HashMap::new(),
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// Register an agent; replacing an existing name logs a warning
    pub fn register(&mut self, agent: Agent) {
        let name = agent.name().to_string();
        if self.agents.contains_key(&name) {
            warn!(agent = %name, "replacing existing agent");
        }
        debug!(agent = %name, "registered agent");
        self.agents.insert(name, Arc::new(agent));
    }

    /// Register several agents
    pub fn register_many(&mut self, agents: Vec<Agent>) {
        for agent in agents {
            self.register(agent);
        }
    }

    /// Get an agent by name
    pub fn get(&self, name: &str) -> Option<AgentRef> {
        self.agents.get(name).cloned()
    }

    /// Whether an agent is registered
    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    /// Registered agent names, sorted
    pub fn agent_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.keys().cloned().collect();
        names.sort();
        names
    }

    /// Concurrency limit C
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Fan out to every named agent at once, bounded by the pool semaphore.
    ///
    /// The result order matches the requested name order, not completion
    /// order. One agent failing does not cancel the others.
    pub async fn execute_parallel(
        &self,
        agent_names: &[String],
        input: &HashMap<String, Value>,
    ) -> PoolResult {
        let start = Instant::now();
        let mut handles = Vec::with_capacity(agent_names.len());

        for (order, name) in agent_names.iter().enumerate() {
            match self.get(name) {
                Some(agent) => {
                    let semaphore = Arc::clone(&self.semaphore);
                    let task_input = input.clone();
                    handles.push((
                        name.clone(),
                        order,
                        Some(tokio::spawn(async move {
                            let _permit = match semaphore.acquire_owned().await {
                                Ok(permit) => permit,
                                Err(_) => {
                                    return AgentResponse::error_response(
                                        "pool semaphore closed",
                                        ErrorKind::Cancelled,
                                    )
                                }
                            };
                            agent.execute(&task_input).await
                        })),
                    ));
                }
                None => {
                    warn!(agent = %name, "agent not found in pool");
                    handles.push((name.clone(), order, None));
                }
            }
        }

        let mut executions = Vec::with_capacity(handles.len());
        let mut success_count = 0;
        let mut failure_count = 0;

        for (name, order, handle) in handles {
            let response = match handle {
                Some(handle) => match handle.await {
                    Ok(response) => response,
                    Err(join_err) => AgentResponse::error_response(
                        format!("agent task panicked: {}", join_err),
                        ErrorKind::Provider,
                    ),
                },
                None => AgentResponse::error_response(
                    format!("agent '{}' not registered", name),
                    ErrorKind::Configuration,
                ),
            };

            if response.success {
                success_count += 1;
            } else {
                failure_count += 1;
            }
            executions.push(PooledExecution {
                agent_name: name,
                response,
                execution_order: order,
            });
        }

        let total_time_ms = start.elapsed().as_millis() as u64;
        info!(
            success = success_count,
            failed = failure_count,
            total_time_ms,
            "parallel execution complete"
        );

        PoolResult {
            executions,
            total_time_ms,
            success_count,
            failure_count,
        }
    }

    /// Invoke agents strictly in order.
    ///
    /// Without `pass_results` every agent sees the original input and
    /// failures are recorded without stopping the sequence. With
    /// `pass_results` each agent's parsed content is injected under
    /// `previous_result` and the first failure stops the chain.
    pub async fn execute_sequential(
        &self,
        agent_names: &[String],
        input: &HashMap<String, Value>,
        pass_results: bool,
    ) -> PoolResult {
        let start = Instant::now();
        let mut executions = Vec::with_capacity(agent_names.len());
        let mut success_count = 0;
        let mut failure_count = 0;
        let mut current_input = input.clone();

        for (order, name) in agent_names.iter().enumerate() {
            let Some(agent) = self.get(name) else {
                warn!(agent = %name, "agent not found in pool");
                executions.push(PooledExecution {
                    agent_name: name.clone(),
                    response: AgentResponse::error_response(
                        format!("agent '{}' not registered", name),
                        ErrorKind::Configuration,
                    ),
                    execution_order: order,
                });
                failure_count += 1;
                if pass_results {
                    break;
                }
                continue;
            };

            let response = agent.execute(&current_input).await;
            let succeeded = response.success;

            if succeeded {
                success_count += 1;
                if pass_results {
                    if let Some(ref content) = response.content {
                        current_input.insert(CHAIN_KEY.to_string(), content.clone());
                    }
                }
            } else {
                failure_count += 1;
            }

            executions.push(PooledExecution {
                agent_name: name.clone(),
                response,
                execution_order: order,
            });

            if !succeeded && pass_results {
                debug!(agent = %name, "chain stopped on failure");
                break;
            }
        }

        PoolResult {
            executions,
            total_time_ms: start.elapsed().as_millis() as u64,
            success_count,
            failure_count,
        }
    }
}
