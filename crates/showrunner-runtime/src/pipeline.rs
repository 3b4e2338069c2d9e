//! Pipeline runtime
//!
//! Chains execution-pattern invocations into named workflows over a shared
//! output map. Steps run strictly in definition order; preconditions can
//! skip a step, optional steps absorb their own failures, and a cancellation
//! flag checked between steps lets in-flight work finish so accounting stays
//! consistent.

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use showrunner_core::{
    AgentResponse, ErrorKind, ExecutionDefaults, ExecutionMode, PipelineResult, PoolResult,
    PooledExecution, ProgressEvent, ShowrunnerError, ShowrunnerResult, WorkflowResult,
    WorkflowStep,
};

use crate::assembly::execute_assembly;
use crate::collaboration::{run_roleplay, run_socratic};
use crate::consensus::execute_consensus;
use crate::pool::AgentPool;

/// Shared cancellation flag for a pipeline
#[derive(Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    /// Request cancellation; running steps finish, later steps never start
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Step-based workflow runtime over an agent pool
pub struct Pipeline {
    name: String,
    pool: Arc<AgentPool>,
    defaults: ExecutionDefaults,
    workflows: HashMap<String, Vec<WorkflowStep>>,
    cancelled: Arc<AtomicBool>,
    progress_senders: parking_lot::Mutex<Vec<mpsc::UnboundedSender<ProgressEvent>>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("workflows", &self.workflows.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Pipeline {
    /// Create a pipeline owning its agent pool
    pub fn new(name: impl Into<String>, pool: AgentPool) -> Self {
        Self {
            name: name.into(),
            pool: Arc::new(pool),
            defaults: ExecutionDefaults::default(),
            workflows: HashMap::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
            progress_senders: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Apply execution defaults from configuration
    pub fn with_defaults(mut self, defaults: ExecutionDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Pipeline name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The pipeline's agent pool
    pub fn pool(&self) -> &AgentPool {
        &self.pool
    }

    /// Define a named workflow. Step arity and agent references are
    /// validated here so misconfiguration fails before any call is made.
    pub fn define_workflow(
        &mut self,
        name: impl Into<String>,
        steps: Vec<WorkflowStep>,
    ) -> ShowrunnerResult<()> {
        let name = name.into();
        self.validate_steps(&name, &steps)?;
        info!(pipeline = %self.name, workflow = %name, steps = steps.len(), "defined workflow");
        self.workflows.insert(name, steps);
        Ok(())
    }

    /// Names of defined workflows, sorted
    pub fn workflow_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.workflows.keys().cloned().collect();
        names.sort();
        names
    }

    /// Serializable step list for a defined workflow
    pub fn workflow_steps(&self, name: &str) -> Option<&[WorkflowStep]> {
        self.workflows.get(name).map(Vec::as_slice)
    }

    /// Subscribe to progress events. The channel is unbounded so a slow
    /// subscriber can never block step transitions.
    pub fn subscribe_progress(&self) -> mpsc::UnboundedReceiver<ProgressEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.progress_senders.lock().push(tx);
        rx
    }

    /// Handle for cancelling this pipeline from another task
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancelled))
    }

    /// Request cancellation
    pub fn cancel(&self) {
        info!(pipeline = %self.name, "cancellation requested");
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Run a workflow, producing the outermost pipeline result
    pub async fn run(
        &self,
        workflow: &str,
        input: HashMap<String, Value>,
    ) -> PipelineResult<WorkflowResult> {
        let start = Instant::now();
        match self.run_workflow(workflow, input).await {
            Ok(result) => {
                let duration_ms = start.elapsed().as_millis() as u64;
                if result.cancelled {
                    let mut out: PipelineResult<WorkflowResult> =
                        PipelineResult::cancelled(duration_ms);
                    out.metadata
                        .insert("steps_completed".to_string(), Value::from(result.steps_completed));
                    out.metadata
                        .insert("total_steps".to_string(), Value::from(result.total_steps));
                    out
                } else if result.success {
                    PipelineResult::completed(result, duration_ms)
                } else {
                    let diagnostic = result
                        .errors
                        .first()
                        .cloned()
                        .unwrap_or_else(|| "workflow failed".to_string());
                    let mut out: PipelineResult<WorkflowResult> =
                        PipelineResult::failed(diagnostic, duration_ms);
                    out.metadata
                        .insert("steps_completed".to_string(), Value::from(result.steps_completed));
                    out.metadata
                        .insert("total_steps".to_string(), Value::from(result.total_steps));
                    out
                }
            }
            Err(err) => {
                PipelineResult::failed(err.to_string(), start.elapsed().as_millis() as u64)
            }
        }
    }

    /// Execute a defined workflow against an input map
    pub async fn run_workflow(
        &self,
        workflow: &str,
        input: HashMap<String, Value>,
    ) -> ShowrunnerResult<WorkflowResult> {
        let steps = self.workflows.get(workflow).ok_or_else(|| {
            ShowrunnerError::config(format!("workflow not defined: {}", workflow))
        })?;

        let run_id = Uuid::new_v4();
        let total_steps = steps.len();
        info!(
            pipeline = %self.name,
            workflow,
            %run_id,
            steps = total_steps,
            "starting workflow"
        );

        // Cancellation is per-run; a flag left over from a previous run must
        // not kill this one before it starts.
        self.cancelled.store(false, Ordering::SeqCst);

        let mut outputs = input;
        let mut step_results: HashMap<String, PoolResult> = HashMap::new();
        let mut errors: Vec<String> = Vec::new();
        let mut steps_completed = 0;
        let mut cancelled = false;

        for step in steps {
            if self.cancelled.load(Ordering::SeqCst) {
                warn!(pipeline = %self.name, step = %step.name, "cancelled before step");
                cancelled = true;
                break;
            }

            self.emit_progress(&step.name, steps_completed, total_steps);

            if let Some(ref condition) = step.condition {
                if !condition.evaluate(&outputs) {
                    debug!(step = %step.name, "precondition false, skipping step");
                    continue;
                }
            }

            let step_input = prepare_step_input(step, &outputs);

            match self.execute_step(step, step_input).await {
                Ok((pool_result, artifact)) => {
                    let succeeded = pool_result.all_successful();
                    if !succeeded && step.required {
                        let failures = pool_result.failures();
                        if failures.is_empty() {
                            errors.push(format!("step '{}' failed", step.name));
                        }
                        for (agent, message) in failures {
                            errors.push(format!(
                                "step '{}' agent '{}' failed: {}",
                                step.name, agent, message
                            ));
                        }
                    } else if !succeeded {
                        for (agent, message) in pool_result.failures() {
                            warn!(
                                step = %step.name,
                                agent,
                                message,
                                "optional step agent failed, continuing"
                            );
                        }
                    }
                    step_results.insert(step.name.clone(), pool_result);

                    if succeeded {
                        steps_completed += 1;
                        if let Some(ref key) = step.output_key {
                            let value = match artifact {
                                Some(artifact) => artifact,
                                None => Value::Array(
                                    step_results[&step.name].successful_content(),
                                ),
                            };
                            outputs.insert(key.clone(), value);
                        }
                    } else if step.required {
                        break;
                    }
                }
                Err(err) => {
                    let message = format!("step '{}' error: {}", step.name, err);
                    if step.required {
                        warn!(step = %step.name, %err, "required step failed");
                        errors.push(message);
                        break;
                    }
                    warn!(step = %step.name, %err, "optional step failed, continuing");
                }
            }
        }

        if !cancelled {
            self.emit_progress("", steps_completed, total_steps);
        }

        let success = errors.is_empty() && !cancelled;
        info!(
            pipeline = %self.name,
            workflow,
            %run_id,
            steps_completed,
            total_steps,
            success,
            cancelled,
            "workflow complete"
        );

        Ok(WorkflowResult {
            success,
            cancelled,
            steps_completed,
            total_steps,
            outputs,
            step_results,
            errors,
        })
    }

    /// Dispatch one step to its execution pattern
    async fn execute_step(
        &self,
        step: &WorkflowStep,
        step_input: HashMap<String, Value>,
    ) -> ShowrunnerResult<(PoolResult, Option<Value>)> {
        debug!(step = %step.name, mode = ?step.mode, "executing step");

        match step.mode {
            ExecutionMode::Parallel => {
                Ok((self.pool.execute_parallel(&step.agents, &step_input).await, None))
            }
            ExecutionMode::Sequential => Ok((
                self.pool
                    .execute_sequential(&step.agents, &step_input, false)
                    .await,
                None,
            )),
            ExecutionMode::Pipeline => Ok((
                self.pool
                    .execute_sequential(&step.agents, &step_input, true)
                    .await,
                None,
            )),
            ExecutionMode::Consensus => {
                let settings = step.consensus.clone().unwrap_or_default();
                let (pool_result, consensus) = execute_consensus(
                    &self.pool,
                    &step.agents,
                    &step_input,
                    &settings,
                    self.defaults.consensus_threshold,
                )
                .await;
                let artifact = serde_json::to_value(&consensus).map_err(|e| {
                    ShowrunnerError::parse_failed(format!("consensus not serializable: {}", e))
                })?;
                Ok((pool_result, Some(artifact)))
            }
            ExecutionMode::SocraticCollaboration => {
                let config = step.collaboration.clone().unwrap_or_default();
                let goal = required_string(&step_input, "goal")?;
                let (agent_a, agent_b) = self.collaboration_agents(step)?;
                let start = Instant::now();
                let result = run_socratic(agent_a, agent_b, &goal, &config).await;
                Ok((
                    wrap_single("socratic_collaboration", &result, start)?,
                    None,
                ))
            }
            ExecutionMode::RoleplayCollaboration => {
                let config = step.collaboration.clone().unwrap_or_default();
                let context = required_string(&step_input, "context")?;
                let character = required_string(&step_input, "character")?;
                let (agent_a, agent_b) = self.collaboration_agents(step)?;
                let start = Instant::now();
                let result = run_roleplay(agent_a, agent_b, &context, &character, &config).await;
                Ok((wrap_single("roleplay_collaboration", &result, start)?, None))
            }
            ExecutionMode::Assembly => {
                let settings = step.assembly.as_ref().ok_or_else(|| {
                    ShowrunnerError::config(format!(
                        "assembly step '{}' missing assembly settings",
                        step.name
                    ))
                })?;
                let start = Instant::now();
                let run = execute_assembly(&self.pool, &step.agents, settings, &step_input).await?;
                Ok((wrap_single("assembly", &run, start)?, None))
            }
        }
    }

    fn collaboration_agents(
        &self,
        step: &WorkflowStep,
    ) -> ShowrunnerResult<(crate::agent::AgentRef, crate::agent::AgentRef)> {
        let agent_a = self.pool.get(&step.agents[0]).ok_or_else(|| {
            ShowrunnerError::config(format!("agent '{}' not registered", step.agents[0]))
        })?;
        let agent_b = self.pool.get(&step.agents[1]).ok_or_else(|| {
            ShowrunnerError::config(format!("agent '{}' not registered", step.agents[1]))
        })?;
        Ok((agent_a, agent_b))
    }

    fn validate_steps(&self, workflow: &str, steps: &[WorkflowStep]) -> ShowrunnerResult<()> {
        let mut step_names = HashSet::new();
        for step in steps {
            if !step_names.insert(step.name.as_str()) {
                return Err(ShowrunnerError::config(format!(
                    "workflow '{}' has duplicate step name '{}'",
                    workflow, step.name
                )));
            }

            if step.agents.is_empty() {
                return Err(ShowrunnerError::config(format!(
                    "step '{}' has an empty agent list",
                    step.name
                )));
            }

            for agent in &step.agents {
                if !self.pool.contains(agent) {
                    return Err(ShowrunnerError::config(format!(
                        "step '{}' references unregistered agent '{}'",
                        step.name, agent
                    )));
                }
            }

            if step.mode.is_collaboration() {
                if step.agents.len() != 2 {
                    return Err(ShowrunnerError::config(format!(
                        "collaboration step '{}' requires exactly 2 agents, found {}",
                        step.name,
                        step.agents.len()
                    )));
                }
                if step.collaboration.is_none() {
                    return Err(ShowrunnerError::config(format!(
                        "collaboration step '{}' missing collaboration parameters",
                        step.name
                    )));
                }
            }

            if step.mode == ExecutionMode::Assembly {
                let settings = step.assembly.as_ref().ok_or_else(|| {
                    ShowrunnerError::config(format!(
                        "assembly step '{}' missing assembly settings",
                        step.name
                    ))
                })?;
                if settings.judges.is_empty() {
                    return Err(ShowrunnerError::config(format!(
                        "assembly step '{}' has no judges",
                        step.name
                    )));
                }
                for judge in &settings.judges {
                    if !self.pool.contains(judge) {
                        return Err(ShowrunnerError::config(format!(
                            "assembly step '{}' references unregistered judge '{}'",
                            step.name, judge
                        )));
                    }
                }
                if !self.pool.contains(&settings.synthesizer) {
                    return Err(ShowrunnerError::config(format!(
                        "assembly step '{}' references unregistered synthesizer '{}'",
                        step.name, settings.synthesizer
                    )));
                }
                if let Some(ref validator) = settings.validator {
                    if !self.pool.contains(validator) {
                        return Err(ShowrunnerError::config(format!(
                            "assembly step '{}' references unregistered validator '{}'",
                            step.name, validator
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn emit_progress(&self, step: &str, completed: usize, total: usize) {
        let percent = if total == 0 {
            100.0
        } else if step.is_empty() {
            100.0
        } else {
            completed as f64 / total as f64 * 100.0
        };
        let event = ProgressEvent {
            pipeline: self.name.clone(),
            step: step.to_string(),
            completed,
            total,
            percent,
        };
        self.progress_senders
            .lock()
            .retain(|sender| sender.send(event.clone()).is_ok());
    }
}

/// Copy the entire output map, then overlay the step's declared mapping
fn prepare_step_input(
    step: &WorkflowStep,
    outputs: &HashMap<String, Value>,
) -> HashMap<String, Value> {
    let mut step_input = outputs.clone();
    for (target, source) in &step.input_mapping {
        if let Some(value) = outputs.get(source) {
            step_input.insert(target.clone(), value.clone());
        }
    }
    step_input
}

fn required_string(input: &HashMap<String, Value>, key: &str) -> ShowrunnerResult<String> {
    match input.get(key) {
        Some(Value::String(value)) => Ok(value.clone()),
        Some(_) => Err(ShowrunnerError::bad_input(format!(
            "input key '{}' must be a string",
            key
        ))),
        None => Err(ShowrunnerError::bad_input(format!(
            "missing required input key '{}'",
            key
        ))),
    }
}

/// Fold a composite pattern result into a single-execution pool result so
/// workflow aggregation stays uniform across modes.
fn wrap_single<T: serde::Serialize + SingleOutcome>(
    label: &str,
    outcome: &T,
    start: Instant,
) -> ShowrunnerResult<PoolResult> {
    let value = serde_json::to_value(outcome)
        .map_err(|e| ShowrunnerError::parse_failed(format!("result not serializable: {}", e)))?;
    let total_time_ms = start.elapsed().as_millis() as u64;

    let response = if outcome.succeeded() {
        AgentResponse::success_response(value).with_execution_time_ms(total_time_ms)
    } else {
        AgentResponse::error_response(outcome.failure_summary(), ErrorKind::Provider)
            .with_raw(serde_json::to_string(&value).unwrap_or_default())
            .with_execution_time_ms(total_time_ms)
    };

    let success = response.success;
    Ok(PoolResult {
        executions: vec![PooledExecution {
            agent_name: label.to_string(),
            response,
            execution_order: 0,
        }],
        total_time_ms,
        success_count: usize::from(success),
        failure_count: usize::from(!success),
    })
}

/// Composite pattern outcomes that fold into a single pooled execution
trait SingleOutcome {
    fn succeeded(&self) -> bool;
    fn failure_summary(&self) -> String;
}

impl SingleOutcome for showrunner_core::CollaborationResult {
    fn succeeded(&self) -> bool {
        self.success
    }

    fn failure_summary(&self) -> String {
        if self.errors.is_empty() {
            "collaboration failed".to_string()
        } else {
            self.errors.join("; ")
        }
    }
}

impl SingleOutcome for showrunner_core::AssemblyRun {
    fn succeeded(&self) -> bool {
        true
    }

    fn failure_summary(&self) -> String {
        String::new()
    }
}
