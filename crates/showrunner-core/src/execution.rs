//! Execution pattern and workflow result types
//!
//! A workflow is an ordered list of steps; each step fans a selection of
//! agents out under one of the execution modes and folds the result back
//! into a shared output map. The structs here are the wire-level shapes the
//! runtime produces and the manifest format serializes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::agent::AgentResponse;
use crate::assembly::AssemblySettings;
use crate::collaboration::CollaborationConfig;
use crate::consensus::ConsensusSettings;

/// Key under which pipeline mode injects the previous agent's parsed content
pub const CHAIN_KEY: &str = "previous_result";

/// Execution patterns available to a workflow step
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Fan out to all named agents at once
    Parallel,
    /// Invoke agents in order, each seeing the original input
    Sequential,
    /// Sequential with result chaining; a failure stops the chain
    Pipeline,
    /// Parallel fan-out with item-level agreement voting
    Consensus,
    /// Two agents iterate idea/critique until convergence
    SocraticCollaboration,
    /// Two agents alternate a bounded in-character dialogue
    RoleplayCollaboration,
    /// Proposers, judges, calculator, synthesizer, optional continuity loop
    Assembly,
}

impl ExecutionMode {
    /// Whether this mode requires exactly two agents and collaboration config
    pub fn is_collaboration(&self) -> bool {
        matches!(
            self,
            Self::SocraticCollaboration | Self::RoleplayCollaboration
        )
    }
}

/// Result of one agent execution inside a pattern
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PooledExecution {
    /// Name of the agent that produced this response
    pub agent_name: String,

    /// The agent's response
    pub response: AgentResponse,

    /// Position in the requested agent order, stable per invocation
    pub execution_order: usize,
}

/// Aggregate result of one pattern invocation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolResult {
    /// Executions ordered by requested agent order, not completion order
    pub executions: Vec<PooledExecution>,

    /// Total wall time of the invocation in milliseconds
    pub total_time_ms: u64,

    /// Number of successful executions
    pub success_count: usize,

    /// Number of failed executions
    pub failure_count: usize,
}

impl PoolResult {
    /// Whether every execution succeeded
    pub fn all_successful(&self) -> bool {
        self.failure_count == 0
    }

    /// Response from a specific agent, if it ran
    pub fn response_for(&self, agent_name: &str) -> Option<&AgentResponse> {
        self.executions
            .iter()
            .find(|e| e.agent_name == agent_name)
            .map(|e| &e.response)
    }

    /// Parsed content from all successful executions, in execution order
    pub fn successful_content(&self) -> Vec<serde_json::Value> {
        self.executions
            .iter()
            .filter(|e| e.response.success)
            .filter_map(|e| e.response.content.clone())
            .collect()
    }

    /// Error messages from all failed executions
    pub fn failures(&self) -> Vec<(&str, &str)> {
        self.executions
            .iter()
            .filter(|e| !e.response.success)
            .filter_map(|e| {
                e.response
                    .error
                    .as_deref()
                    .map(|msg| (e.agent_name.as_str(), msg))
            })
            .collect()
    }
}

/// Precondition evaluated against the accumulated output map
#[derive(Clone)]
pub struct StepCondition(pub Arc<dyn Fn(&HashMap<String, serde_json::Value>) -> bool + Send + Sync>);

impl StepCondition {
    /// Wrap a predicate closure
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&HashMap<String, serde_json::Value>) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(predicate))
    }

    /// Evaluate the predicate
    pub fn evaluate(&self, outputs: &HashMap<String, serde_json::Value>) -> bool {
        (self.0)(outputs)
    }
}

impl std::fmt::Debug for StepCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StepCondition(..)")
    }
}

/// One step of a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Step name, unique within the workflow
    pub name: String,

    /// Agents this step runs, in order
    pub agents: Vec<String>,

    /// Execution pattern for this step
    pub mode: ExecutionMode,

    /// Overlay mapping of step-input key -> accumulated-output key
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub input_mapping: HashMap<String, String>,

    /// Key under which the step's successful contents are stored
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_key: Option<String>,

    /// Required steps end the workflow on failure; optional steps log and continue
    #[serde(default = "default_required")]
    pub required: bool,

    /// Optional precondition; when false the step is skipped entirely.
    /// Code-level only, never serialized.
    #[serde(skip)]
    pub condition: Option<StepCondition>,

    /// Parameters for collaboration modes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collaboration: Option<CollaborationConfig>,

    /// Parameters for consensus mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consensus: Option<ConsensusSettings>,

    /// Parameters for assembly mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assembly: Option<AssemblySettings>,
}

fn default_required() -> bool {
    true
}

impl WorkflowStep {
    /// Create a step with required fields and defaults for the rest
    pub fn new(
        name: impl Into<String>,
        mode: ExecutionMode,
        agents: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            agents,
            mode,
            input_mapping: HashMap::new(),
            output_key: None,
            required: true,
            condition: None,
            collaboration: None,
            consensus: None,
            assembly: None,
        }
    }

    /// Store the step's output under the given key
    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = Some(key.into());
        self
    }

    /// Overlay an input mapping entry
    pub fn map_input(mut self, target: impl Into<String>, source: impl Into<String>) -> Self {
        self.input_mapping.insert(target.into(), source.into());
        self
    }

    /// Mark the step optional
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Attach a precondition predicate
    pub fn with_condition<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&HashMap<String, serde_json::Value>) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(StepCondition::new(predicate));
        self
    }

    /// Attach collaboration parameters
    pub fn with_collaboration(mut self, config: CollaborationConfig) -> Self {
        self.collaboration = Some(config);
        self
    }

    /// Attach consensus parameters
    pub fn with_consensus(mut self, settings: ConsensusSettings) -> Self {
        self.consensus = Some(settings);
        self
    }

    /// Attach assembly parameters
    pub fn with_assembly(mut self, settings: AssemblySettings) -> Self {
        self.assembly = Some(settings);
        self
    }
}

/// Result of one workflow run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowResult {
    /// True when no errors occurred and all required steps completed
    pub success: bool,

    /// True when the run halted on a cancellation signal
    #[serde(default)]
    pub cancelled: bool,

    /// Number of steps that completed successfully
    pub steps_completed: usize,

    /// Total steps defined in the workflow
    pub total_steps: usize,

    /// Accumulated output map, input plus step outputs
    pub outputs: HashMap<String, serde_json::Value>,

    /// Per-step pattern results, keyed by step name
    pub step_results: HashMap<String, PoolResult>,

    /// Errors encountered, in order
    pub errors: Vec<String>,
}

/// Progress event emitted on every step transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Name of the pipeline emitting the event
    pub pipeline: String,

    /// Name of the step about to run, or empty on the final event
    pub step: String,

    /// Steps completed so far
    pub completed: usize,

    /// Total step count
    pub total: usize,

    /// Completion percentage in [0, 100]
    pub percent: f64,
}

/// Status of a pipeline run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    /// Run has not started
    Pending,
    /// Run is executing steps
    Running,
    /// Run finished with all required steps successful
    Completed,
    /// Run failed
    Failed,
    /// Run was cancelled between steps
    Cancelled,
}

/// Outermost result of a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult<T> {
    /// Final status
    pub status: PipelineStatus,

    /// Typed output, present only on completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<T>,

    /// One diagnostic error string on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Wall time of the run in milliseconds
    pub duration_ms: u64,

    /// Free-form run metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl<T> PipelineResult<T> {
    /// Build a completed result
    pub fn completed(output: T, duration_ms: u64) -> Self {
        Self {
            status: PipelineStatus::Completed,
            output: Some(output),
            error: None,
            duration_ms,
            metadata: HashMap::new(),
        }
    }

    /// Build a failed result
    pub fn failed(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            status: PipelineStatus::Failed,
            output: None,
            error: Some(error.into()),
            duration_ms,
            metadata: HashMap::new(),
        }
    }

    /// Build a cancelled result
    pub fn cancelled(duration_ms: u64) -> Self {
        Self {
            status: PipelineStatus::Cancelled,
            output: None,
            error: Some("execution cancelled".to_string()),
            duration_ms,
            metadata: HashMap::new(),
        }
    }

    /// Whether the run completed successfully
    pub fn success(&self) -> bool {
        self.status == PipelineStatus::Completed
    }
}
