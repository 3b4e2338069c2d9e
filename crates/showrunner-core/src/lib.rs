// Showrunner Core - Foundation types for the multi-agent orchestration engine
//
// This crate carries the plain-data half of the engine: configuration,
// the error taxonomy, agent and workflow result shapes, and the pure
// aggregation math (consensus voting, assembly scoring, convergence
// similarity). Nothing here performs I/O or holds global state.

pub mod agent;
pub mod assembly;
pub mod collaboration;
pub mod config;
pub mod consensus;
pub mod error;
pub mod execution;
pub mod template;

// Re-export core types
pub use agent::{AgentConfig, AgentResponse};
pub use assembly::{
    AssemblyRun, AssemblySettings, CalculatorResult, ContinuityCheck, JudgeRanking, Proposal,
};
pub use collaboration::{
    CollaborationConfig, CollaborationMode, CollaborationResult, CollaborationTurn,
};
pub use config::{
    ExecutionDefaults, FunctionMapping, ProviderConfig, ProviderKind, ShowrunnerConfig,
};
pub use consensus::{ConsensusPolicy, ConsensusResult, ConsensusSettings};
pub use error::{ErrorKind, ShowrunnerError, ShowrunnerResult};
pub use execution::{
    ExecutionMode, PipelineResult, PipelineStatus, PoolResult, PooledExecution, ProgressEvent,
    StepCondition, WorkflowResult, WorkflowStep, CHAIN_KEY,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default pool concurrency limit
pub const DEFAULT_PARALLEL_AGENTS: usize = 5;

/// Default majority consensus threshold
pub const DEFAULT_CONSENSUS_THRESHOLD: f64 = 0.8;

/// Default number of assembly proposers
pub const DEFAULT_PROPOSER_COUNT: usize = 7;

/// Default number of assembly judges
pub const DEFAULT_JUDGE_COUNT: usize = 5;
