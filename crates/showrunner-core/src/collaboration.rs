//! Collaborative dialogue types
//!
//! Two agents in structured dialogue: Socratic refinement (ideate, critique,
//! converge) or roleplay exploration (scene, in-character answer, follow-up).
//! The runtime drives the turns; the types and the convergence metric live
//! here.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Collaboration dialogue modes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CollaborationMode {
    /// Iterative refinement through idea and critique
    Socratic,
    /// Bounded in-character dialogue, no convergence test
    Roleplay,
}

/// Parameters for a collaboration step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborationConfig {
    /// Maximum idea/critique rounds (Socratic) or dialogue rounds (Roleplay)
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Similarity at or above which Socratic dialogue converges
    #[serde(default = "default_convergence_threshold")]
    pub convergence_threshold: f64,
}

fn default_max_iterations() -> usize {
    5
}

fn default_convergence_threshold() -> f64 {
    0.85
}

impl Default for CollaborationConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            convergence_threshold: default_convergence_threshold(),
        }
    }
}

/// A single turn in a collaborative dialogue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborationTurn {
    /// Turn index, starting at 1 and contiguous across both speakers
    pub turn_number: usize,

    /// Name of the speaking agent
    pub agent_name: String,

    /// Prompt sent to the agent
    pub prompt: String,

    /// Response received
    pub response: String,

    /// Role of the turn in the dialogue (e.g. "ideation", "critique")
    pub reasoning: String,

    /// Tokens consumed by the turn
    pub tokens_used: usize,

    /// Wall time of the turn in milliseconds
    pub execution_time_ms: u64,
}

/// Result of a collaborative execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborationResult {
    /// Whether the dialogue ran to a usable conclusion
    pub success: bool,

    /// Mode that was executed
    pub mode: CollaborationMode,

    /// Ordered transcript turns
    pub turns: Vec<CollaborationTurn>,

    /// Final artifact: the ideator's latest idea (Socratic) or empty (Roleplay)
    pub final_output: String,

    /// Whether Socratic convergence was reached before the iteration cap
    pub convergence_achieved: bool,

    /// Rounds actually executed
    pub iterations_completed: usize,

    /// Total wall time in milliseconds
    pub total_time_ms: u64,

    /// Total tokens across all turns
    pub total_tokens: usize,

    /// Readable transcript of the dialogue
    pub dialogue_transcript: String,

    /// Summary counters extracted from the dialogue
    pub insights: HashMap<String, serde_json::Value>,

    /// Errors encountered during the dialogue
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Token-set Jaccard similarity between two texts, bounded in [0, 1].
///
/// Tokens are lowercased whitespace splits. Two texts with no tokens at all
/// are treated as dissimilar rather than identical, so an agent that goes
/// silent never triggers convergence.
pub fn jaccard_similarity(first: &str, second: &str) -> f64 {
    let words_a: BTreeSet<String> = first.to_lowercase().split_whitespace().map(String::from).collect();
    let words_b: BTreeSet<String> = second.to_lowercase().split_whitespace().map(String::from).collect();

    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }

    let intersection = words_a.intersection(&words_b).count();
    let union = words_a.union(&words_b).count();

    intersection as f64 / union as f64
}

/// Build a readable transcript from dialogue turns
pub fn build_transcript(turns: &[CollaborationTurn]) -> String {
    let mut transcript = String::new();
    for turn in turns {
        transcript.push_str(&format!(
            "\n{} (Turn {}):\n{}\n",
            turn.agent_name, turn.turn_number, turn.response
        ));
    }
    transcript
}
